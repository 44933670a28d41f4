use crate::grid_loader::GridLoaderError;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GammaError {
    #[error("Invalid dose grid: {0}")]
    InvalidGrid(String),

    #[error("Subscript {index} out of range 0..{len} on axis {axis}")]
    OutOfBounds { axis: usize, index: usize, len: usize },

    #[error("Voxel {index} out of range 0..{len}")]
    VoxelOutOfRange { index: usize, len: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Reference and target grids differ: {0}")]
    GridMismatch(String),

    #[error("Degenerate {grid} dose: maximum is {max}")]
    DegenerateDose { grid: &'static str, max: f32 },

    #[error("Gamma evaluation produced a non-finite value at voxel {index}")]
    NonFiniteGamma { index: usize },

    #[error("Loader error: {0}")]
    Loader(#[from] GridLoaderError),
}
