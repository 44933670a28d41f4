//! # Gamma index library
//!
//! This crate computes the gamma index used in radiotherapy quality
//! assurance to compare a reference dose distribution with a measured or
//! recomputed target distribution on the same 1D, 2D or 3D grid.
//!
//! For every reference voxel above a low-dose cutoff a precomputed
//! neighborhood of spatial offsets is probed nearest first. At each probe
//! the reference dose is interpolated (linear, bilinear or trilinear) and
//! combined with the target dose at the voxel into
//!
//! ```text
//! gamma^2 = (dose difference / dose criterion)^2 + (distance / distance criterion)^2
//! ```
//!
//! The smallest value found, capped at the configured limit, is the voxel's
//! gamma. The scan stops as soon as the distance term alone cannot beat the
//! current best. Voxels are independent and are evaluated in parallel using
//! rayon unless sequential execution is requested.
//!
//! Dose grids can be read from plain text files (1D and 2D) or from DICOM
//! RT Dose files through the dicom-rs ecosystem. Out-of-grid probes are
//! skipped for every dimensionality.
//!
//! # Roadmap
//!
//!  - Resampling of target grids with a different spacing
//!
//! # Examples
//!
//! ## Comparing two RT Dose files
//!
//! ```no_run
//! # use gamma_index::{GammaConfig, GammaEngine, GridLoader};
//! let reference = GridLoader::load_dicom("reference.dcm").expect("should have loaded reference");
//! let target = GridLoader::load_dicom("target.dcm").expect("should have loaded target");
//! let engine = GammaEngine::new(reference, target, GammaConfig::default())
//!     .expect("grids should share geometry");
//! let gamma = engine.run().expect("should have evaluated every voxel");
//! println!("{}", engine.summarize(&gamma));
//! ```
//!
//! ## Comparing two in-memory profiles
//!
//! ```
//! # use gamma_index::{DoseGrid, GammaConfig, evaluate};
//! let reference = DoseGrid::new(vec![0.0, 10.0, 10.0, 10.0, 0.0], vec![5], vec![1.0]).unwrap();
//! let target = reference.clone();
//! let (_, summary) = evaluate(reference, target, GammaConfig::default()).unwrap();
//! assert_eq!(summary.pass_rate_percent, Some(100.0));
//! ```

pub mod config;
pub mod enums;
pub mod error;
pub mod gamma;
pub mod grid;
pub mod grid_loader;
mod interpolator;
pub mod neighborhood;
pub mod summary;

pub use config::GammaConfig;
pub use enums::{Execution, Normalization};
pub use error::GammaError;
pub use gamma::{EXCLUDED, GammaEngine, GammaMap, build_neighborhood, evaluate};
pub use grid::{DoseGrid, MAX_DIMS};
pub use grid_loader::{GridLoader, GridLoaderError};
pub use interpolator::Interpolator;
pub use neighborhood::{Offset, SearchNeighborhood};
pub use summary::GammaSummary;
