use crate::enums::{Execution, Normalization};
use crate::error::GammaError;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Gamma evaluation parameters.
///
/// Every field has a default, so a JSON config file only needs the values
/// it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GammaConfig {
    /// Dose criterion in percent (of the maximum or the local dose).
    pub dose_tolerance_percent: f32,
    /// Distance-to-agreement criterion, in the grid's spacing units (mm).
    pub distance_tolerance: f32,
    /// Voxels below `cutoff_fraction * max(reference)` are not evaluated.
    pub cutoff_fraction: f32,
    pub normalization: Normalization,
    /// Divide each grid by its own maximum before comparing.
    pub normalize_inputs: bool,
    /// Ceiling of the reported gamma value; also scales the search radius.
    pub gamma_limit: f32,
    /// Search step is `spacing[0] / search_subdivisions`. `None` picks 100,
    /// 50 or 20 for 1D, 2D or 3D grids.
    pub search_subdivisions: Option<u32>,
    pub execution: Execution,
    /// Stop probing a voxel as soon as some offset passes (gamma <= 1).
    /// Pass/fail is unchanged but passing gammas are upper bounds only.
    pub stop_at_pass: bool,
}

impl Default for GammaConfig {
    fn default() -> Self {
        Self {
            dose_tolerance_percent: 3.0,
            distance_tolerance: 3.0,
            cutoff_fraction: 0.1,
            normalization: Normalization::Global,
            normalize_inputs: false,
            gamma_limit: 2.0,
            search_subdivisions: None,
            execution: Execution::Parallel,
            stop_at_pass: false,
        }
    }
}

impl GammaConfig {
    /// Read a config from a JSON file.
    pub fn load(path: &Path) -> Result<Self, GammaError> {
        let contents = fs::read_to_string(path).map_err(|source| GammaError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: GammaConfig =
            serde_json::from_str(&contents).map_err(|source| GammaError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), GammaError> {
        let positive = [
            ("dose_tolerance_percent", self.dose_tolerance_percent),
            ("distance_tolerance", self.distance_tolerance),
            ("gamma_limit", self.gamma_limit),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(GammaError::InvalidConfig(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        if !(0.0..1.0).contains(&self.cutoff_fraction) {
            return Err(GammaError::InvalidConfig(format!(
                "cutoff_fraction must be in [0, 1), got {}",
                self.cutoff_fraction
            )));
        }
        if self.search_subdivisions == Some(0) {
            return Err(GammaError::InvalidConfig(
                "search_subdivisions must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn search_radius(&self) -> f32 {
        self.distance_tolerance * self.gamma_limit
    }

    pub fn subdivisions_for(&self, dims: usize) -> u32 {
        self.search_subdivisions.unwrap_or(match dims {
            1 => 100,
            2 => 50,
            _ => 20,
        })
    }

    /// Physical distance between neighbouring search offsets.
    pub fn search_step(&self, spacing: &[f32]) -> f32 {
        spacing[0] / self.subdivisions_for(spacing.len()) as f32
    }
}
