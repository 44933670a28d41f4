use crate::error::GammaError;
use crate::grid::MAX_DIMS;

use log::debug;
use std::f64::consts::PI;

/// Candidate displacement from a voxel center, in physical units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Offset {
    pub delta: [f32; MAX_DIMS],
    pub squared_norm: f32,
}

/// Offsets probed around every evaluated voxel, nearest first.
///
/// Built once per run and shared read-only by every voxel, so the engine can
/// stop scanning as soon as the distance term alone exceeds the best gamma.
#[derive(Clone, Debug)]
pub struct SearchNeighborhood {
    offsets: Vec<Offset>,
    dims: usize,
    radius: f32,
    step: f32,
}

impl SearchNeighborhood {
    /// Enumerate every lattice point `(i1·step, ..., iN·step)` with
    /// `|ik| <= floor(radius / step)`.
    ///
    /// For `dims >= 2` points farther than `radius` are dropped. A 1D
    /// neighborhood keeps the whole segment, which never reaches past
    /// `radius` anyway.
    pub fn build(radius: f32, step: f32, dims: usize) -> Result<Self, GammaError> {
        if !(radius.is_finite() && radius >= 0.0) {
            return Err(GammaError::InvalidConfig(format!(
                "search radius must be non-negative, got {radius}"
            )));
        }
        if !(step.is_finite() && step > 0.0) {
            return Err(GammaError::InvalidConfig(format!(
                "search step must be positive, got {step}"
            )));
        }
        if dims == 0 || dims > MAX_DIMS {
            return Err(GammaError::InvalidConfig(format!(
                "neighborhood dimensionality must be between 1 and {MAX_DIMS}, got {dims}"
            )));
        }

        // relative slack absorbs rounding such as 1.0 / 0.1 = 9.9999998
        let ratio = f64::from(radius) / f64::from(step);
        let half_width = (ratio * (1.0 + 1e-6)).floor() as i64;
        let side = (2 * half_width + 1) as usize;
        // lattice points lying on the sphere survive rounding of i * step
        let radius_sq = radius * radius * (1.0 + 1e-5);
        let filter = dims >= 2;

        let mut offsets = Vec::with_capacity(estimated_len(ratio, side, dims));
        let mut counter = [-half_width; MAX_DIMS];
        loop {
            let mut delta = [0.0; MAX_DIMS];
            for axis in 0..dims {
                delta[axis] = counter[axis] as f32 * step;
            }
            let squared_norm = delta.iter().map(|d| d * d).sum::<f32>();
            if !filter || squared_norm <= radius_sq {
                offsets.push(Offset {
                    delta,
                    squared_norm,
                });
            }

            // odometer over [-W, W]^dims, axis 0 fastest
            let mut axis = 0;
            while axis < dims {
                counter[axis] += 1;
                if counter[axis] <= half_width {
                    break;
                }
                counter[axis] = -half_width;
                axis += 1;
            }
            if axis == dims {
                break;
            }
        }

        offsets.sort_by(|a, b| a.squared_norm.total_cmp(&b.squared_norm));
        offsets.shrink_to_fit();

        debug!(
            "SearchNeighborhood::build dims={dims} radius={radius} step={step} half_width={half_width} offsets={}",
            offsets.len()
        );

        Ok(Self {
            offsets,
            dims,
            radius,
            step,
        })
    }

    pub fn offsets(&self) -> &[Offset] {
        &self.offsets
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn step(&self) -> f32 {
        self.step
    }
}

/// Upper bound on the offsets kept for a `ratio = radius / step` search:
/// the whole segment in 1D, the disc or ball of radius `ratio + 1` above
/// that, never more than the `side^dims` box.
fn estimated_len(ratio: f64, side: usize, dims: usize) -> usize {
    let cube = (side as f64).powi(dims as i32);
    let reach = ratio + 1.0;
    let estimate = match dims {
        1 => cube,
        2 => PI * reach * reach,
        _ => 4.0 / 3.0 * PI * reach * reach * reach,
    };
    estimate.min(cube).ceil() as usize
}
