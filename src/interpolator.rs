use crate::grid::{DoseGrid, MAX_DIMS};

pub struct Interpolator;

impl Interpolator {
    /// Evaluate `grid` at a continuous position given in index units
    /// (physical coordinate divided by spacing, per axis).
    ///
    /// Linear for 1D grids, bilinear for 2D and trilinear for 3D. Callers
    /// must keep every component inside `[0, shape - 1]`; on the last index
    /// of an axis the upper neighbour collapses onto the boundary sample.
    /// A position that lies exactly on the lattice returns the stored sample
    /// unchanged.
    #[inline]
    pub fn interpolate(grid: &DoseGrid, position: &[f32]) -> f32 {
        let dims = grid.dims();
        let shape = grid.shape();
        let strides = grid.strides();
        debug_assert_eq!(position.len(), dims);

        let mut base = 0;
        let mut upper_step = [0usize; MAX_DIMS];
        let mut fraction = [0.0f32; MAX_DIMS];
        let mut on_lattice = true;

        for axis in 0..dims {
            let p = position[axis];
            debug_assert!(p >= 0.0 && p <= (shape[axis] - 1) as f32);
            let floor = p.floor();
            let low = floor as usize;
            let high = (low + 1).min(shape[axis] - 1);

            fraction[axis] = p - floor;
            on_lattice &= fraction[axis] == 0.0;
            upper_step[axis] = (high - low) * strides[axis];
            base += low * strides[axis];
        }

        if on_lattice {
            return grid.sample(base);
        }

        let mut value = 0.0f32;
        for corner in 0..(1usize << dims) {
            let mut weight = 1.0f32;
            let mut index = base;
            for axis in 0..dims {
                if corner & (1 << axis) != 0 {
                    weight *= fraction[axis];
                    index += upper_step[axis];
                } else {
                    weight *= 1.0 - fraction[axis];
                }
            }
            value = weight.mul_add(grid.sample(index), value);
        }
        value
    }
}
