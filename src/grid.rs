use crate::error::GammaError;

use ndarray::{ArrayViewD, IxDyn, ShapeBuilder};

/// Highest supported grid dimensionality.
pub const MAX_DIMS: usize = 3;

/// Immutable N-dimensional dose grid.
///
/// Samples are stored with axis 0 varying fastest, so a 3D grid of shape
/// `[x, y, z]` keeps whole rows of `x` contiguous, the same order a DICOM
/// RT Dose pixel buffer has.
#[derive(Clone, Debug, PartialEq)]
pub struct DoseGrid {
    samples: Vec<f32>,
    shape: Vec<usize>,
    spacing: Vec<f32>,
    strides: Vec<usize>,
}

impl DoseGrid {
    /// Create a grid from its raw samples.
    ///
    /// # Errors
    ///
    /// Returns [`GammaError::InvalidGrid`] if the dimensionality is not in
    /// `1..=3`, an axis is empty, a spacing is not a positive finite number,
    /// a sample is not finite, or `samples.len()` differs from the product of
    /// `shape`.
    pub fn new(samples: Vec<f32>, shape: Vec<usize>, spacing: Vec<f32>) -> Result<Self, GammaError> {
        if shape.is_empty() || shape.len() > MAX_DIMS {
            return Err(GammaError::InvalidGrid(format!(
                "dimensionality must be between 1 and {MAX_DIMS}, got {}",
                shape.len()
            )));
        }
        if spacing.len() != shape.len() {
            return Err(GammaError::InvalidGrid(format!(
                "{} spacing values for a {}D grid",
                spacing.len(),
                shape.len()
            )));
        }
        if let Some(axis) = shape.iter().position(|&n| n == 0) {
            return Err(GammaError::InvalidGrid(format!("axis {axis} has zero length")));
        }
        if let Some(axis) = spacing.iter().position(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(GammaError::InvalidGrid(format!(
                "spacing on axis {axis} must be positive, got {}",
                spacing[axis]
            )));
        }
        let expected: usize = shape.iter().product();
        if samples.len() != expected {
            return Err(GammaError::InvalidGrid(format!(
                "{} samples for shape {shape:?} (expected {expected})",
                samples.len()
            )));
        }
        if let Some(index) = samples.iter().position(|v| !v.is_finite()) {
            return Err(GammaError::InvalidGrid(format!(
                "sample {index} is not finite"
            )));
        }

        let strides = shape
            .iter()
            .scan(1usize, |stride, &n| {
                let current = *stride;
                *stride *= n;
                Some(current)
            })
            .collect();

        Ok(Self {
            samples,
            shape,
            spacing,
            strides,
        })
    }

    pub fn dims(&self) -> usize {
        self.shape.len()
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn spacing(&self) -> &[f32] {
        &self.spacing
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Largest sample value.
    pub fn max(&self) -> f32 {
        self.samples.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    /// View the samples as an ndarray indexed `[axis0, axis1, ...]`.
    ///
    /// Cannot panic: [`DoseGrid::new`] rejects sample counts that do not
    /// match the shape.
    pub fn view(&self) -> ArrayViewD<'_, f32> {
        ArrayViewD::from_shape(IxDyn(&self.shape).f(), &self.samples)
            .expect("sample count is checked against the shape on construction")
    }

    /// Convert a flat index into per-axis subscripts. Axes beyond
    /// [`Self::dims`] are reported as 0.
    #[inline]
    pub fn index_to_subscript(&self, index: usize) -> [usize; MAX_DIMS] {
        let mut subscript = [0; MAX_DIMS];
        for (axis, slot) in subscript.iter_mut().enumerate().take(self.dims()) {
            *slot = (index / self.strides[axis]) % self.shape[axis];
        }
        subscript
    }

    /// Inverse of [`Self::index_to_subscript`]. Only the first
    /// [`Self::dims`] components are read.
    #[inline]
    pub fn subscript_to_index(&self, subscript: &[usize]) -> usize {
        subscript
            .iter()
            .zip(&self.strides)
            .map(|(s, stride)| s * stride)
            .sum()
    }

    /// Sample at an integer subscript.
    ///
    /// # Errors
    ///
    /// Returns [`GammaError::OutOfBounds`] if any component lies outside its
    /// axis, and [`GammaError::InvalidGrid`] if the subscript has the wrong
    /// number of components.
    pub fn value_at(&self, subscript: &[usize]) -> Result<f32, GammaError> {
        if subscript.len() != self.dims() {
            return Err(GammaError::InvalidGrid(format!(
                "{} subscript components for a {}D grid",
                subscript.len(),
                self.dims()
            )));
        }
        for (axis, (&index, &len)) in subscript.iter().zip(&self.shape).enumerate() {
            if index >= len {
                return Err(GammaError::OutOfBounds { axis, index, len });
            }
        }
        Ok(self.samples[self.subscript_to_index(subscript)])
    }

    /// Flat-index distance between neighbours along each axis.
    pub(crate) fn strides(&self) -> &[usize] {
        &self.strides
    }

    #[inline]
    pub(crate) fn sample(&self, index: usize) -> f32 {
        self.samples[index]
    }

    /// Copy of the grid with every sample divided by the grid maximum.
    ///
    /// # Errors
    ///
    /// Returns [`GammaError::DegenerateDose`] if the maximum is not positive.
    pub fn normalized(&self, grid: &'static str) -> Result<Self, GammaError> {
        let max = self.max();
        if max <= 0.0 {
            return Err(GammaError::DegenerateDose { grid, max });
        }
        Ok(Self {
            samples: self.samples.iter().map(|v| v / max).collect(),
            ..self.clone()
        })
    }

    /// Check that `other` covers the same lattice as `self`.
    pub(crate) fn check_same_geometry(&self, other: &DoseGrid) -> Result<(), GammaError> {
        if self.shape != other.shape {
            return Err(GammaError::GridMismatch(format!(
                "shape {:?} vs {:?}",
                self.shape, other.shape
            )));
        }
        let spacing_differs = self
            .spacing
            .iter()
            .zip(&other.spacing)
            .any(|(a, b)| (a - b).abs() > 1e-5 * a.abs().max(b.abs()));
        if spacing_differs {
            return Err(GammaError::GridMismatch(format!(
                "spacing {:?} vs {:?}",
                self.spacing, other.spacing
            )));
        }
        Ok(())
    }
}
