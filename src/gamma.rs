use crate::config::GammaConfig;
use crate::enums::{Execution, Normalization};
use crate::error::GammaError;
use crate::grid::{DoseGrid, MAX_DIMS};
use crate::interpolator::Interpolator;
use crate::neighborhood::SearchNeighborhood;
use crate::summary::GammaSummary;

use log::{debug, info};
use ndarray::{ArrayViewD, IxDyn, ShapeBuilder};
use rayon::prelude::*;
use std::time::Instant;

/// Gamma value stored for voxels below the low-dose cutoff.
pub const EXCLUDED: f32 = -1.0;

/// Probes this close (in index units) outside the grid are snapped onto it.
const EDGE_TOLERANCE: f32 = 1e-5;

/// Per-voxel gamma values laid out like the reference grid.
#[derive(Clone, Debug, PartialEq)]
pub struct GammaMap {
    values: Vec<f32>,
    shape: Vec<usize>,
}

impl GammaMap {
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f32> {
        self.values
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Gamma at a flat voxel index, `None` when out of range.
    pub fn get(&self, index: usize) -> Option<f32> {
        self.values.get(index).copied()
    }

    /// Values as an ndarray indexed like the reference grid.
    ///
    /// The map is only built by [`GammaEngine::run`] with one value per
    /// reference voxel, so the shape always matches and this cannot panic.
    pub fn view(&self) -> ArrayViewD<'_, f32> {
        ArrayViewD::from_shape(IxDyn(&self.shape).f(), &self.values)
            .expect("gamma map has one value per reference voxel")
    }

    pub fn summarize(&self) -> GammaSummary {
        GammaSummary::from_values(&self.values)
    }
}

/// Compares a target dose grid against a reference grid.
///
/// All validation happens on construction; [`GammaEngine::run`] only fails
/// on numeric breakdown and never returns partial results.
pub struct GammaEngine {
    reference: DoseGrid,
    target: DoseGrid,
    config: GammaConfig,
    neighborhood: SearchNeighborhood,
    max_dose: f32,
}

impl GammaEngine {
    /// Validate the inputs and build the search neighborhood from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid, the grids differ in shape
    /// or spacing, or a dose maximum used for normalization is not positive.
    pub fn new(
        reference: DoseGrid,
        target: DoseGrid,
        config: GammaConfig,
    ) -> Result<Self, GammaError> {
        config.validate()?;
        let neighborhood = SearchNeighborhood::build(
            config.search_radius(),
            config.search_step(reference.spacing()),
            reference.dims(),
        )?;
        Self::with_neighborhood(reference, target, config, neighborhood)
    }

    /// Same as [`GammaEngine::new`] but reuses a prebuilt neighborhood, e.g.
    /// when several dose pairs share one geometry.
    pub fn with_neighborhood(
        reference: DoseGrid,
        target: DoseGrid,
        config: GammaConfig,
        neighborhood: SearchNeighborhood,
    ) -> Result<Self, GammaError> {
        config.validate()?;
        reference.check_same_geometry(&target)?;
        if neighborhood.dims() != reference.dims() {
            return Err(GammaError::InvalidConfig(format!(
                "{}D neighborhood for a {}D grid",
                neighborhood.dims(),
                reference.dims()
            )));
        }

        let (reference, target) = if config.normalize_inputs {
            (
                reference.normalized("reference")?,
                target.normalized("target")?,
            )
        } else {
            (reference, target)
        };

        let max_dose = reference.max();
        if max_dose <= 0.0 {
            return Err(GammaError::DegenerateDose {
                grid: "reference",
                max: max_dose,
            });
        }

        debug!(
            "GammaEngine::new dims={} shape={:?} spacing={:?} max_dose={max_dose} offsets={}",
            reference.dims(),
            reference.shape(),
            reference.spacing(),
            neighborhood.len()
        );

        Ok(Self {
            reference,
            target,
            config,
            neighborhood,
            max_dose,
        })
    }

    pub fn config(&self) -> &GammaConfig {
        &self.config
    }

    pub fn neighborhood(&self) -> &SearchNeighborhood {
        &self.neighborhood
    }

    pub fn max_dose(&self) -> f32 {
        self.max_dose
    }

    /// Reference dose below which voxels are excluded.
    pub fn cutoff_dose(&self) -> f32 {
        self.max_dose * self.config.cutoff_fraction
    }

    /// Evaluate every voxel. Voxels are independent, so
    /// [`Execution::Parallel`] spreads them over the rayon pool without any
    /// shared mutable state; both modes produce identical maps.
    pub fn run(&self) -> Result<GammaMap, GammaError> {
        let start = Instant::now();
        let voxels = self.reference.len();

        let values = match self.config.execution {
            Execution::Parallel => (0..voxels)
                .into_par_iter()
                .map(|index| self.gamma_at(index))
                .collect::<Result<Vec<_>, _>>()?,
            Execution::Sequential => (0..voxels)
                .map(|index| self.gamma_at(index))
                .collect::<Result<Vec<_>, _>>()?,
        };

        info!(
            "Gamma evaluation of {voxels} voxels took {:.3}s",
            start.elapsed().as_secs_f64()
        );

        Ok(GammaMap {
            values,
            shape: self.reference.shape().to_vec(),
        })
    }

    pub fn summarize(&self, map: &GammaMap) -> GammaSummary {
        map.summarize()
    }

    /// Gamma of a single voxel, [`EXCLUDED`] below the cutoff.
    ///
    /// # Errors
    ///
    /// [`GammaError::VoxelOutOfRange`] for an index past the grid, and
    /// [`GammaError::NonFiniteGamma`] when a candidate overflows.
    pub fn gamma_at(&self, index: usize) -> Result<f32, GammaError> {
        let voxels = self.reference.len();
        if index >= voxels {
            return Err(GammaError::VoxelOutOfRange { index, len: voxels });
        }

        let reference_dose = self.reference.sample(index);
        if reference_dose < self.cutoff_dose() {
            return Ok(EXCLUDED);
        }

        let dims = self.reference.dims();
        let shape = self.reference.shape();
        let spacing = self.reference.spacing();
        let subscript = self.reference.index_to_subscript(index);
        // the target is read at the voxel itself, only the reference is probed
        let target_dose = self.target.sample(index);

        let percent = self.config.dose_tolerance_percent / 100.0;
        let global_tolerance = self.max_dose * percent;
        let distance_tolerance_sq = self.config.distance_tolerance * self.config.distance_tolerance;

        let mut best = self.config.gamma_limit;
        let mut best_sq = best * best;
        let mut position = [0.0f32; MAX_DIMS];

        'offsets: for offset in self.neighborhood.offsets() {
            let distance_term = offset.squared_norm / distance_tolerance_sq;
            // offsets are sorted by distance, nothing further out can win
            if distance_term >= best_sq {
                break;
            }

            for axis in 0..dims {
                let upper = (shape[axis] - 1) as f32;
                let p = subscript[axis] as f32 + offset.delta[axis] / spacing[axis];
                if p < -EDGE_TOLERANCE || p > upper + EDGE_TOLERANCE {
                    continue 'offsets;
                }
                position[axis] = p.clamp(0.0, upper);
            }

            let probed = Interpolator::interpolate(&self.reference, &position[..dims]);
            let dose_tolerance = match self.config.normalization {
                Normalization::Global => global_tolerance,
                Normalization::Local => probed * percent,
            };
            if dose_tolerance <= 0.0 {
                continue;
            }

            let dose_term = (probed - target_dose) / dose_tolerance;
            let gamma_sq = dose_term.mul_add(dose_term, distance_term);
            if !gamma_sq.is_finite() {
                return Err(GammaError::NonFiniteGamma { index });
            }
            if gamma_sq < best_sq {
                best_sq = gamma_sq;
                best = gamma_sq.sqrt();
                if self.config.stop_at_pass && best <= 1.0 {
                    break;
                }
            }
        }

        Ok(best)
    }
}

/// Build the neighborhood `config` asks for on grids shaped like `grid`.
pub fn build_neighborhood(
    config: &GammaConfig,
    grid: &DoseGrid,
) -> Result<SearchNeighborhood, GammaError> {
    config.validate()?;
    SearchNeighborhood::build(
        config.search_radius(),
        config.search_step(grid.spacing()),
        grid.dims(),
    )
}

/// Run the whole comparison: validate, evaluate every voxel and summarize.
pub fn evaluate(
    reference: DoseGrid,
    target: DoseGrid,
    config: GammaConfig,
) -> Result<(GammaMap, GammaSummary), GammaError> {
    let engine = GammaEngine::new(reference, target, config)?;
    let map = engine.run()?;
    let summary = engine.summarize(&map);
    Ok((map, summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_1d(samples: &[f32]) -> DoseGrid {
        DoseGrid::new(samples.to_vec(), vec![samples.len()], vec![1.0]).unwrap()
    }

    fn sequential() -> GammaConfig {
        GammaConfig {
            execution: Execution::Sequential,
            ..GammaConfig::default()
        }
    }

    #[test]
    fn identical_profiles_have_zero_gamma() {
        let dose = [0.0, 10.0, 10.0, 10.0, 0.0];
        let engine = GammaEngine::new(grid_1d(&dose), grid_1d(&dose), sequential()).unwrap();
        let map = engine.run().unwrap();
        assert_eq!(map.values(), &[EXCLUDED, 0.0, 0.0, 0.0, EXCLUDED]);
    }

    #[test]
    fn cutoff_excludes_low_dose_voxels() {
        let reference = grid_1d(&[1.0, 5.0, 10.0, 4.9]);
        let target = grid_1d(&[100.0, 5.0, 10.0, 100.0]);
        let config = GammaConfig {
            cutoff_fraction: 0.5,
            ..sequential()
        };
        let engine = GammaEngine::new(reference, target, config).unwrap();
        assert_eq!(engine.cutoff_dose(), 5.0);
        let map = engine.run().unwrap();
        assert_eq!(map.get(0), Some(EXCLUDED));
        assert_eq!(map.get(3), Some(EXCLUDED));
        assert!(map.get(1).unwrap() >= 0.0);
        assert!(map.get(2).unwrap() >= 0.0);
    }

    #[test]
    fn gamma_is_capped_at_limit() {
        let reference = grid_1d(&[10.0, 10.0, 10.0]);
        let target = grid_1d(&[50.0, 50.0, 50.0]);
        let map = GammaEngine::new(reference, target, sequential())
            .unwrap()
            .run()
            .unwrap();
        assert!(map.values().iter().all(|&g| g == 2.0));
    }

    #[test]
    fn uniform_dose_shift_scales_with_tolerance() {
        // 0.15 Gy off on a 10 Gy plateau with a 3 % (0.3 Gy) criterion
        let reference = grid_1d(&[10.0; 5]);
        let target = grid_1d(&[10.15; 5]);
        let map = GammaEngine::new(reference, target, sequential())
            .unwrap()
            .run()
            .unwrap();
        for g in map.values() {
            assert!((g - 0.5).abs() < 1e-3, "got {g}");
        }
    }

    #[test]
    fn spatial_shift_is_found_by_search() {
        // target equals the reference moved by one voxel (1 mm); a pure
        // distance disagreement of 1 mm against a 3 mm criterion
        let reference = grid_1d(&[0.0, 0.0, 10.0, 20.0, 30.0, 40.0, 50.0, 0.0, 0.0]);
        let target = grid_1d(&[0.0, 0.0, 0.0, 10.0, 20.0, 30.0, 40.0, 50.0, 0.0]);
        let config = GammaConfig {
            cutoff_fraction: 0.3,
            dose_tolerance_percent: 1.0,
            ..sequential()
        };
        let map = GammaEngine::new(reference, target, config)
            .unwrap()
            .run()
            .unwrap();
        // voxels 3..=5 sit on the linear ramp
        for index in 3..=5 {
            let g = map.get(index).unwrap();
            assert!((g - 1.0 / 3.0).abs() < 1e-2, "voxel {index}: {g}");
        }
    }

    #[test]
    fn probes_outside_the_grid_are_skipped() {
        // the edge voxel would read past the array without the policy
        let reference = grid_1d(&[10.0, 8.0]);
        let target = grid_1d(&[9.0, 8.0]);
        let config = GammaConfig {
            dose_tolerance_percent: 10.0,
            distance_tolerance: 1.0,
            ..sequential()
        };
        let map = GammaEngine::new(reference, target, config)
            .unwrap()
            .run()
            .unwrap();
        let g = map.get(0).unwrap();
        assert!(g > 0.0 && g <= 1.0, "got {g}");
        assert_eq!(map.get(1), Some(0.0));
    }

    #[test]
    fn local_normalization_uses_probed_dose() {
        let reference = grid_1d(&[20.0, 20.0, 20.0]);
        let target = grid_1d(&[21.0, 21.0, 21.0]);
        let global = GammaConfig {
            dose_tolerance_percent: 10.0,
            distance_tolerance: 0.1,
            ..sequential()
        };
        let local = GammaConfig {
            normalization: Normalization::Local,
            ..global.clone()
        };
        // with a flat field both reduce to 1 / 2
        for config in [global, local] {
            let map = GammaEngine::new(reference.clone(), target.clone(), config)
                .unwrap()
                .run()
                .unwrap();
            assert!(map.values().iter().all(|g| (g - 0.5).abs() < 1e-4));
        }
    }

    #[test]
    fn local_normalization_skips_zero_dose_probes() {
        let reference = grid_1d(&[0.0, 10.0, 10.0]);
        let target = grid_1d(&[0.0, 10.0, 10.5]);
        let global = GammaConfig {
            cutoff_fraction: 0.0,
            ..sequential()
        };
        let local = GammaConfig {
            normalization: Normalization::Local,
            ..global.clone()
        };
        let limit = global.gamma_limit;

        let global = GammaEngine::new(reference.clone(), target.clone(), global)
            .unwrap()
            .run()
            .unwrap();
        let local = GammaEngine::new(reference, target, local)
            .unwrap()
            .run()
            .unwrap();

        // globally the zero dose voxel agrees with itself
        assert_eq!(global.get(0), Some(0.0));
        // locally its own probe has no tolerance; every positive probe
        // within reach misses by far more than 3 %, so gamma stays capped
        let edge = local.get(0).unwrap();
        assert!(edge.is_finite());
        assert_eq!(edge, limit);
        assert_ne!(global, local);

        assert_eq!(local.get(1), Some(0.0));
        // 0.5 Gy against 3 % of 10 Gy on the plateau in both modes
        for map in [&global, &local] {
            let g = map.get(2).unwrap();
            assert!((g - 0.5 / 0.3).abs() < 1e-3, "got {g}");
        }
    }

    #[test]
    fn gamma_at_rejects_voxels_past_the_grid() {
        let dose = [5.0, 10.0];
        let engine = GammaEngine::new(grid_1d(&dose), grid_1d(&dose), sequential()).unwrap();
        assert_eq!(engine.gamma_at(1).unwrap(), 0.0);
        assert!(matches!(
            engine.gamma_at(5),
            Err(GammaError::VoxelOutOfRange { index: 5, len: 2 })
        ));
    }

    #[test]
    fn overflowing_dose_difference_is_a_compute_error() {
        let reference = grid_1d(&[3.0e38; 3]);
        let target = grid_1d(&[-3.0e38; 3]);
        assert!(matches!(
            GammaEngine::new(reference, target, sequential()).unwrap().run(),
            Err(GammaError::NonFiniteGamma { index: 0 })
        ));
    }

    #[test]
    fn stop_at_pass_keeps_classification() {
        let reference = grid_1d(&[0.0, 5.0, 10.0, 15.0, 20.0, 25.0, 0.0]);
        let target = grid_1d(&[0.0, 5.2, 10.4, 15.1, 21.5, 25.0, 0.0]);
        let exact = GammaEngine::new(reference.clone(), target.clone(), sequential())
            .unwrap()
            .run()
            .unwrap();
        let fast = GammaEngine::new(
            reference,
            target,
            GammaConfig {
                stop_at_pass: true,
                ..sequential()
            },
        )
        .unwrap()
        .run()
        .unwrap();
        for (a, b) in exact.values().iter().zip(fast.values()) {
            assert_eq!(*a > 1.0, *b > 1.0);
            assert!(b >= a);
        }
    }

    #[test]
    fn parallel_matches_sequential() {
        let reference: Vec<f32> = (0..40).map(|i| (i as f32 * 0.3).sin() * 10.0 + 10.0).collect();
        let target: Vec<f32> = reference.iter().map(|v| v * 1.02).collect();
        let make = |execution: Execution| {
            GammaEngine::new(
                grid_1d(&reference),
                grid_1d(&target),
                GammaConfig {
                    execution,
                    ..GammaConfig::default()
                },
            )
            .unwrap()
            .run()
            .unwrap()
        };
        assert_eq!(make(Execution::Parallel), make(Execution::Sequential));
    }

    #[test]
    fn rejects_degenerate_inputs() {
        let zero = grid_1d(&[0.0; 4]);
        assert!(matches!(
            GammaEngine::new(zero.clone(), zero.clone(), sequential()),
            Err(GammaError::DegenerateDose { grid: "reference", .. })
        ));

        let ok = grid_1d(&[1.0; 4]);
        let config = GammaConfig {
            normalize_inputs: true,
            ..sequential()
        };
        assert!(matches!(
            GammaEngine::new(ok.clone(), zero, config),
            Err(GammaError::DegenerateDose { grid: "target", .. })
        ));

        let shorter = grid_1d(&[1.0; 3]);
        assert!(matches!(
            GammaEngine::new(ok, shorter, sequential()),
            Err(GammaError::GridMismatch(_))
        ));
    }

    #[test]
    fn rejects_neighborhood_of_wrong_dimension() {
        let grid = grid_1d(&[1.0; 4]);
        let hood = SearchNeighborhood::build(1.0, 0.5, 2).unwrap();
        assert!(matches!(
            GammaEngine::with_neighborhood(grid.clone(), grid, sequential(), hood),
            Err(GammaError::InvalidConfig(_))
        ));
    }

    #[test]
    fn normalize_inputs_divides_by_own_maximum() {
        // same shape, different scale: identical after normalization
        let reference = grid_1d(&[2.0, 4.0, 8.0]);
        let target = grid_1d(&[1.0, 2.0, 4.0]);
        let config = GammaConfig {
            normalize_inputs: true,
            cutoff_fraction: 0.0,
            ..sequential()
        };
        let engine = GammaEngine::new(reference, target, config).unwrap();
        assert_eq!(engine.max_dose(), 1.0);
        let map = engine.run().unwrap();
        assert!(map.values().iter().all(|&g| g == 0.0));
    }
}
