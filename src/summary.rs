use log::warn;
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;

/// Pass/fail statistics over a gamma map.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GammaSummary {
    pub total: usize,
    /// Voxels below the low-dose cutoff.
    pub excluded: usize,
    pub evaluated: usize,
    pub passed: usize,
    /// Evaluated voxels with gamma > 1.
    pub failed: usize,
    /// `None` when no voxel was evaluated.
    pub pass_rate_percent: Option<f64>,
    pub mean_gamma: Option<f64>,
    pub max_gamma: Option<f32>,
}

#[derive(Clone, Copy, Default)]
struct Tally {
    excluded: usize,
    failed: usize,
    sum: f64,
    max: Option<f32>,
}

impl Tally {
    fn add(mut self, gamma: f32) -> Self {
        if gamma < 0.0 {
            self.excluded += 1;
            return self;
        }
        if gamma > 1.0 {
            self.failed += 1;
        }
        self.sum += f64::from(gamma);
        self.max = Some(self.max.map_or(gamma, |m| m.max(gamma)));
        self
    }

    fn merge(self, other: Self) -> Self {
        Self {
            excluded: self.excluded + other.excluded,
            failed: self.failed + other.failed,
            sum: self.sum + other.sum,
            max: match (self.max, other.max) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            },
        }
    }
}

impl GammaSummary {
    /// Reduce per-voxel gamma values, negative entries counting as excluded.
    pub fn from_values(values: &[f32]) -> Self {
        let tally = values
            .par_iter()
            .fold(Tally::default, |tally, &gamma| tally.add(gamma))
            .reduce(Tally::default, Tally::merge);

        let total = values.len();
        let evaluated = total - tally.excluded;
        let passed = evaluated - tally.failed;
        let (pass_rate_percent, mean_gamma) = if evaluated == 0 {
            warn!("No voxel above the dose cutoff, pass rate is undefined");
            (None, None)
        } else {
            (
                Some(passed as f64 / evaluated as f64 * 100.0),
                Some(tally.sum / evaluated as f64),
            )
        };

        Self {
            total,
            excluded: tally.excluded,
            evaluated,
            passed,
            failed: tally.failed,
            pass_rate_percent,
            mean_gamma,
            max_gamma: tally.max,
        }
    }
}

impl fmt::Display for GammaSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total voxels:     {}", self.total)?;
        writeln!(f, "Below cutoff:     {}", self.excluded)?;
        writeln!(f, "Evaluated:        {}", self.evaluated)?;
        writeln!(f, "Gamma > 1:        {}", self.failed)?;
        match (self.pass_rate_percent, self.mean_gamma, self.max_gamma) {
            (Some(rate), Some(mean), Some(max)) => {
                writeln!(f, "Mean gamma:       {mean:.4}")?;
                writeln!(f, "Max gamma:        {max:.4}")?;
                write!(f, "Gamma pass rate:  {rate:.4}%")
            }
            _ => write!(f, "Gamma pass rate:  undefined (no voxel evaluated)"),
        }
    }
}
