use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::Algorithm;
use crate::error::{invalid, Result};
use crate::segmentation::GrayLevels;

fn default_iterations() -> usize {
    10
}

fn default_fix_prob() -> f64 {
    0.9
}

fn default_algorithm() -> Algorithm {
    Algorithm::Sart
}

fn default_inner_iters() -> usize {
    5
}

fn default_sigma() -> f32 {
    1.0
}

/// Everything one DART run needs besides the engine and the measured data.
///
/// Threaded explicitly into every run; nothing here is cached between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DartParams {
    /// Number of DART iterations after the warm start.
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    /// Probability that a non-boundary pixel stays fixed in an iteration.
    #[serde(default = "default_fix_prob")]
    pub fix_prob: f64,
    pub gray_levels: GrayLevels,
    #[serde(default = "default_algorithm")]
    pub algorithm: Algorithm,
    /// Engine iterations per call (ignored by FBP).
    #[serde(default = "default_inner_iters")]
    pub inner_iters: usize,
    #[serde(default)]
    pub rng_seed: u64,
    /// Standard deviation of the inter-iteration blur; `0` disables it.
    #[serde(default = "default_sigma")]
    pub smoothing_sigma: f32,
}

impl DartParams {
    pub fn new(gray_levels: GrayLevels) -> Self {
        Self {
            iterations: default_iterations(),
            fix_prob: default_fix_prob(),
            gray_levels,
            algorithm: default_algorithm(),
            inner_iters: default_inner_iters(),
            rng_seed: 0,
            smoothing_sigma: default_sigma(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(invalid("DART iteration count must be positive"));
        }
        if self.algorithm.is_iterative() && self.inner_iters == 0 {
            return Err(invalid("inner iteration count must be positive"));
        }
        if !(0.0..=1.0).contains(&self.fix_prob) {
            return Err(invalid(format!(
                "fixed-pixel probability {} is outside [0, 1]",
                self.fix_prob
            )));
        }
        if !(self.smoothing_sigma.is_finite() && self.smoothing_sigma >= 0.0) {
            return Err(invalid(format!(
                "smoothing sigma {} must be finite and non-negative",
                self.smoothing_sigma
            )));
        }
        self.gray_levels.thresholds()?;
        Ok(())
    }
}

impl fmt::Display for DartParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} iterations, {} x {} inner, p_fix={}, {} gray levels",
            self.iterations,
            self.algorithm,
            self.inner_iters,
            self.fix_prob,
            self.gray_levels.len()
        )
    }
}
