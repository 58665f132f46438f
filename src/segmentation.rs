//! Gray-level segmentation.
//!
//! A [`GrayLevels`] set induces a [`ThresholdTable`] with `L + 1` boundaries:
//! `t[0] = LOWER_BOUND`, `t[i] = (gray[i-1] + gray[i]) / 2`, `t[L] = UPPER_BOUND`.
//! A pixel is assigned `gray[i]` iff `t[i] <= pixel < t[i+1]`, so a value lying
//! exactly on an interior threshold rounds to the upper level. Values below
//! `t[0]` fall into the first level and values at or above `t[L]` into the last
//! one, which keeps segmentation total.
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{invalid, DartError, Result};

/// Lower sentinel of the threshold table.
pub const LOWER_BOUND: f32 = 0.0;
/// Upper sentinel of the threshold table. Kept above 255 so the brightest
/// admissible intensity still lies inside the last half-open interval.
pub const UPPER_BOUND: f32 = 256.0;

/// Validated, ascending set of a priori gray levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct GrayLevels {
    levels: Vec<f32>,
}

impl GrayLevels {
    /// Sorts `levels` ascending; rejects empty, non-finite or repeated values.
    pub fn new(mut levels: Vec<f32>) -> Result<Self> {
        if levels.is_empty() {
            return Err(invalid("gray level set is empty"));
        }
        if let Some(bad) = levels.iter().find(|v| !v.is_finite()) {
            return Err(invalid(format!("gray level {bad} is not finite")));
        }
        levels.sort_by(f32::total_cmp);
        if let Some(w) = levels.windows(2).find(|w| w[0] == w[1]) {
            return Err(invalid(format!("gray level {} appears twice", w[0])));
        }
        Ok(Self { levels })
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Threshold table with the default `[LOWER_BOUND, UPPER_BOUND]` sentinels.
    pub fn thresholds(&self) -> Result<ThresholdTable> {
        ThresholdTable::new(self, LOWER_BOUND, UPPER_BOUND)
    }
}

impl TryFrom<Vec<f32>> for GrayLevels {
    type Error = DartError;

    fn try_from(levels: Vec<f32>) -> Result<Self> {
        Self::new(levels)
    }
}

impl From<GrayLevels> for Vec<f32> {
    fn from(g: GrayLevels) -> Self {
        g.levels
    }
}

/// `L + 1` strictly increasing interval boundaries paired with their levels.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdTable {
    bounds: Vec<f32>,
    levels: Vec<f32>,
}

impl ThresholdTable {
    pub fn new(levels: &GrayLevels, lower: f32, upper: f32) -> Result<Self> {
        let g = levels.as_slice();
        let mut bounds = Vec::with_capacity(g.len() + 1);
        bounds.push(lower);
        bounds.extend(g.windows(2).map(|w| 0.5 * (w[0] + w[1])));
        bounds.push(upper);

        if !bounds.windows(2).all(|w| w[0] < w[1]) {
            return Err(invalid(format!(
                "thresholds {bounds:?} for gray levels {g:?} are not strictly increasing"
            )));
        }
        Ok(Self {
            bounds,
            levels: g.to_vec(),
        })
    }

    pub fn bounds(&self) -> &[f32] {
        &self.bounds
    }

    /// Index of the level whose interval contains `value`.
    ///
    /// NaN compares false against every threshold and lands in level 0.
    #[inline]
    pub fn level_index(&self, value: f32) -> usize {
        let interior = &self.bounds[1..self.bounds.len() - 1];
        interior.partition_point(|&t| t <= value)
    }

    #[inline]
    pub fn classify(&self, value: f32) -> f32 {
        self.levels[self.level_index(value)]
    }
}

/// Map every pixel of `image` onto its gray level.
///
/// Thresholds are rebuilt from `levels` on every call so a refined level set
/// takes effect immediately.
pub fn segment(image: ArrayView2<'_, f32>, levels: &GrayLevels) -> Result<Array2<f32>> {
    let table = levels.thresholds()?;
    Ok(image.mapv(|v| table.classify(v)))
}
