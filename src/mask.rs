use ndarray::{Array2, Zip};

use crate::error::{ensure_shape, Result};

/// Partition of the reconstruction grid into free and fixed pixels.
///
/// Only the free grid is stored; the fixed set is always its complement, so
/// the two can never overlap or leave a pixel unassigned.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelMask {
    free: Array2<bool>,
}

impl PixelMask {
    /// `free = boundary ∪ sampled`.
    pub fn union(boundary: &Array2<bool>, sampled: &Array2<bool>) -> Result<Self> {
        ensure_shape("sampled free-pixel mask", sampled.dim(), boundary.dim())?;
        let free = Zip::from(boundary)
            .and(sampled)
            .map_collect(|&b, &s| b || s);
        Ok(Self { free })
    }

    pub fn free(&self) -> &Array2<bool> {
        &self.free
    }

    pub fn free_count(&self) -> usize {
        self.free.iter().filter(|&&b| b).count()
    }

    pub fn fixed_count(&self) -> usize {
        self.free.len() - self.free_count()
    }
}
