//! Reconstruction quality measures.
use ndarray::{ArrayView2, Zip};

use crate::error::{ensure_shape, Result};

/// Mean of `|a - b|` over all pixels.
pub fn mean_absolute_error(a: ArrayView2<'_, f32>, b: ArrayView2<'_, f32>) -> Result<f32> {
    ensure_shape("compared image", b.dim(), a.dim())?;
    if a.is_empty() {
        return Ok(0.0);
    }
    let mut total = 0.0f64;
    Zip::from(a).and(b).for_each(|&x, &y| total += (x - y).abs() as f64);
    Ok((total / a.len() as f64) as f32)
}

/// Number of pixels whose values differ by more than `tolerance`.
pub fn mismatched_pixels(a: ArrayView2<'_, f32>, b: ArrayView2<'_, f32>, tolerance: f32) -> Result<usize> {
    ensure_shape("compared image", b.dim(), a.dim())?;
    let mut count = 0;
    Zip::from(a).and(b).for_each(|&x, &y| {
        if (x - y).abs() > tolerance {
            count += 1;
        }
    });
    Ok(count)
}
