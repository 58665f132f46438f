//! Random selection of additional free pixels.
use ndarray::Array2;
use ndarray_rand::rand_distr::Bernoulli;
use ndarray_rand::RandomExt;
use rand::Rng;

use crate::error::{invalid, Result};

/// Independent Bernoulli mask: each pixel is `true` (free) with probability
/// `1 - fix_prob` and `false` (fixed) with probability `fix_prob`.
///
/// `fix_prob = 1` frees nothing and `fix_prob = 0` frees every pixel.
pub fn sample_free_pixels<R: Rng + ?Sized>(
    shape: (usize, usize),
    fix_prob: f64,
    rng: &mut R,
) -> Result<Array2<bool>> {
    if !(0.0..=1.0).contains(&fix_prob) {
        return Err(invalid(format!(
            "fixed-pixel probability {fix_prob} is outside [0, 1]"
        )));
    }
    let dist = Bernoulli::new(1.0 - fix_prob)
        .map_err(|e| invalid(format!("free-pixel distribution: {e}")))?;
    Ok(Array2::random_using(shape, dist, rng))
}
