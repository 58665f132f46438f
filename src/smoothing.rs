//! Separable Gaussian blur used between DART iterations.
//!
//! Kernel radius is `round(4 * sigma)`; borders use half-sample symmetric
//! reflection (`d c b a | a b c d`).
use ndarray::{Array2, ArrayView2, Zip};

/// Normalized 1D Gaussian taps for offsets `-radius..=radius`.
pub fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (4.0 * sigma + 0.5) as usize;
    if radius == 0 {
        return vec![1.0];
    }
    let denom = 2.0 * sigma * sigma;
    let mut taps: Vec<f32> = (0..=2 * radius)
        .map(|k| {
            let d = k as f32 - radius as f32;
            (-d * d / denom).exp()
        })
        .collect();
    let sum: f32 = taps.iter().sum();
    taps.iter_mut().for_each(|t| *t /= sum);
    taps
}

#[inline]
fn reflect(i: isize, n: usize) -> usize {
    let period = 2 * n as isize;
    let m = i.rem_euclid(period);
    if m < n as isize {
        m as usize
    } else {
        (period - 1 - m) as usize
    }
}

/// Blur `image` with a Gaussian of standard deviation `sigma` (in pixels).
/// `sigma <= 0` returns a copy.
pub fn gaussian_blur(image: ArrayView2<'_, f32>, sigma: f32) -> Array2<f32> {
    let (rows, cols) = image.dim();
    if !(sigma > 0.0) || rows == 0 || cols == 0 {
        return image.to_owned();
    }
    let taps = gaussian_kernel(sigma);
    let radius = (taps.len() / 2) as isize;

    let mut tmp = Array2::<f32>::zeros((rows, cols));
    for r in 0..rows {
        for c in 0..cols {
            tmp[[r, c]] = taps
                .iter()
                .enumerate()
                .map(|(k, &w)| w * image[[r, reflect(c as isize + k as isize - radius, cols)]])
                .sum();
        }
    }
    let mut out = Array2::<f32>::zeros((rows, cols));
    for r in 0..rows {
        for c in 0..cols {
            out[[r, c]] = taps
                .iter()
                .enumerate()
                .map(|(k, &w)| w * tmp[[reflect(r as isize + k as isize - radius, rows), c]])
                .sum();
        }
    }
    out
}

/// Blur the whole `image`, then write the result back only where `free` is set.
pub fn smooth_free_pixels(image: &mut Array2<f32>, free: &Array2<bool>, sigma: f32) {
    let blurred = gaussian_blur(image.view(), sigma);
    Zip::from(image)
        .and(free)
        .and(&blurred)
        .for_each(|v, &is_free, &b| {
            if is_free {
                *v = b;
            }
        });
}
