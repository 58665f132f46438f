use ndarray::{Array2, ArrayView2, Zip};

use crate::engine::ReconstructionEngine;
use crate::error::{ensure_shape, Result};
use crate::geometry::Sinogram;

/// Splits an image into its fixed part and the projection data left over for
/// the free pixels.
pub struct ResidualProjector<'a, E: ReconstructionEngine + ?Sized> {
    engine: &'a E,
    measured: &'a Sinogram,
}

impl<'a, E: ReconstructionEngine + ?Sized> ResidualProjector<'a, E> {
    pub fn new(engine: &'a E, measured: &'a Sinogram) -> Result<Self> {
        ensure_shape("measured sinogram", measured.shape(), engine.sinogram_shape())?;
        Ok(Self { engine, measured })
    }

    /// Returns `(fixed_image, residual)` where `fixed_image` is `image` with
    /// every free pixel zeroed and `residual = measured - A · fixed_image`.
    /// Residual values may be negative; nothing is clamped here.
    pub fn split(
        &self,
        image: ArrayView2<'_, f32>,
        free: ArrayView2<'_, bool>,
    ) -> Result<(Array2<f32>, Sinogram)> {
        let shape = self.engine.volume_shape();
        ensure_shape("image", image.dim(), shape)?;
        ensure_shape("free-pixel mask", free.dim(), shape)?;

        let fixed_image = Zip::from(image)
            .and(free)
            .map_collect(|&v, &is_free| if is_free { 0.0 } else { v });
        let projected = self.engine.forward_project(fixed_image.view())?;
        let residual = self.engine.create_sinogram_handle(&self.measured.view() - &projected)?;
        Ok((fixed_image, residual))
    }
}
