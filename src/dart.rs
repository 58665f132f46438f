//! The DART control loop.
//!
//! A run warms up with one unconstrained engine call, then repeats: segment the
//! estimate, free the boundary pixels plus a random subset of the rest,
//! reconstruct only the free pixels against the residual sinogram, merge, and
//! smooth the free pixels. The final estimate is segmented once more and
//! returned.
use ndarray::{Array2, ArrayView2, Zip};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::boundary::NeighborCache;
use crate::config::DartParams;
use crate::engine::ReconstructionEngine;
use crate::error::{ensure_shape, DartError, Result};
use crate::geometry::Sinogram;
use crate::mask::PixelMask;
use crate::residual::ResidualProjector;
use crate::sampling::sample_free_pixels;
use crate::segmentation::{segment, GrayLevels};
use crate::smoothing::smooth_free_pixels;

/// Intensity range every engine result is clamped to.
pub const INTENSITY_MIN: f32 = 0.0;
pub const INTENSITY_MAX: f32 = 255.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DartState {
    Uninitialized,
    Warmed,
    /// 1-based index of the iteration in progress.
    Iterating(usize),
    Done,
}

/// Snapshot handed to an observer after the merge step of each iteration.
#[derive(Debug)]
pub struct IterationReport<'r> {
    pub iteration: usize,
    pub iterations: usize,
    pub boundary_pixels: usize,
    pub free_pixels: usize,
    pub fixed_pixels: usize,
    /// L2 norm of the residual sinogram the free pixels were solved against.
    pub residual_norm: f32,
    /// Merged estimate, before smoothing.
    pub merged: ArrayView2<'r, f32>,
    pub gray_levels: &'r GrayLevels,
}

/// Drives DART against a borrowed engine and measured sinogram.
///
/// Holds no run configuration; the only state kept between runs is the
/// neighbor-table cache.
pub struct DartLoop<'a, E: ReconstructionEngine + ?Sized> {
    engine: &'a E,
    sinogram: &'a Sinogram,
    neighbors: NeighborCache,
    state: DartState,
}

impl<'a, E: ReconstructionEngine + ?Sized> DartLoop<'a, E> {
    pub fn new(engine: &'a E, sinogram: &'a Sinogram) -> Result<Self> {
        ensure_shape("measured sinogram", sinogram.shape(), engine.sinogram_shape())?;
        Ok(Self {
            engine,
            sinogram,
            neighbors: NeighborCache::new(),
            state: DartState::Uninitialized,
        })
    }

    pub fn state(&self) -> DartState {
        self.state
    }

    /// Run DART and return the clamped, fully segmented reconstruction.
    pub fn run(&mut self, params: &DartParams) -> Result<Array2<f32>> {
        self.run_with_observer(params, |_| None)
    }

    /// Like [`run`](Self::run), calling `observer` after every merge. Returning
    /// `Some(levels)` replaces the gray levels used from the next segmentation
    /// on, including the final one.
    pub fn run_with_observer<F>(&mut self, params: &DartParams, observer: F) -> Result<Array2<f32>>
    where
        F: FnMut(&IterationReport<'_>) -> Option<GrayLevels>,
    {
        self.state = DartState::Uninitialized;
        let result = self.drive(params, observer);
        if let Err(e) = &result {
            log::warn!("DART run aborted in state {:?}: {}", self.state, e);
            self.state = DartState::Uninitialized;
        }
        result
    }

    fn drive<F>(&mut self, params: &DartParams, mut observer: F) -> Result<Array2<f32>>
    where
        F: FnMut(&IterationReport<'_>) -> Option<GrayLevels>,
    {
        params.validate()?;
        let shape = self.engine.volume_shape();
        let table = self.neighbors.table(shape)?;
        let projector = ResidualProjector::new(self.engine, self.sinogram)?;
        let mut rng = StdRng::seed_from_u64(params.rng_seed);
        let mut levels = params.gray_levels.clone();
        let n = params.iterations;

        log::info!("DART: {}, shape {:?}", params, shape);

        let zeros = Array2::<f32>::zeros(shape);
        let mut estimate = self.call_engine(self.sinogram, zeros.view(), None, params)?;
        self.state = DartState::Warmed;
        log::debug!("warm start done");

        for k in 1..=n {
            self.state = DartState::Iterating(k);

            let segmented = segment(estimate.view(), &levels)?;
            let (boundary, sampled) = rayon::join(
                || table.boundary_mask(segmented.view()),
                || sample_free_pixels(shape, params.fix_prob, &mut rng),
            );
            let boundary = boundary?;
            let mask = PixelMask::union(&boundary, &sampled?)?;
            let free = mask.free();

            let (fixed_image, residual) = projector.split(segmented.view(), free.view())?;
            let seed = Zip::from(&fixed_image)
                .and(&estimate)
                .and(free)
                .map_collect(|&s, &e, &is_free| if is_free { e } else { s });
            let recon = self.call_engine(&residual, seed.view(), Some(free.view()), params)?;

            estimate = Zip::from(&segmented)
                .and(&recon)
                .and(free)
                .map_collect(|&s, &r, &is_free| if is_free { r } else { s });

            let report = IterationReport {
                iteration: k,
                iterations: n,
                boundary_pixels: boundary.iter().filter(|&&b| b).count(),
                free_pixels: mask.free_count(),
                fixed_pixels: mask.fixed_count(),
                residual_norm: residual.view().iter().map(|v| v * v).sum::<f32>().sqrt(),
                merged: estimate.view(),
                gray_levels: &levels,
            };
            log::info!(
                "DART iteration {}/{}: {} boundary, {} free pixels, residual {:.3}",
                k,
                n,
                report.boundary_pixels,
                report.free_pixels,
                report.residual_norm
            );
            if let Some(updated) = observer(&report) {
                updated.thresholds()?;
                log::debug!("gray levels refined to {:?}", updated.as_slice());
                levels = updated;
            }

            if k < n && params.smoothing_sigma > 0.0 {
                smooth_free_pixels(&mut estimate, free, params.smoothing_sigma);
            }
        }

        let result = segment(estimate.view(), &levels)?;
        self.state = DartState::Done;
        Ok(result)
    }

    /// Engine call followed by the finiteness check and the intensity clamp.
    fn call_engine(
        &self,
        sinogram: &Sinogram,
        seed: ArrayView2<'_, f32>,
        mask: Option<ArrayView2<'_, bool>>,
        params: &DartParams,
    ) -> Result<Array2<f32>> {
        let mut out = self.engine.reconstruct(
            sinogram,
            seed,
            mask,
            params.algorithm,
            params.inner_iters,
        )?;
        ensure_shape("engine output", out.dim(), self.engine.volume_shape())?;
        if out.iter().any(|v| !v.is_finite()) {
            return Err(DartError::ReconstructionFailure(format!(
                "{} returned non-finite values",
                params.algorithm
            )));
        }
        out.mapv_inplace(|v| v.clamp(INTENSITY_MIN, INTENSITY_MAX));
        Ok(out)
    }
}
