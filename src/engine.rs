//! Continuous reconstruction engines driven by the DART loop.
//!
//! [`ReconstructionEngine`] is the seam between DART and whatever performs the
//! algebraic reconstruction. [`CpuEngine`] is a reference implementation over
//! the pixel-driven [`SystemMatrix`].
use std::f32::consts::PI;
use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{ensure_shape, invalid, DartError, Result};
use crate::geometry::{is_active, ParallelBeamGeometry, Sinogram, SystemMatrix};

/// Closed set of continuous reconstruction algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Algorithm {
    Sart,
    Sirt,
    Fbp,
    SartCuda,
    SirtCuda,
    FbpCuda,
}

impl Algorithm {
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Sart => "SART",
            Algorithm::Sirt => "SIRT",
            Algorithm::Fbp => "FBP",
            Algorithm::SartCuda => "SART_CUDA",
            Algorithm::SirtCuda => "SIRT_CUDA",
            Algorithm::FbpCuda => "FBP_CUDA",
        }
    }

    pub fn is_gpu(self) -> bool {
        matches!(
            self,
            Algorithm::SartCuda | Algorithm::SirtCuda | Algorithm::FbpCuda
        )
    }

    /// Iterative algorithms honor `inner_iters`; FBP is a single pass.
    pub fn is_iterative(self) -> bool {
        !matches!(self, Algorithm::Fbp | Algorithm::FbpCuda)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = DartError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SART" => Ok(Algorithm::Sart),
            "SIRT" => Ok(Algorithm::Sirt),
            "FBP" => Ok(Algorithm::Fbp),
            "SART_CUDA" => Ok(Algorithm::SartCuda),
            "SIRT_CUDA" => Ok(Algorithm::SirtCuda),
            "FBP_CUDA" => Ok(Algorithm::FbpCuda),
            _ => Err(DartError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

impl TryFrom<String> for Algorithm {
    type Error = DartError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Algorithm> for String {
    fn from(a: Algorithm) -> Self {
        a.name().to_string()
    }
}

/// Contract DART relies on. Geometry and projector live behind the engine and
/// are never modified by DART.
pub trait ReconstructionEngine {
    /// `(rows, cols)` of reconstructions.
    fn volume_shape(&self) -> (usize, usize);

    /// `(n_detectors, n_angles)` of projection data.
    fn sinogram_shape(&self) -> (usize, usize);

    /// Wrap raw projection data for reuse across calls.
    fn create_sinogram_handle(&self, data: Array2<f32>) -> Result<Sinogram> {
        Sinogram::with_shape(self.sinogram_shape(), data)
    }

    /// Projection of `image` under the engine's geometry.
    fn forward_project(&self, image: ArrayView2<'_, f32>) -> Result<Array2<f32>>;

    /// Run `algorithm` for `inner_iters` steps starting from `seed`.
    ///
    /// With a `mask`, only pixels where it is `true` are modeled and updated;
    /// the others keep their seed value. An all-`false` mask is a no-op. The
    /// output is clamped to the engine's intensity range.
    fn reconstruct(
        &self,
        sinogram: &Sinogram,
        seed: ArrayView2<'_, f32>,
        mask: Option<ArrayView2<'_, bool>>,
        algorithm: Algorithm,
        inner_iters: usize,
    ) -> Result<Array2<f32>>;
}

/// Relaxation and box constraint shared by the iterative algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub relaxation: f32,
    pub min_constraint: f32,
    pub max_constraint: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            relaxation: 1.0,
            min_constraint: 0.0,
            max_constraint: 255.0,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.relaxation.is_finite() && self.relaxation > 0.0) {
            return Err(invalid(format!(
                "relaxation {} must be positive",
                self.relaxation
            )));
        }
        if !(self.min_constraint < self.max_constraint) {
            return Err(invalid(format!(
                "constraint range [{}, {}] is empty",
                self.min_constraint, self.max_constraint
            )));
        }
        Ok(())
    }

    #[inline]
    fn clamp(&self, v: f32) -> f32 {
        v.clamp(self.min_constraint, self.max_constraint)
    }
}

const EPS: f32 = 1e-6;

/// Single-threaded CPU engine with SART, SIRT and FBP.
#[derive(Debug, Clone)]
pub struct CpuEngine {
    projector: SystemMatrix,
    config: EngineConfig,
}

impl CpuEngine {
    pub fn new(geometry: ParallelBeamGeometry, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            projector: SystemMatrix::new(geometry)?,
            config,
        })
    }

    pub fn geometry(&self) -> &ParallelBeamGeometry {
        self.projector.geometry()
    }

    /// One SART sweep: every angle in order, each a simultaneous block update
    /// followed by the box constraint.
    fn sart_sweep(&self, b: &[f32], x: &mut [f32], active: &[usize], ray_weights: &[f32]) {
        let n_angles = self.geometry().n_angles();
        let lambda = self.config.relaxation;
        for angle in 0..n_angles {
            let fp = self.projector.forward_angle(x, active, angle);
            let corr: Vec<f32> = fp
                .iter()
                .enumerate()
                .map(|(d, &p)| {
                    let i = d * n_angles + angle;
                    if ray_weights[i] > EPS {
                        (b[i] - p) / ray_weights[i]
                    } else {
                        0.0
                    }
                })
                .collect();
            for &j in active {
                let c = self.projector.angle_weight(j, angle);
                if c > EPS {
                    let update = self.projector.back_angle_pixel(&corr, j, angle) / c;
                    x[j] = self.config.clamp(x[j] + lambda * update);
                }
            }
        }
    }

    fn sirt_step(
        &self,
        b: &[f32],
        x: &mut [f32],
        active: &[usize],
        mask: Option<&[bool]>,
        ray_weights: &[f32],
        pixel_weights: &[f32],
    ) {
        let lambda = self.config.relaxation;
        let fp = self.projector.forward_flat(x, mask);
        let corr: Vec<f32> = fp
            .iter()
            .zip(b)
            .zip(ray_weights)
            .map(|((&p, &bi), &r)| if r > EPS { (bi - p) / r } else { 0.0 })
            .collect();
        for &j in active {
            let c = pixel_weights[j];
            if c > EPS {
                let update = self.projector.back_pixel(&corr, j) / c;
                x[j] = self.config.clamp(x[j] + lambda * update);
            }
        }
    }

    /// Ram-Lak filtered backprojection; assumes angles spread over a half turn.
    fn fbp(&self, b: &[f32], x: &mut [f32], active: &[usize]) {
        let g = self.geometry();
        let (n_det, n_angles) = (g.n_detectors, g.n_angles());
        let tau = g.detector_spacing;
        let kernel = ramp_kernel(n_det);

        let mut filtered = vec![0.0f32; b.len()];
        for a in 0..n_angles {
            for d in 0..n_det {
                let mut acc = 0.0f32;
                for k in 0..n_det {
                    acc += kernel[d.abs_diff(k)] * b[k * n_angles + a];
                }
                filtered[d * n_angles + a] = acc / tau;
            }
        }

        let scale = PI / n_angles as f32 * tau;
        for &j in active {
            x[j] = self.config.clamp(scale * self.projector.back_pixel(&filtered, j));
        }
    }
}

/// Spatial Ram-Lak taps `h[n]` for `n = 0..len`, in units of the bin spacing.
fn ramp_kernel(len: usize) -> Vec<f32> {
    (0..len)
        .map(|n| match n {
            0 => 0.25,
            n if n % 2 == 1 => -1.0 / (PI * PI * (n * n) as f32),
            _ => 0.0,
        })
        .collect()
}

impl ReconstructionEngine for CpuEngine {
    fn volume_shape(&self) -> (usize, usize) {
        self.geometry().volume_shape()
    }

    fn sinogram_shape(&self) -> (usize, usize) {
        self.geometry().sinogram_shape()
    }

    fn forward_project(&self, image: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        self.projector.forward(image)
    }

    fn reconstruct(
        &self,
        sinogram: &Sinogram,
        seed: ArrayView2<'_, f32>,
        mask: Option<ArrayView2<'_, bool>>,
        algorithm: Algorithm,
        inner_iters: usize,
    ) -> Result<Array2<f32>> {
        if algorithm.is_gpu() {
            return Err(DartError::UnsupportedAlgorithm(format!(
                "{algorithm} requires a GPU engine"
            )));
        }
        if algorithm.is_iterative() && inner_iters == 0 {
            return Err(invalid("inner iteration count must be positive"));
        }
        let shape = self.volume_shape();
        ensure_shape("seed image", seed.dim(), shape)?;
        ensure_shape("sinogram", sinogram.shape(), self.sinogram_shape())?;

        let mask: Option<Vec<bool>> = match mask {
            Some(m) => {
                ensure_shape("reconstruction mask", m.dim(), shape)?;
                Some(m.iter().copied().collect())
            }
            None => None,
        };
        let mask_ref = mask.as_deref();

        let mut x: Vec<f32> = seed.iter().copied().collect();
        let active: Vec<usize> = (0..x.len()).filter(|&j| is_active(mask_ref, j)).collect();
        if active.is_empty() {
            log::debug!("{algorithm}: empty reconstruction mask, returning seed");
            return Array2::from_shape_vec(shape, x)
                .map_err(|e| DartError::ReconstructionFailure(e.to_string()));
        }

        let b: Vec<f32> = sinogram.view().iter().copied().collect();
        let ray_weights = self.projector.ray_weights(mask_ref);

        match algorithm {
            Algorithm::Sart => {
                for &j in &active {
                    x[j] = self.config.clamp(x[j]);
                }
                for _ in 0..inner_iters {
                    self.sart_sweep(&b, &mut x, &active, &ray_weights);
                }
            }
            Algorithm::Sirt => {
                let ones = vec![1.0f32; self.projector.n_rays()];
                let pixel_weights: Vec<f32> = (0..x.len())
                    .map(|j| self.projector.back_pixel(&ones, j))
                    .collect();
                for &j in &active {
                    x[j] = self.config.clamp(x[j]);
                }
                for _ in 0..inner_iters {
                    self.sirt_step(&b, &mut x, &active, mask_ref, &ray_weights, &pixel_weights);
                }
            }
            Algorithm::Fbp => self.fbp(&b, &mut x, &active),
            Algorithm::SartCuda | Algorithm::SirtCuda | Algorithm::FbpCuda => {
                return Err(DartError::UnsupportedAlgorithm(format!(
                    "{algorithm} requires a GPU engine"
                )));
            }
        }

        if let Some(bad) = x.iter().find(|v| !v.is_finite()) {
            return Err(DartError::ReconstructionFailure(format!(
                "{algorithm} produced non-finite value {bad}"
            )));
        }
        Array2::from_shape_vec(shape, x).map_err(|e| DartError::ReconstructionFailure(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::s;

    fn square_phantom() -> Array2<f32> {
        let mut img = Array2::<f32>::zeros((8, 8));
        img.slice_mut(s![2..6, 2..6]).fill(255.0);
        img
    }

    fn engine() -> CpuEngine {
        let g = ParallelBeamGeometry::half_turn(8, 8, 12).unwrap();
        CpuEngine::new(g, EngineConfig::default()).unwrap()
    }

    fn mae(a: &Array2<f32>, b: &Array2<f32>) -> f32 {
        (a - b).mapv(f32::abs).mean().unwrap()
    }

    #[test]
    fn algorithm_names_parse() {
        assert_eq!("SART".parse::<Algorithm>().unwrap(), Algorithm::Sart);
        assert_eq!("sirt".parse::<Algorithm>().unwrap(), Algorithm::Sirt);
        assert_eq!("FBP_CUDA".parse::<Algorithm>().unwrap(), Algorithm::FbpCuda);
        let err = "ART".parse::<Algorithm>().unwrap_err();
        assert_eq!(err, DartError::UnsupportedAlgorithm("ART".into()));
    }

    #[test]
    fn algorithm_serializes_as_its_name() {
        let json = serde_json::to_string(&Algorithm::SartCuda).unwrap();
        assert_eq!(json, "\"SART_CUDA\"");
        assert!(serde_json::from_str::<Algorithm>("\"MART\"").is_err());
    }

    #[test]
    fn gpu_variants_are_rejected_by_cpu_engine() {
        let e = engine();
        let sino = e.create_sinogram_handle(Array2::zeros(e.sinogram_shape())).unwrap();
        let seed = Array2::zeros((8, 8));
        let err = e
            .reconstruct(&sino, seed.view(), None, Algorithm::SartCuda, 5)
            .unwrap_err();
        assert!(matches!(err, DartError::UnsupportedAlgorithm(_)));
    }

    #[test]
    fn sart_recovers_noiseless_square() {
        let e = engine();
        let truth = square_phantom();
        let sino = e
            .create_sinogram_handle(e.forward_project(truth.view()).unwrap())
            .unwrap();
        let rec = e
            .reconstruct(&sino, Array2::zeros((8, 8)).view(), None, Algorithm::Sart, 50)
            .unwrap();
        assert!(mae(&rec, &truth) < 10.0, "mae {}", mae(&rec, &truth));
    }

    #[test]
    fn sirt_reduces_error_from_zero_start() {
        let e = engine();
        let truth = square_phantom();
        let sino = e
            .create_sinogram_handle(e.forward_project(truth.view()).unwrap())
            .unwrap();
        let zero = Array2::zeros((8, 8));
        let rec = e
            .reconstruct(&sino, zero.view(), None, Algorithm::Sirt, 100)
            .unwrap();
        assert!(mae(&rec, &truth) < 0.5 * mae(&zero, &truth));
    }

    #[test]
    fn fbp_output_is_clamped_and_correlated() {
        let e = engine();
        let truth = square_phantom();
        let sino = e
            .create_sinogram_handle(e.forward_project(truth.view()).unwrap())
            .unwrap();
        let rec = e
            .reconstruct(&sino, Array2::zeros((8, 8)).view(), None, Algorithm::Fbp, 1)
            .unwrap();
        assert!(rec.iter().all(|&v| (0.0..=255.0).contains(&v)));
        assert!(rec[[3, 3]] > rec[[0, 0]]);
    }

    #[test]
    fn masked_update_leaves_unmasked_pixels_at_seed() {
        let e = engine();
        let truth = square_phantom();
        let sino = e
            .create_sinogram_handle(e.forward_project(truth.view()).unwrap())
            .unwrap();
        let seed = Array2::from_elem((8, 8), 7.0f32);
        let mut mask = Array2::from_elem((8, 8), false);
        mask.slice_mut(s![0..4, ..]).fill(true);
        let rec = e
            .reconstruct(&sino, seed.view(), Some(mask.view()), Algorithm::Sart, 3)
            .unwrap();
        for ((r, c), &v) in rec.indexed_iter() {
            if r >= 4 {
                assert_eq!(v, 7.0, "pixel ({r}, {c}) changed");
            }
        }
    }

    #[test]
    fn empty_mask_is_a_no_op() {
        let e = engine();
        let sino = e.create_sinogram_handle(Array2::ones(e.sinogram_shape())).unwrap();
        let seed = Array2::from_shape_fn((8, 8), |(r, c)| (r + c) as f32);
        let mask = Array2::from_elem((8, 8), false);
        for alg in [Algorithm::Sart, Algorithm::Sirt, Algorithm::Fbp] {
            let rec = e
                .reconstruct(&sino, seed.view(), Some(mask.view()), alg, 4)
                .unwrap();
            assert_eq!(rec, seed);
        }
    }

    #[test]
    fn zero_inner_iterations_are_rejected() {
        let e = engine();
        let sino = e.create_sinogram_handle(Array2::zeros(e.sinogram_shape())).unwrap();
        let err = e
            .reconstruct(&sino, Array2::zeros((8, 8)).view(), None, Algorithm::Sirt, 0)
            .unwrap_err();
        assert!(matches!(err, DartError::InvalidConfiguration(_)));
    }

    #[test]
    fn engine_config_validation() {
        let bad = EngineConfig {
            relaxation: 0.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let empty = EngineConfig {
            min_constraint: 5.0,
            max_constraint: 5.0,
            ..Default::default()
        };
        assert!(empty.validate().is_err());
    }
}
