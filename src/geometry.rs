//! Parallel-beam geometry, its pixel-driven system matrix and sinogram handles.
//!
//! Sinograms are laid out with one row per detector bin and one column per
//! projection angle; ray `(d, a)` has flat index `d * n_angles + a`.
use std::f32::consts::PI;

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{ensure_shape, invalid, Result};

fn default_spacing() -> f32 {
    1.0
}

/// 2D parallel-beam acquisition over a `rows × cols` grid of unit pixels
/// centered on the rotation axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelBeamGeometry {
    pub rows: usize,
    pub cols: usize,
    pub n_detectors: usize,
    #[serde(default = "default_spacing")]
    pub detector_spacing: f32,
    /// Projection angles in radians.
    pub angles: Vec<f32>,
}

impl ParallelBeamGeometry {
    pub fn new(
        rows: usize,
        cols: usize,
        n_detectors: usize,
        detector_spacing: f32,
        angles: Vec<f32>,
    ) -> Result<Self> {
        let g = Self {
            rows,
            cols,
            n_detectors,
            detector_spacing,
            angles,
        };
        g.validate()?;
        Ok(g)
    }

    /// `n_angles` equally spaced angles over `[0, range)` radians.
    pub fn uniform(
        rows: usize,
        cols: usize,
        n_detectors: usize,
        detector_spacing: f32,
        n_angles: usize,
        range: f32,
    ) -> Result<Self> {
        let step = range / n_angles.max(1) as f32;
        let angles = (0..n_angles).map(|i| i as f32 * step).collect();
        Self::new(rows, cols, n_detectors, detector_spacing, angles)
    }

    /// Uniform half-turn acquisition with enough bins to cover the grid diagonal.
    pub fn half_turn(rows: usize, cols: usize, n_angles: usize) -> Result<Self> {
        let diag = ((rows * rows + cols * cols) as f32).sqrt();
        let n_detectors = diag.ceil() as usize + 2;
        Self::uniform(rows, cols, n_detectors, 1.0, n_angles, PI)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rows == 0 || self.cols == 0 {
            return Err(invalid(format!(
                "volume shape ({}, {}) has no pixels",
                self.rows, self.cols
            )));
        }
        if self.n_detectors == 0 {
            return Err(invalid("geometry has no detector bins"));
        }
        if self.angles.is_empty() {
            return Err(invalid("geometry has no projection angles"));
        }
        if !(self.detector_spacing.is_finite() && self.detector_spacing > 0.0) {
            return Err(invalid(format!(
                "detector spacing {} must be positive",
                self.detector_spacing
            )));
        }
        if self.angles.iter().any(|a| !a.is_finite()) {
            return Err(invalid("projection angles must be finite"));
        }
        Ok(())
    }

    pub fn volume_shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn sinogram_shape(&self) -> (usize, usize) {
        (self.n_detectors, self.angles.len())
    }

    pub fn n_angles(&self) -> usize {
        self.angles.len()
    }
}

/// Measured (or residual) projection data checked against a sinogram shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Sinogram {
    data: Array2<f32>,
}

impl Sinogram {
    pub fn new(geometry: &ParallelBeamGeometry, data: Array2<f32>) -> Result<Self> {
        Self::with_shape(geometry.sinogram_shape(), data)
    }

    pub fn with_shape(shape: (usize, usize), data: Array2<f32>) -> Result<Self> {
        ensure_shape("sinogram", data.dim(), shape)?;
        if data.iter().any(|v| !v.is_finite()) {
            return Err(invalid("sinogram contains non-finite values"));
        }
        Ok(Self { data })
    }

    pub fn view(&self) -> ArrayView2<'_, f32> {
        self.data.view()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }
}

/// Contribution of one pixel to one projection: at most two detector bins.
#[derive(Debug, Clone, Copy, Default)]
struct Footprint {
    bins: [u32; 2],
    weights: [f32; 2],
}

/// Linear-interpolation, pixel-driven projector.
///
/// Pixel `(r, c)` sits at `x = c - (cols-1)/2`, `y = (rows-1)/2 - r`. Its
/// detector coordinate under angle `θ` is `s = x cosθ + y sinθ`, and its mass
/// `1 / detector_spacing` is split linearly between the two nearest bins.
/// Entries are stored per `(pixel, angle)`, which is the sparse form of the
/// dense `(M, N)` matrix returned by [`SystemMatrix::to_dense`].
#[derive(Debug, Clone)]
pub struct SystemMatrix {
    geometry: ParallelBeamGeometry,
    footprints: Vec<Footprint>,
}

impl SystemMatrix {
    pub fn new(geometry: ParallelBeamGeometry) -> Result<Self> {
        geometry.validate()?;
        let (rows, cols) = geometry.volume_shape();
        let n_det = geometry.n_detectors;
        let tau = geometry.detector_spacing;
        let mass = 1.0 / tau;
        let trig: Vec<(f32, f32)> = geometry.angles.iter().map(|a| (a.cos(), a.sin())).collect();
        let det_center = (n_det as f32 - 1.0) * 0.5;

        let mut footprints = Vec::with_capacity(rows * cols * trig.len());
        for r in 0..rows {
            let y = (rows as f32 - 1.0) * 0.5 - r as f32;
            for c in 0..cols {
                let x = c as f32 - (cols as f32 - 1.0) * 0.5;
                for &(cos, sin) in &trig {
                    let u = (x * cos + y * sin) / tau + det_center;
                    let lo = u.floor();
                    let frac = u - lo;
                    let mut fp = Footprint::default();
                    for (k, (bin, w)) in [(lo, 1.0 - frac), (lo + 1.0, frac)].into_iter().enumerate() {
                        if bin >= 0.0 && (bin as usize) < n_det && w > 0.0 {
                            fp.bins[k] = bin as u32;
                            fp.weights[k] = w * mass;
                        }
                    }
                    footprints.push(fp);
                }
            }
        }
        Ok(Self {
            geometry,
            footprints,
        })
    }

    pub fn geometry(&self) -> &ParallelBeamGeometry {
        &self.geometry
    }

    pub fn n_pixels(&self) -> usize {
        self.geometry.rows * self.geometry.cols
    }

    pub fn n_rays(&self) -> usize {
        self.geometry.n_detectors * self.geometry.n_angles()
    }

    #[inline]
    fn footprint(&self, pixel: usize, angle: usize) -> &Footprint {
        &self.footprints[pixel * self.geometry.n_angles() + angle]
    }

    /// Rays of one projection angle, as `(flat ray index, weight)` pairs for
    /// `pixel`.
    #[inline]
    fn taps(&self, pixel: usize, angle: usize) -> impl Iterator<Item = (usize, f32)> + '_ {
        let n_angles = self.geometry.n_angles();
        let fp = self.footprint(pixel, angle);
        (0..2)
            .filter(move |&k| fp.weights[k] > 0.0)
            .map(move |k| (fp.bins[k] as usize * n_angles + angle, fp.weights[k]))
    }

    /// `y = A x` over the pixels selected by `active` (all when `None`).
    pub fn forward_flat(&self, x: &[f32], active: Option<&[bool]>) -> Vec<f32> {
        let mut y = vec![0.0f32; self.n_rays()];
        for (j, &xj) in x.iter().enumerate() {
            if xj == 0.0 || !is_active(active, j) {
                continue;
            }
            for a in 0..self.geometry.n_angles() {
                for (i, w) in self.taps(j, a) {
                    y[i] += w * xj;
                }
            }
        }
        y
    }

    /// `A x` restricted to a single angle; returns one value per detector bin.
    pub(crate) fn forward_angle(&self, x: &[f32], active: &[usize], angle: usize) -> Vec<f32> {
        let n_angles = self.geometry.n_angles();
        let mut y = vec![0.0f32; self.geometry.n_detectors];
        for &j in active {
            for (i, w) in self.taps(j, angle) {
                y[i / n_angles] += w * x[j];
            }
        }
        y
    }

    /// `Σ_i A_ij r_i` over one angle's rays for pixel `j`; `r` is indexed by bin.
    #[inline]
    pub(crate) fn back_angle_pixel(&self, r: &[f32], pixel: usize, angle: usize) -> f32 {
        let n_angles = self.geometry.n_angles();
        self.taps(pixel, angle).map(|(i, w)| w * r[i / n_angles]).sum()
    }

    /// `Σ_i A_ij r_i` over all rays for pixel `j`; `r` is indexed by flat ray.
    #[inline]
    pub(crate) fn back_pixel(&self, r: &[f32], pixel: usize) -> f32 {
        (0..self.geometry.n_angles())
            .flat_map(|a| self.taps(pixel, a))
            .map(|(i, w)| w * r[i])
            .sum()
    }

    /// Column sum of pixel `j` restricted to one angle.
    #[inline]
    pub(crate) fn angle_weight(&self, pixel: usize, angle: usize) -> f32 {
        let fp = self.footprint(pixel, angle);
        fp.weights[0] + fp.weights[1]
    }

    /// Forward projection of an image laid out as `(rows, cols)`.
    pub fn forward(&self, image: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        ensure_shape("image", image.dim(), self.geometry.volume_shape())?;
        let x: Vec<f32> = image.iter().copied().collect();
        let y = self.forward_flat(&x, None);
        Array2::from_shape_vec(self.geometry.sinogram_shape(), y)
            .map_err(|e| invalid(format!("forward projection layout: {e}")))
    }

    /// Dense `(M, N)` matrix, ray index `d * n_angles + a`, pixel index
    /// `r * cols + c`.
    pub fn to_dense(&self) -> Array2<f32> {
        let mut a = Array2::<f32>::zeros((self.n_rays(), self.n_pixels()));
        for j in 0..self.n_pixels() {
            for angle in 0..self.geometry.n_angles() {
                for (i, w) in self.taps(j, angle) {
                    a[[i, j]] += w;
                }
            }
        }
        a
    }

    /// Row sums `Σ_j A_ij` over the active pixels.
    pub fn ray_weights(&self, active: Option<&[bool]>) -> Vec<f32> {
        let ones = vec![1.0f32; self.n_pixels()];
        self.forward_flat(&ones, active)
    }
}

#[inline]
pub(crate) fn is_active(active: Option<&[bool]>, j: usize) -> bool {
    active.map_or(true, |m| m[j])
}
