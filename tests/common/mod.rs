#![allow(dead_code)]

use dart_recon::{CpuEngine, EngineConfig, ParallelBeamGeometry, ReconstructionEngine, Sinogram};
use ndarray::{s, Array2};

/// `n × n` background of `lo` with a centered `n/2 × n/2` square of `hi`.
pub fn centered_square(n: usize, lo: f32, hi: f32) -> Array2<f32> {
    let mut img = Array2::from_elem((n, n), lo);
    let q = n / 4;
    img.slice_mut(s![q..n - q, q..n - q]).fill(hi);
    img
}

/// CPU engine over a half-turn geometry and the noiseless sinogram of `phantom`.
pub fn noiseless_scan(phantom: &Array2<f32>, n_angles: usize) -> (CpuEngine, Sinogram) {
    let (rows, cols) = phantom.dim();
    let geometry = ParallelBeamGeometry::half_turn(rows, cols, n_angles).expect("valid geometry");
    let engine = CpuEngine::new(geometry, EngineConfig::default()).expect("valid engine");
    let data = engine
        .forward_project(phantom.view())
        .expect("phantom matches geometry");
    let sinogram = engine.create_sinogram_handle(data).expect("sinogram shape");
    (engine, sinogram)
}
