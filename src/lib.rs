//! Discrete Algebraic Reconstruction Technique (DART) for sparse-angle 2D
//! tomography of objects made of a few known gray levels.
//!
//! ```no_run
//! use dart_recon::prelude::*;
//!
//! # fn main() -> Result<(), DartError> {
//! let geometry = ParallelBeamGeometry::half_turn(64, 64, 30)?;
//! let engine = CpuEngine::new(geometry, EngineConfig::default())?;
//! # let measured = ndarray::Array2::zeros(engine.sinogram_shape());
//! let sinogram = engine.create_sinogram_handle(measured)?;
//!
//! let mut params = DartParams::new(GrayLevels::new(vec![0.0, 128.0, 255.0])?);
//! params.inner_iters = 20;
//! let image = DartLoop::new(&engine, &sinogram)?.run(&params)?;
//! # let _ = image;
//! # Ok(())
//! # }
//! ```

pub mod boundary;
pub mod config;
pub mod dart;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod mask;
pub mod metrics;
pub mod residual;
pub mod sampling;
pub mod segmentation;
pub mod smoothing;

pub use crate::config::DartParams;
pub use crate::dart::{DartLoop, DartState, IterationReport};
pub use crate::engine::{Algorithm, CpuEngine, EngineConfig, ReconstructionEngine};
pub use crate::error::{DartError, Result};
pub use crate::geometry::{ParallelBeamGeometry, Sinogram, SystemMatrix};
pub use crate::segmentation::GrayLevels;

pub mod prelude {
    pub use crate::{
        Algorithm, CpuEngine, DartError, DartLoop, DartParams, EngineConfig, GrayLevels,
        ParallelBeamGeometry, ReconstructionEngine, Sinogram,
    };
}
