use std::fs::File;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use ndarray::Array2;
use ndarray_npy::{read_npy, write_npy, NpzReader};

use dart_recon::metrics::mean_absolute_error;
use dart_recon::{
    Algorithm, CpuEngine, DartLoop, DartParams, EngineConfig, GrayLevels, ParallelBeamGeometry,
    ReconstructionEngine,
};

/// DART reconstruction from a parallel-beam sinogram.
///
/// Expected NPZ file structure:
///   - key "sinogram": 2D array (n_detectors, n_angles) of f32
///
/// Geometry JSON: {"rows", "cols", "n_detectors", "detector_spacing", "angles"}
/// with angles in radians.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to NPZ file containing the sinogram
    #[arg(long)]
    projections: PathBuf,

    /// Path to geometry JSON
    #[arg(long)]
    geometry: PathBuf,

    /// Optional JSON file with DART parameters; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Comma-separated a priori gray levels, e.g. 0,128,255
    #[arg(long, value_delimiter = ',')]
    gray_levels: Option<Vec<f32>>,

    /// Number of DART iterations
    #[arg(long)]
    iterations: Option<usize>,

    /// Probability that a non-boundary pixel stays fixed
    #[arg(long)]
    fix_prob: Option<f64>,

    /// Reconstruction algorithm: SART, SIRT or FBP
    #[arg(long)]
    algorithm: Option<String>,

    /// Engine iterations per DART iteration
    #[arg(long)]
    inner_iters: Option<usize>,

    /// Seed for free-pixel sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Gaussian smoothing sigma between iterations (0 disables)
    #[arg(long)]
    sigma: Option<f32>,

    /// Relaxation parameter of the algebraic engine
    #[arg(long, default_value_t = 1.0)]
    relaxation: f32,

    /// Ground-truth image (.npy) to report mean absolute error against
    #[arg(long)]
    phantom: Option<PathBuf>,

    /// Output path for reconstructed image (.npy)
    #[arg(long)]
    output: PathBuf,
}

fn load_params(args: &Args) -> Result<DartParams> {
    let mut params = match &args.config {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open config JSON {:?}", path))?;
            serde_json::from_reader(file)
                .with_context(|| format!("Failed to parse config JSON {:?}", path))?
        }
        None => {
            let levels = args
                .gray_levels
                .clone()
                .ok_or_else(|| anyhow!("--gray-levels is required without --config"))?;
            DartParams::new(GrayLevels::new(levels)?)
        }
    };

    if let (Some(levels), Some(_)) = (&args.gray_levels, &args.config) {
        params.gray_levels = GrayLevels::new(levels.clone())?;
    }
    if let Some(v) = args.iterations {
        params.iterations = v;
    }
    if let Some(v) = args.fix_prob {
        params.fix_prob = v;
    }
    if let Some(name) = &args.algorithm {
        params.algorithm = name.parse::<Algorithm>()?;
    }
    if let Some(v) = args.inner_iters {
        params.inner_iters = v;
    }
    if let Some(v) = args.seed {
        params.rng_seed = v;
    }
    if let Some(v) = args.sigma {
        params.smoothing_sigma = v;
    }
    params.validate()?;
    Ok(params)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    // --- Load sinogram from NPZ ---
    let file = File::open(&args.projections)
        .with_context(|| format!("Failed to open NPZ {:?}", args.projections))?;
    let mut npz = NpzReader::new(file)
        .map_err(|e| anyhow!("Failed to read NPZ {:?}: {}", args.projections, e))?;
    let sinogram: Array2<f32> = npz
        .by_name("sinogram")
        .map_err(|e| anyhow!("Missing or invalid 'sinogram' array in NPZ: {}", e))?;

    // --- Geometry ---
    let geom_file = File::open(&args.geometry)
        .with_context(|| format!("Failed to open geometry JSON {:?}", args.geometry))?;
    let geometry: ParallelBeamGeometry = serde_json::from_reader(geom_file)
        .with_context(|| format!("Failed to parse geometry JSON {:?}", args.geometry))?;

    let params = load_params(&args)?;
    let engine = CpuEngine::new(
        geometry,
        EngineConfig {
            relaxation: args.relaxation,
            ..Default::default()
        },
    )?;
    let sinogram = engine.create_sinogram_handle(sinogram)?;

    println!(
        "Running DART with shape = {:?}, sinogram = {:?}: {}",
        engine.volume_shape(),
        engine.sinogram_shape(),
        params
    );

    // --- Run DART ---
    let image = DartLoop::new(&engine, &sinogram)?.run(&params)?;

    if let Some(path) = &args.phantom {
        let phantom: Array2<f32> = read_npy(path)
            .map_err(|e| anyhow!("Failed to read phantom NPY {:?}: {}", path, e))?;
        let mae = mean_absolute_error(phantom.view(), image.view())?;
        println!("Mean absolute error vs phantom: {:.4}", mae);
    }

    // --- Save image as .npy ---
    write_npy(&args.output, &image)
        .map_err(|e| anyhow!("Failed to write output NPY {:?}: {}", args.output, e))?;

    println!("Reconstruction written to {:?}", args.output);

    Ok(())
}
