mod common;

use common::{centered_square, noiseless_scan};
use dart_recon::metrics::{mean_absolute_error, mismatched_pixels};
use dart_recon::segmentation::segment;
use dart_recon::{
    Algorithm, DartError, DartLoop, DartParams, DartState, GrayLevels, ReconstructionEngine,
};

fn square_params() -> DartParams {
    DartParams {
        iterations: 5,
        fix_prob: 0.9,
        gray_levels: GrayLevels::new(vec![0.0, 255.0]).unwrap(),
        algorithm: Algorithm::Sart,
        inner_iters: 50,
        rng_seed: 42,
        smoothing_sigma: 1.0,
    }
}

#[test]
fn recovers_two_level_square() {
    let _ = env_logger::builder().is_test(true).try_init();
    let phantom = centered_square(8, 0.0, 255.0);
    let (engine, sinogram) = noiseless_scan(&phantom, 12);

    let mut dart = DartLoop::new(&engine, &sinogram).unwrap();
    assert_eq!(dart.state(), DartState::Uninitialized);
    let rec = dart.run(&square_params()).unwrap();
    assert_eq!(dart.state(), DartState::Done);

    let mae = mean_absolute_error(phantom.view(), rec.view()).unwrap();
    assert!(mae < 1.0, "mean absolute error {mae}");
    assert_eq!(mismatched_pixels(phantom.view(), rec.view(), 0.5).unwrap(), 0);
}

#[test]
fn output_is_segmented_and_clamped() {
    let phantom = centered_square(8, 0.0, 255.0);
    let (engine, sinogram) = noiseless_scan(&phantom, 12);
    let params = DartParams {
        gray_levels: GrayLevels::new(vec![0.0, 100.0, 255.0]).unwrap(),
        iterations: 2,
        inner_iters: 10,
        ..square_params()
    };
    let rec = DartLoop::new(&engine, &sinogram).unwrap().run(&params).unwrap();
    assert!(rec.iter().all(|v| [0.0, 100.0, 255.0].contains(v)));
}

#[test]
fn error_does_not_degrade_after_second_iteration() {
    let phantom = centered_square(8, 0.0, 255.0);
    let (engine, sinogram) = noiseless_scan(&phantom, 12);
    let params = square_params();

    let mut errors = Vec::new();
    DartLoop::new(&engine, &sinogram)
        .unwrap()
        .run_with_observer(&params, |report| {
            let seg = segment(report.merged, report.gray_levels).unwrap();
            errors.push(mean_absolute_error(phantom.view(), seg.view()).unwrap());
            None
        })
        .unwrap();

    assert_eq!(errors.len(), params.iterations);
    for k in 1..errors.len() - 1 {
        assert!(
            errors[k + 1] <= errors[k] + 1.0,
            "error rose from {} to {} at iteration {}",
            errors[k],
            errors[k + 1],
            k + 2
        );
    }
}

#[test]
fn same_seed_reproduces_the_run() {
    let phantom = centered_square(8, 0.0, 255.0);
    let (engine, sinogram) = noiseless_scan(&phantom, 8);
    let params = DartParams {
        inner_iters: 5,
        fix_prob: 0.5,
        ..square_params()
    };

    let mut dart = DartLoop::new(&engine, &sinogram).unwrap();
    let mut free_a = Vec::new();
    let a = dart
        .run_with_observer(&params, |r| {
            free_a.push(r.free_pixels);
            None
        })
        .unwrap();
    let mut free_b = Vec::new();
    let b = dart
        .run_with_observer(&params, |r| {
            free_b.push(r.free_pixels);
            None
        })
        .unwrap();
    assert_eq!(a, b);
    assert_eq!(free_a, free_b);
}

#[test]
fn reports_partition_the_grid_every_iteration() {
    let phantom = centered_square(8, 0.0, 255.0);
    let (engine, sinogram) = noiseless_scan(&phantom, 12);
    let params = square_params();
    let mut seen = 0;
    DartLoop::new(&engine, &sinogram)
        .unwrap()
        .run_with_observer(&params, |r| {
            seen += 1;
            assert_eq!(r.iteration, seen);
            assert!(r.boundary_pixels <= r.free_pixels);
            assert_eq!(r.free_pixels + r.fixed_pixels, 64);
            assert!(r.merged.iter().all(|v| (0.0..=255.0).contains(v)));
            None
        })
        .unwrap();
    assert_eq!(seen, 5);
}

#[test]
fn uniform_object_with_everything_fixed_runs_empty_masks() {
    let phantom = centered_square(8, 0.0, 0.0);
    let (engine, sinogram) = noiseless_scan(&phantom, 8);
    let params = DartParams {
        fix_prob: 1.0,
        ..square_params()
    };
    let rec = DartLoop::new(&engine, &sinogram)
        .unwrap()
        .run_with_observer(&params, |r| {
            assert_eq!(r.free_pixels, 0);
            assert_eq!(r.residual_norm, 0.0);
            None
        })
        .unwrap();
    assert!(rec.iter().all(|&v| v == 0.0));
}

#[test]
fn observer_can_refine_gray_levels() {
    let phantom = centered_square(8, 0.0, 255.0);
    let (engine, sinogram) = noiseless_scan(&phantom, 12);
    let params = DartParams {
        gray_levels: GrayLevels::new(vec![0.0, 200.0]).unwrap(),
        ..square_params()
    };
    let rec = DartLoop::new(&engine, &sinogram)
        .unwrap()
        .run_with_observer(&params, |r| {
            (r.iteration == 1).then(|| GrayLevels::new(vec![0.0, 255.0]).unwrap())
        })
        .unwrap();
    assert!(rec.iter().all(|&v| v == 0.0 || v == 255.0));
    assert!(rec.iter().any(|&v| v == 255.0));
}

#[test]
fn invalid_parameters_fail_before_any_work() {
    let phantom = centered_square(8, 0.0, 255.0);
    let (engine, sinogram) = noiseless_scan(&phantom, 8);
    let mut dart = DartLoop::new(&engine, &sinogram).unwrap();

    for params in [
        DartParams { iterations: 0, ..square_params() },
        DartParams { fix_prob: -0.5, ..square_params() },
        DartParams { inner_iters: 0, ..square_params() },
    ] {
        let err = dart.run(&params).unwrap_err();
        assert!(matches!(err, DartError::InvalidConfiguration(_)), "{err}");
        assert_eq!(dart.state(), DartState::Uninitialized);
    }
}

#[test]
fn gpu_algorithm_on_cpu_engine_is_unsupported() {
    let phantom = centered_square(8, 0.0, 255.0);
    let (engine, sinogram) = noiseless_scan(&phantom, 8);
    let params = DartParams {
        algorithm: "SIRT_CUDA".parse().unwrap(),
        ..square_params()
    };
    let err = DartLoop::new(&engine, &sinogram).unwrap().run(&params).unwrap_err();
    assert!(matches!(err, DartError::UnsupportedAlgorithm(_)));
}

#[test]
fn sinogram_from_another_geometry_is_rejected() {
    let phantom = centered_square(8, 0.0, 255.0);
    let (engine, _) = noiseless_scan(&phantom, 8);
    let (_, other) = noiseless_scan(&phantom, 10);
    assert!(engine.sinogram_shape() != other.shape());
    let err = DartLoop::new(&engine, &other).err().unwrap();
    assert!(matches!(err, DartError::InvalidConfiguration(_)));
}
