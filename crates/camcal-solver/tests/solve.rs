use approx::assert_relative_eq;
use camcal_chessboard::synthetic::{calibration_poses, project_corners, render_chessboard};
use camcal_chessboard::{accumulate, ChessboardDetector, ChessboardDetectorParams, ChessboardSpec};
use camcal_core::{
    CalibrationParameters, Correspondence, CorrespondenceSet, DistortionCoefficients, GrayImage,
    ImageSize,
};
use camcal_solver::{CalibrationError, CalibrationSolver, SolveFailure, SolverParams};
use nalgebra::{Matrix3, Point2, Point3};

const SIZE: ImageSize = ImageSize {
    width: 640,
    height: 480,
};

fn camera(dist: DistortionCoefficients) -> CalibrationParameters {
    CalibrationParameters::new(
        Matrix3::new(600.0, 0.0, 322.0, 0.0, 605.0, 236.0, 0.0, 0.0, 1.0),
        dist,
        SIZE,
    )
    .expect("valid camera")
}

fn spec() -> ChessboardSpec {
    ChessboardSpec::new(9, 6).expect("9x6 board")
}

/// Exact projections of the standard pose spread, with a small
/// deterministic jitter when `noise > 0`.
fn projected_set(cam: &CalibrationParameters, noise: f64) -> CorrespondenceSet {
    let spec = spec();
    let mut set = CorrespondenceSet::new();
    set.image_size = Some(SIZE);
    for (i, pose) in calibration_poses(&spec, 15.0).iter().enumerate() {
        let mut pts = project_corners(&spec, cam, pose).expect("visible");
        for (k, p) in pts.iter_mut().enumerate() {
            let phase = (i * 97 + k * 31) as f64;
            p.x += noise * phase.sin();
            p.y += noise * (1.7 * phase).cos();
        }
        set.push(Correspondence::new(spec.object_points(), pts, i).expect("lengths"));
    }
    set
}

#[test]
fn recovers_intrinsics_and_distortion_from_exact_projections() {
    let truth = camera(DistortionCoefficients::five(-0.12, 0.03, 0.001, -0.0008, 0.0));
    let set = projected_set(&truth, 0.0);

    let report = CalibrationSolver::default()
        .solve(&set, SIZE)
        .expect("calibration");

    let k = &report.parameters.intrinsic_matrix;
    let k_true = &truth.intrinsic_matrix;
    for (r, c) in [(0, 0), (1, 1), (0, 2), (1, 2)] {
        assert_relative_eq!(k[(r, c)], k_true[(r, c)], epsilon = 1e-3);
    }
    let d = report.parameters.distortion.as_slice();
    assert_eq!(d.len(), 5);
    for (got, want) in d.iter().zip(truth.distortion.as_slice()) {
        assert!((got - want).abs() < 1e-4, "distortion {d:?}");
    }
    assert!(report.rms_error < 1e-6, "rms {}", report.rms_error);
    assert_eq!(report.per_view_errors.len(), 12);
    assert_eq!(report.extrinsics.len(), 12);
    assert_eq!(report.parameters.image_size, SIZE);
}

#[test]
fn reports_extrinsics_in_input_order() {
    let truth = camera(DistortionCoefficients::five(-0.05, 0.0, 0.0, 0.0, 0.0));
    let set = projected_set(&truth, 0.0);
    let poses = calibration_poses(&spec(), 15.0);

    let report = CalibrationSolver::default()
        .solve(&set, SIZE)
        .expect("calibration");

    for (k, (got, want)) in report.extrinsics.iter().zip(&poses).enumerate() {
        assert_eq!(got.source_index, k);
        let t = want.translation.vector;
        assert!((got.tvec - t).norm() < 1e-4, "view {k}: {:?} vs {:?}", got.tvec, t);
        let angle = got.isometry().rotation.angle_to(&want.rotation);
        assert!(angle < 1e-5, "view {k}: rotation off by {angle}");
    }
}

#[test]
fn noisy_points_give_rms_near_noise_level() {
    let truth = camera(DistortionCoefficients::five(-0.1, 0.02, 0.0, 0.0, 0.0));
    let set = projected_set(&truth, 0.1);

    let report = CalibrationSolver::default()
        .solve(&set, SIZE)
        .expect("calibration");

    assert!(report.rms_error > 0.02 && report.rms_error < 0.15, "rms {}", report.rms_error);
    assert!(report.mean_error <= report.rms_error + 1e-12);
    assert_relative_eq!(report.parameters.fx(), 600.0, max_relative = 0.01);
    assert_relative_eq!(report.parameters.fy(), 605.0, max_relative = 0.01);
}

#[test]
fn fixed_parameters_stay_at_their_initial_values() {
    let truth = camera(DistortionCoefficients::five(-0.1, 0.02, 0.0, 0.0, 0.0));
    let set = projected_set(&truth, 0.0);
    let solver = CalibrationSolver::new(SolverParams {
        fix_k3: true,
        zero_tangent_dist: true,
        fix_principal_point: true,
        ..Default::default()
    });

    let report = solver.solve(&set, SIZE).expect("calibration");
    let p = &report.parameters;
    let d = p.distortion.as_slice();
    assert_eq!((d[2], d[3], d[4]), (0.0, 0.0, 0.0));
    assert_relative_eq!(p.cx(), 319.5);
    assert_relative_eq!(p.cy(), 239.5);
    // The principal point is off by a few pixels, so the fit is not exact.
    assert!(report.rms_error > 1e-4);
    assert!(report.rms_error < 2.0, "rms {}", report.rms_error);
}

#[test]
fn empty_or_tiny_views_are_insufficient() {
    let solver = CalibrationSolver::default();
    let err = solver
        .solve(&CorrespondenceSet::new(), SIZE)
        .expect_err("no views");
    assert!(matches!(err, CalibrationError::InsufficientData { views: 0 }));

    let mut set = CorrespondenceSet::new();
    let obj = vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)];
    let img = vec![Point2::new(10.0, 10.0), Point2::new(20.0, 10.0), Point2::new(10.0, 20.0)];
    set.push(Correspondence::new(obj, img, 0).expect("lengths"));
    assert!(matches!(
        solver.solve(&set, SIZE),
        Err(CalibrationError::InsufficientData { views: 1 })
    ));
}

#[test]
fn non_planar_object_points_are_degenerate() {
    let truth = camera(DistortionCoefficients::five(0.0, 0.0, 0.0, 0.0, 0.0));
    let mut set = projected_set(&truth, 0.0);
    let mut obj = set.correspondences[0].object_points().to_vec();
    obj[3].z = 0.5;
    let img = set.correspondences[0].image_points().to_vec();
    set.correspondences[0] = Correspondence::new(obj, img, 0).expect("lengths");

    let err = CalibrationSolver::default()
        .solve(&set, SIZE)
        .expect_err("non-planar");
    assert!(matches!(
        err,
        CalibrationError::SolveFailed(SolveFailure::Degenerate(_))
    ));
}

#[test]
fn iteration_cap_is_a_failure() {
    let truth = camera(DistortionCoefficients::five(-0.2, 0.05, 0.0, 0.0, 0.0));
    let set = projected_set(&truth, 0.0);
    let solver = CalibrationSolver::new(SolverParams {
        max_iterations: 1,
        ..Default::default()
    });

    let err = solver.solve(&set, SIZE).expect_err("one iteration is not enough");
    assert!(matches!(
        err,
        CalibrationError::SolveFailed(SolveFailure::IterationLimit { iterations: 1 })
    ));
}

#[test]
fn report_serializes_to_json() {
    let truth = camera(DistortionCoefficients::five(-0.05, 0.0, 0.0, 0.0, 0.0));
    let report = CalibrationSolver::default()
        .solve(&projected_set(&truth, 0.0), SIZE)
        .expect("calibration");

    let json = serde_json::to_value(&report).expect("serialize");
    assert!(json["rms_error"].is_number());
    assert_eq!(json["extrinsics"].as_array().map(Vec::len), Some(12));
    assert_eq!(json["parameters"]["distortion"].as_array().map(Vec::len), Some(5));
}

#[test]
fn calibrates_from_rendered_images() {
    let truth = camera(DistortionCoefficients::five(-0.1, 0.02, 0.0, 0.0, 0.0));
    let spec = spec();
    let images: Vec<GrayImage> = calibration_poses(&spec, 15.0)
        .iter()
        .map(|pose| render_chessboard(&spec, &truth, pose, 4))
        .collect();
    let detector = ChessboardDetector::new(spec, ChessboardDetectorParams::default());
    let set = accumulate(images.iter().map(GrayImage::view), &detector);
    assert!(set.len() >= 10, "only {} views detected", set.len());

    let report = CalibrationSolver::default()
        .solve(&set, SIZE)
        .expect("calibration");

    let p = &report.parameters;
    assert_relative_eq!(p.fx(), 600.0, max_relative = 0.05);
    assert_relative_eq!(p.fy(), 605.0, max_relative = 0.05);
    assert!((p.cx() - 322.0).abs() < 10.0, "cx {}", p.cx());
    assert!((p.cy() - 236.0).abs() < 10.0, "cy {}", p.cy());
    assert!(report.rms_error < 0.3, "rms {}", report.rms_error);
}

#[test]
fn single_fronto_parallel_view_is_degenerate() {
    let truth = camera(DistortionCoefficients::five(0.0, 0.0, 0.0, 0.0, 0.0));
    let mut set = projected_set(&truth, 0.0);
    set.correspondences.truncate(1);

    let err = CalibrationSolver::default()
        .solve(&set, SIZE)
        .expect_err("focal length and depth are not separable");
    assert!(
        matches!(
            err,
            CalibrationError::SolveFailed(SolveFailure::Degenerate(_) | SolveFailure::Singular)
        ),
        "{err:?}"
    );
}

#[test]
fn single_tilted_view_does_not_pin_down_the_intrinsics() {
    let truth = camera(DistortionCoefficients::five(0.0, 0.0, 0.0, 0.0, 0.0));
    let mut set = projected_set(&truth, 0.0);
    set.correspondences.swap(0, 1);
    set.correspondences.truncate(1);

    let err = CalibrationSolver::default()
        .solve(&set, SIZE)
        .expect_err("one view leaves the principal point free");
    assert!(matches!(err, CalibrationError::SolveFailed(_)), "{err:?}");
}

#[test]
fn zero_distortion_camera_recovers_zero_coefficients() {
    let truth = camera(DistortionCoefficients::five(0.0, 0.0, 0.0, 0.0, 0.0));
    let report = CalibrationSolver::default()
        .solve(&projected_set(&truth, 0.0), SIZE)
        .expect("calibration");

    let d = report.parameters.distortion.as_slice();
    assert!(d.iter().all(|c| c.abs() < 1e-6), "distortion {d:?}");
    assert_relative_eq!(report.parameters.fx(), 600.0, max_relative = 1e-6);
    assert_relative_eq!(report.parameters.fy(), 605.0, max_relative = 1e-6);
}

#[test]
fn zero_distortion_camera_from_rendered_images() {
    let truth = camera(DistortionCoefficients::five(0.0, 0.0, 0.0, 0.0, 0.0));
    let spec = spec();
    let images: Vec<GrayImage> = calibration_poses(&spec, 15.0)
        .iter()
        .map(|pose| render_chessboard(&spec, &truth, pose, 4))
        .collect();
    let detector = ChessboardDetector::new(spec, ChessboardDetectorParams::default());
    let set = accumulate(images.iter().map(GrayImage::view), &detector);
    assert!(set.len() >= 10, "only {} views detected", set.len());

    let report = CalibrationSolver::default()
        .solve(&set, SIZE)
        .expect("calibration");

    let p = &report.parameters;
    assert_relative_eq!(p.fx(), 600.0, max_relative = 0.05);
    assert_relative_eq!(p.fy(), 605.0, max_relative = 0.05);
    let d = p.distortion.as_slice();
    assert!(d[0].abs() < 0.05, "k1 {}", d[0]);
    assert!(d[2].abs() < 0.01 && d[3].abs() < 0.01, "tangential {d:?}");

    // Radial displacement at the image corner stays below a pixel.
    let (x, y) = (320.0 / p.fx(), 240.0 / p.fy());
    let r2 = x * x + y * y;
    let radial = d[0] * r2 + d[1] * r2 * r2 + d[4] * r2 * r2 * r2;
    let shift = p.fx() * r2.sqrt() * radial.abs();
    assert!(shift < 1.0, "corner shift {shift} px from {d:?}");
}
