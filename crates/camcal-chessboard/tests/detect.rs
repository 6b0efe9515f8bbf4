use camcal_chessboard::synthetic::{board_pose, calibration_poses, project_corners, render_chessboard};
use camcal_chessboard::{
    accumulate, ChessboardDetector, ChessboardDetectorParams, ChessboardSpec, DetectionOutcome,
};
use camcal_core::{CalibrationParameters, DistortionCoefficients, GrayImage, ImageSize};
use nalgebra::{Matrix3, Point2, Vector3};

fn camera(dist: DistortionCoefficients) -> CalibrationParameters {
    CalibrationParameters::new(
        Matrix3::new(600.0, 0.0, 320.0, 0.0, 600.0, 240.0, 0.0, 0.0, 1.0),
        dist,
        ImageSize::new(640, 480),
    )
    .expect("valid camera")
}

fn spec() -> ChessboardSpec {
    ChessboardSpec::new(9, 6).expect("9x6 board")
}

fn detector() -> ChessboardDetector {
    ChessboardDetector::new(spec(), ChessboardDetectorParams::default())
}

fn max_error(found: &[Point2<f64>], truth: &[Point2<f64>]) -> f64 {
    found
        .iter()
        .zip(truth)
        .map(|(a, b)| (a - b).norm())
        .fold(0.0, f64::max)
}

#[test]
fn finds_all_corners_in_row_major_order() {
    let cam = camera(DistortionCoefficients::five(0.0, 0.0, 0.0, 0.0, 0.0));
    let pose = board_pose(&spec(), 0.15, -0.1, 0.05, Vector3::new(0.0, 0.0, 15.0));
    let img = render_chessboard(&spec(), &cam, &pose, 4);
    let truth = project_corners(&spec(), &cam, &pose).expect("visible");

    let DetectionOutcome::Found(corners) = detector().detect(&img.view()) else {
        panic!("board not found");
    };
    assert_eq!(corners.len(), 54);
    let err = max_error(&corners, &truth);
    assert!(err < 0.15, "max corner error {err:.3} px");
}

#[test]
fn upside_down_board_keeps_image_frame_order() {
    let cam = camera(DistortionCoefficients::five(0.0, 0.0, 0.0, 0.0, 0.0));
    let pose = board_pose(
        &spec(),
        0.1,
        0.0,
        std::f64::consts::PI + 0.05,
        Vector3::new(0.0, 0.0, 15.0),
    );
    let img = render_chessboard(&spec(), &cam, &pose, 4);
    let truth = project_corners(&spec(), &cam, &pose).expect("visible");

    let corners = detector()
        .detect(&img.view())
        .into_corners()
        .expect("board found");
    // Board rotated by 180°: the first detected corner is the last board corner.
    let reversed: Vec<Point2<f64>> = truth.iter().rev().copied().collect();
    assert!(max_error(&corners, &reversed) < 0.15);
    // Row direction still points to image +x.
    assert!(corners[1].x > corners[0].x);
}

#[test]
fn distorted_views_are_detected() {
    let cam = camera(DistortionCoefficients::five(-0.12, 0.03, 0.0, 0.0, 0.0));
    let poses = calibration_poses(&spec(), 15.0);
    for pose in poses.iter().take(4) {
        let img = render_chessboard(&spec(), &cam, pose, 3);
        let truth = project_corners(&spec(), &cam, pose).expect("visible");
        let corners = detector()
            .detect(&img.view())
            .into_corners()
            .expect("board found");
        assert!(max_error(&corners, &truth) < 0.2);
    }
}

#[test]
fn blank_and_mismatched_boards_are_not_found() {
    let blank = GrayImage {
        width: 320,
        height: 240,
        data: vec![200; 320 * 240],
    };
    assert_eq!(detector().detect(&blank.view()), DetectionOutcome::NotFound);

    let cam = camera(DistortionCoefficients::five(0.0, 0.0, 0.0, 0.0, 0.0));
    let pose = board_pose(&spec(), 0.0, 0.0, 0.0, Vector3::new(0.0, 0.0, 15.0));
    let img = render_chessboard(&spec(), &cam, &pose, 2);
    let other = ChessboardDetector::new(
        ChessboardSpec::new(7, 6).expect("spec"),
        ChessboardDetectorParams::default(),
    );
    assert_eq!(other.detect(&img.view()), DetectionOutcome::NotFound);
}

#[test]
fn accumulate_skips_failures_and_foreign_resolutions() {
    let cam = camera(DistortionCoefficients::five(0.0, 0.0, 0.0, 0.0, 0.0));
    let poses = calibration_poses(&spec(), 15.0);
    let good_a = render_chessboard(&spec(), &cam, &poses[0], 2);
    let good_b = render_chessboard(&spec(), &cam, &poses[3], 2);
    let blank = GrayImage::new(640, 480);
    let small = GrayImage::new(320, 240);

    let det = detector();
    let set = accumulate(
        [good_a.view(), blank.view(), small.view(), good_b.view()],
        &det,
    );
    assert_eq!(set.len(), 2);
    assert_eq!(set.skipped, vec![1, 2]);
    assert_eq!(set.image_size, Some(ImageSize::new(640, 480)));
    assert_eq!(set.correspondences[1].source_index, 3);
    assert_eq!(set.correspondences[0].object_points(), spec().object_points().as_slice());

    let empty = accumulate(std::iter::empty(), &det);
    assert!(empty.is_empty());
    assert!(empty.skipped.is_empty());
}

#[cfg(feature = "rayon")]
#[test]
fn parallel_accumulation_matches_sequential() {
    let cam = camera(DistortionCoefficients::five(0.0, 0.0, 0.0, 0.0, 0.0));
    let poses = calibration_poses(&spec(), 15.0);
    let images: Vec<GrayImage> = poses
        .iter()
        .take(3)
        .map(|p| render_chessboard(&spec(), &cam, p, 2))
        .collect();
    let views: Vec<_> = images.iter().map(GrayImage::view).collect();
    let det = detector();
    assert_eq!(
        camcal_chessboard::accumulate_par(&views, &det),
        accumulate(views.iter().copied(), &det)
    );
}
