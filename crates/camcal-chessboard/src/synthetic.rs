//! Synthetic chessboard views for tests, benchmarks and demos.
//!
//! Boards are rendered through the full camera model (including
//! distortion) with box-filter supersampling, so the detector sees
//! anti-aliased edges like in a real photograph.

use camcal_core::{CalibrationParameters, GrayImage};
use nalgebra::{Isometry3, Matrix3, Point2, Translation3, UnitQuaternion, Vector2, Vector3};

use crate::spec::ChessboardSpec;

pub const DARK: u8 = 30;
pub const LIGHT: u8 = 220;

/// Board-plane coordinates seen through pixel position `px`, or `None`
/// when the viewing ray misses the front of the plane.
fn board_coords(
    camera: &CalibrationParameters,
    plane_from_norm: &Matrix3<f64>,
    px: Point2<f64>,
) -> Option<Vector2<f64>> {
    let n = camera.undistort_pixel(px);
    let b = plane_from_norm * Vector3::new(n.x, n.y, 1.0);
    (b.z > 1e-12).then(|| Vector2::new(b.x / b.z, b.y / b.z))
}

fn shade(spec: &ChessboardSpec, b: Option<Vector2<f64>>) -> f64 {
    let Some(b) = b else {
        return LIGHT as f64;
    };
    let s = spec.square_size();
    let qx = (b.x / s).floor() + 1.0;
    let qy = (b.y / s).floor() + 1.0;
    let inside = qx >= 0.0 && qy >= 0.0 && qx <= spec.cols() as f64 && qy <= spec.rows() as f64;
    if inside && (qx as i64 + qy as i64) % 2 == 0 {
        DARK as f64
    } else {
        LIGHT as f64
    }
}

/// Render the board seen from `cam_from_board` on a light background.
///
/// The board has `(cols + 1) × (rows + 1)` squares around the inner corners
/// of `spec`; the outer squares touching corner `(0, 0)` are dark.
pub fn render_chessboard(
    spec: &ChessboardSpec,
    camera: &CalibrationParameters,
    cam_from_board: &Isometry3<f64>,
    supersample: usize,
) -> GrayImage {
    let size = camera.image_size;
    let mut img = GrayImage::new(size.width, size.height);
    let rot = cam_from_board.rotation.to_rotation_matrix();
    let r = rot.matrix();
    let t = cam_from_board.translation.vector;
    let norm_from_plane = Matrix3::from_columns(&[r.column(0).into_owned(), r.column(1).into_owned(), t]);
    let Some(plane_from_norm) = norm_from_plane.try_inverse() else {
        return img;
    };

    // Board coordinates on the lattice of pixel corners; subsamples are
    // interpolated from the four corners of their pixel.
    let (lw, lh) = (size.width + 1, size.height + 1);
    let lattice: Vec<Option<Vector2<f64>>> = (0..lh)
        .flat_map(|y| (0..lw).map(move |x| (x, y)))
        .map(|(x, y)| {
            let px = Point2::new(x as f64 - 0.5, y as f64 - 0.5);
            board_coords(camera, &plane_from_norm, px)
        })
        .collect();

    let ss = supersample.max(1);
    let inv = 1.0 / ss as f64;
    for y in 0..size.height {
        for x in 0..size.width {
            let c00 = lattice[y * lw + x];
            let c10 = lattice[y * lw + x + 1];
            let c01 = lattice[(y + 1) * lw + x];
            let c11 = lattice[(y + 1) * lw + x + 1];
            let mut acc = 0.0;
            for sy in 0..ss {
                let fy = (sy as f64 + 0.5) * inv;
                for sx in 0..ss {
                    let fx = (sx as f64 + 0.5) * inv;
                    let b = match (c00, c10, c01, c11) {
                        (Some(a), Some(b), Some(c), Some(d)) => {
                            let top = a + (b - a) * fx;
                            let bottom = c + (d - c) * fx;
                            Some(top + (bottom - top) * fy)
                        }
                        _ => None,
                    };
                    acc += shade(spec, b);
                }
            }
            img.data[y * size.width + x] = (acc * inv * inv).round().clamp(0.0, 255.0) as u8;
        }
    }
    img
}

/// Exact pixel positions of the inner corners, in object-point order.
pub fn project_corners(
    spec: &ChessboardSpec,
    camera: &CalibrationParameters,
    cam_from_board: &Isometry3<f64>,
) -> Option<Vec<Point2<f64>>> {
    spec.object_points()
        .iter()
        .map(|p| camera.project(&cam_from_board.transform_point(p)))
        .collect()
}

/// Pose that puts the board centre at `centre` (camera frame) after
/// rotating it by `(roll, pitch, yaw)`.
pub fn board_pose(
    spec: &ChessboardSpec,
    roll: f64,
    pitch: f64,
    yaw: f64,
    centre: Vector3<f64>,
) -> Isometry3<f64> {
    let s = spec.square_size();
    let board_centre = Vector3::new(
        (spec.cols() - 1) as f64 * s / 2.0,
        (spec.rows() - 1) as f64 * s / 2.0,
        0.0,
    );
    let rotation = UnitQuaternion::from_euler_angles(roll, pitch, yaw);
    let translation = centre - rotation * board_centre;
    Isometry3::from_parts(Translation3::from(translation), rotation)
}

/// A fixed spread of twelve tilted views at roughly `distance` (board
/// units), suitable for calibrating focal length and distortion.
pub fn calibration_poses(spec: &ChessboardSpec, distance: f64) -> Vec<Isometry3<f64>> {
    const VIEWS: [(f64, f64, f64, f64, f64); 12] = [
        // roll, pitch, yaw (deg), centre offset x, y (fraction of distance)
        (0.0, 0.0, 2.0, 0.0, 0.0),
        (20.0, 0.0, -3.0, 0.0, 0.02),
        (-20.0, 0.0, 4.0, 0.0, -0.02),
        (0.0, 22.0, 0.0, 0.03, 0.0),
        (0.0, -22.0, -2.0, -0.03, 0.0),
        (15.0, 15.0, 5.0, 0.04, 0.03),
        (-15.0, 15.0, -5.0, 0.04, -0.03),
        (15.0, -15.0, 3.0, -0.04, 0.03),
        (-15.0, -15.0, -4.0, -0.04, -0.03),
        (10.0, -5.0, 8.0, 0.06, 0.04),
        (-8.0, 12.0, -8.0, -0.06, -0.04),
        (25.0, 8.0, 0.0, 0.0, 0.05),
    ];
    VIEWS
        .iter()
        .enumerate()
        .map(|(k, &(roll, pitch, yaw, ox, oy))| {
            let z = distance * (1.0 + 0.05 * (k % 3) as f64);
            board_pose(
                spec,
                roll.to_radians(),
                pitch.to_radians(),
                yaw.to_radians(),
                Vector3::new(ox * z, oy * z, z),
            )
        })
        .collect()
}
