//! Closed-form starting point for the nonlinear refinement.
//!
//! With the principal point fixed at the image centre and zero skew, the
//! image of the absolute conic is `B = diag(1/fx², 1/fy², 1)` in centred
//! coordinates. Each plane homography `H = [h1 h2 h3]` then gives two linear
//! constraints on `(1/fx², 1/fy²)`:
//!
//! ```text
//! h1ᵀ B h2 = 0
//! h1ᵀ B h1 - h2ᵀ B h2 = 0
//! ```
//!
//! which are stacked over all views and solved by least squares.

use camcal_core::{estimate_homography, Homography, ImageSize};
use nalgebra::{
    DMatrix, DVector, Isometry3, Matrix3, Point2, Point3, Rotation3, Translation3, UnitQuaternion,
    Vector3,
};

/// Homography from the board plane (z = 0) to the image. `None` for
/// degenerate point layouts.
pub fn board_homography(object: &[Point3<f64>], image: &[Point2<f64>]) -> Option<Homography> {
    let plane: Vec<Point2<f64>> = object.iter().map(|p| Point2::new(p.x, p.y)).collect();
    estimate_homography(&plane, image)
}

/// Principal point used for initialisation: the centre of the pixel grid.
pub fn image_centre(size: ImageSize) -> (f64, f64) {
    (
        (size.width as f64 - 1.0) * 0.5,
        (size.height as f64 - 1.0) * 0.5,
    )
}

/// Least-squares focal lengths from plane homographies. Returns `None` when
/// the views do not constrain them (e.g. all fronto-parallel).
pub fn focal_from_homographies(homographies: &[Homography], size: ImageSize) -> Option<(f64, f64)> {
    if homographies.is_empty() {
        return None;
    }
    let (cx, cy) = image_centre(size);
    let centre_inv = Matrix3::new(1.0, 0.0, -cx, 0.0, 1.0, -cy, 0.0, 0.0, 1.0);

    let m = homographies.len();
    let mut a = DMatrix::<f64>::zeros(2 * m, 2);
    let mut b = DVector::<f64>::zeros(2 * m);
    for (k, h) in homographies.iter().enumerate() {
        let hc = centre_inv * h.h;
        let hc = hc / hc.norm();
        let h1 = hc.column(0);
        let h2 = hc.column(1);

        a[(2 * k, 0)] = h1[0] * h2[0];
        a[(2 * k, 1)] = h1[1] * h2[1];
        b[2 * k] = -h1[2] * h2[2];

        a[(2 * k + 1, 0)] = h1[0] * h1[0] - h2[0] * h2[0];
        a[(2 * k + 1, 1)] = h1[1] * h1[1] - h2[1] * h2[1];
        b[2 * k + 1] = -(h1[2] * h1[2] - h2[2] * h2[2]);
    }

    let ata = a.transpose() * &a;
    // Fronto-parallel views leave the system (near) rank deficient.
    let scale = ata.abs().max();
    if scale <= 0.0 || ata.determinant().abs() < 1e-12 * scale * scale {
        return None;
    }
    let x = ata.cholesky()?.solve(&(a.transpose() * b));
    let (b1, b2) = (x[0], x[1]);
    if !(b1 > 0.0 && b2 > 0.0) {
        return None;
    }
    let (fx, fy) = (b1.recip().sqrt(), b2.recip().sqrt());
    (fx.is_finite() && fy.is_finite()).then_some((fx, fy))
}

/// Board-to-camera pose from intrinsics and a plane homography.
///
/// The rotation is projected onto SO(3); the sign is chosen so the board
/// lies in front of the camera.
pub fn planar_pose(k: &Matrix3<f64>, h: &Homography) -> Option<Isometry3<f64>> {
    let k_inv = k.try_inverse()?;
    let kh1 = k_inv * h.h.column(0);
    let kh2 = k_inv * h.h.column(1);
    let kh3 = k_inv * h.h.column(2);

    let mean_norm = 0.5 * (kh1.norm() + kh2.norm());
    if mean_norm <= f64::EPSILON {
        return None;
    }
    let mut lambda = 1.0 / mean_norm;
    if kh3.z * lambda < 0.0 {
        lambda = -lambda;
    }

    let r1 = kh1 * lambda;
    let r2 = kh2 * lambda;
    let r3 = r1.cross(&r2);
    let r = Matrix3::from_columns(&[r1, r2, r3]);

    let svd = r.svd(true, true);
    let (u, v_t) = (svd.u?, svd.v_t?);
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }

    let t: Vector3<f64> = kh3 * lambda;
    if !t.iter().all(|v| v.is_finite()) {
        return None;
    }
    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r_orth));
    Some(Isometry3::from_parts(Translation3::from(t), rot))
}
