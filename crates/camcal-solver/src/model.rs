//! Packed camera model used inside the optimiser.
//!
//! Intrinsics: `[fx, fy, cx, cy, k1, k2, p1, p2, k3]`.
//! Pose: `[rx, ry, rz, tx, ty, tz]` with an axis-angle rotation vector.

use camcal_core::distort_normalized;
use nalgebra::{Isometry3, Point2, Point3, Rotation3, Translation3, UnitQuaternion, Vector2, Vector3};

pub const N_INTRINSICS: usize = 9;
pub const N_POSE: usize = 6;

pub const FX: usize = 0;
pub const FY: usize = 1;
pub const CX: usize = 2;
pub const CY: usize = 3;
pub const K1: usize = 4;
pub const P1: usize = 6;
pub const P2: usize = 7;
pub const K3: usize = 8;

pub type Intrinsics = [f64; N_INTRINSICS];
pub type Pose = [f64; N_POSE];

pub fn pose_to_isometry(p: &Pose) -> Isometry3<f64> {
    let rot = UnitQuaternion::from_scaled_axis(Vector3::new(p[0], p[1], p[2]));
    Isometry3::from_parts(Translation3::new(p[3], p[4], p[5]), rot)
}

pub fn isometry_to_pose(iso: &Isometry3<f64>) -> Pose {
    let r = iso.rotation.scaled_axis();
    let t = iso.translation.vector;
    [r.x, r.y, r.z, t.x, t.y, t.z]
}

/// Project board points with packed parameters, writing `(u - x, v - y)`
/// residuals for each observation into `out`.
pub fn view_residuals(
    intr: &Intrinsics,
    pose: &Pose,
    object: &[Point3<f64>],
    image: &[Point2<f64>],
    out: &mut [f64],
) {
    let rot = Rotation3::new(Vector3::new(pose[0], pose[1], pose[2]));
    let t = Vector3::new(pose[3], pose[4], pose[5]);
    let dist = &intr[K1..=K3];
    for (k, (obj, obs)) in object.iter().zip(image).enumerate() {
        let pc = rot * obj.coords + t;
        let n = Vector2::new(pc.x / pc.z, pc.y / pc.z);
        let d = distort_normalized(dist, n);
        out[2 * k] = intr[FX] * d.x + intr[CX] - obs.x;
        out[2 * k + 1] = intr[FY] * d.y + intr[CY] - obs.y;
    }
}
