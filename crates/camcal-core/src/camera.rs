//! Pinhole camera with OpenCV-ordered radial/tangential distortion.
//!
//! Coefficients are stored as `[k1, k2, p1, p2, k3, k4, k5, k6]`. The radial
//! factor is the rational polynomial
//! `(1 + k1 r² + k2 r⁴ + k3 r⁶) / (1 + k4 r² + k5 r⁴ + k6 r⁶)`; with only
//! five coefficients the denominator is 1.

use nalgebra::{Matrix3, Point2, Point3, Vector2};
use serde::{Deserialize, Serialize};

use crate::image::ImageSize;

/// Maximum fixed-point iterations when inverting the distortion model.
const UNDISTORT_MAX_ITERS: usize = 50;
const UNDISTORT_EPS: f64 = 1e-15;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CameraModelError {
    #[error("distortion must have 4, 5 or 8 coefficients, got {0}")]
    DistortionLength(usize),
    #[error("camera parameters contain non-finite values")]
    NonFinite,
    #[error("focal lengths must be positive (fx = {fx}, fy = {fy})")]
    NonPositiveFocal { fx: f64, fy: f64 },
    #[error("intrinsic matrix bottom row must be [0, 0, 1]")]
    BadBottomRow,
    #[error("image size must be non-zero, got {width}x{height}")]
    EmptyImageSize { width: usize, height: usize },
}

/// Lens distortion coefficients in OpenCV order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct DistortionCoefficients {
    coeffs: [f64; 8],
    len: usize,
}

impl DistortionCoefficients {
    pub fn new(values: &[f64]) -> Result<Self, CameraModelError> {
        if !matches!(values.len(), 4 | 5 | 8) {
            return Err(CameraModelError::DistortionLength(values.len()));
        }
        let mut coeffs = [0.0; 8];
        coeffs[..values.len()].copy_from_slice(values);
        Ok(Self {
            coeffs,
            len: values.len(),
        })
    }

    /// All-zero coefficients of the given length (4, 5 or 8).
    pub fn zeros(len: usize) -> Result<Self, CameraModelError> {
        Self::new(&vec![0.0; len])
    }

    /// `[k1, k2, p1, p2, k3]`.
    pub fn five(k1: f64, k2: f64, p1: f64, p2: f64, k3: f64) -> Self {
        Self {
            coeffs: [k1, k2, p1, p2, k3, 0.0, 0.0, 0.0],
            len: 5,
        }
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.coeffs[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false; kept for the `len`/`is_empty` pairing.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_zero(&self) -> bool {
        self.as_slice().iter().all(|&c| c == 0.0)
    }

    pub fn distort(&self, p: Vector2<f64>) -> Vector2<f64> {
        distort_normalized(&self.coeffs, p)
    }

    pub fn undistort(&self, p: Vector2<f64>) -> Vector2<f64> {
        undistort_normalized(&self.coeffs, p)
    }
}

impl TryFrom<Vec<f64>> for DistortionCoefficients {
    type Error = CameraModelError;

    fn try_from(v: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(&v)
    }
}

impl From<DistortionCoefficients> for Vec<f64> {
    fn from(d: DistortionCoefficients) -> Self {
        d.as_slice().to_vec()
    }
}

#[inline]
fn coeff(k: &[f64], i: usize) -> f64 {
    k.get(i).copied().unwrap_or(0.0)
}

/// Apply distortion to an ideal normalized point `(x/z, y/z)`.
///
/// `k` may hold any prefix of the OpenCV coefficient vector; missing entries
/// are treated as zero.
pub fn distort_normalized(k: &[f64], p: Vector2<f64>) -> Vector2<f64> {
    let (x, y) = (p.x, p.y);
    let (k1, k2, p1, p2, k3) = (coeff(k, 0), coeff(k, 1), coeff(k, 2), coeff(k, 3), coeff(k, 4));
    let (k4, k5, k6) = (coeff(k, 5), coeff(k, 6), coeff(k, 7));

    let r2 = x * x + y * y;
    let r4 = r2 * r2;
    let r6 = r4 * r2;
    let radial = (1.0 + k1 * r2 + k2 * r4 + k3 * r6) / (1.0 + k4 * r2 + k5 * r4 + k6 * r6);

    let xy = x * y;
    let x_tan = 2.0 * p1 * xy + p2 * (r2 + 2.0 * x * x);
    let y_tan = p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * xy;

    Vector2::new(x * radial + x_tan, y * radial + y_tan)
}

/// Invert [`distort_normalized`] by fixed-point iteration.
pub fn undistort_normalized(k: &[f64], pd: Vector2<f64>) -> Vector2<f64> {
    let (k1, k2, p1, p2, k3) = (coeff(k, 0), coeff(k, 1), coeff(k, 2), coeff(k, 3), coeff(k, 4));
    let (k4, k5, k6) = (coeff(k, 5), coeff(k, 6), coeff(k, 7));

    let (mut x, mut y) = (pd.x, pd.y);
    for _ in 0..UNDISTORT_MAX_ITERS {
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let inv_radial = (1.0 + k4 * r2 + k5 * r4 + k6 * r6) / (1.0 + k1 * r2 + k2 * r4 + k3 * r6);
        if !inv_radial.is_finite() {
            break;
        }
        let dx = 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
        let dy = p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;
        let nx = (pd.x - dx) * inv_radial;
        let ny = (pd.y - dy) * inv_radial;
        let step = (nx - x).abs().max((ny - y).abs());
        x = nx;
        y = ny;
        if step < UNDISTORT_EPS {
            break;
        }
    }
    Vector2::new(x, y)
}

/// Calibrated pinhole camera: intrinsic matrix, distortion and the
/// resolution the parameters were solved at.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParameters {
    pub intrinsic_matrix: Matrix3<f64>,
    pub distortion: DistortionCoefficients,
    pub image_size: ImageSize,
}

impl CalibrationParameters {
    /// Build and validate.
    pub fn new(
        intrinsic_matrix: Matrix3<f64>,
        distortion: DistortionCoefficients,
        image_size: ImageSize,
    ) -> Result<Self, CameraModelError> {
        let params = Self {
            intrinsic_matrix,
            distortion,
            image_size,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), CameraModelError> {
        let k = &self.intrinsic_matrix;
        if !k.iter().all(|v| v.is_finite())
            || !self.distortion.as_slice().iter().all(|v| v.is_finite())
        {
            return Err(CameraModelError::NonFinite);
        }
        let (fx, fy) = (k[(0, 0)], k[(1, 1)]);
        if fx <= 0.0 || fy <= 0.0 {
            return Err(CameraModelError::NonPositiveFocal { fx, fy });
        }
        if k[(2, 0)] != 0.0 || k[(2, 1)] != 0.0 || k[(2, 2)] != 1.0 {
            return Err(CameraModelError::BadBottomRow);
        }
        if self.image_size.width == 0 || self.image_size.height == 0 {
            return Err(CameraModelError::EmptyImageSize {
                width: self.image_size.width,
                height: self.image_size.height,
            });
        }
        Ok(())
    }

    pub fn fx(&self) -> f64 {
        self.intrinsic_matrix[(0, 0)]
    }

    pub fn fy(&self) -> f64 {
        self.intrinsic_matrix[(1, 1)]
    }

    pub fn cx(&self) -> f64 {
        self.intrinsic_matrix[(0, 2)]
    }

    pub fn cy(&self) -> f64 {
        self.intrinsic_matrix[(1, 2)]
    }

    /// Intrinsics for the same lens at another resolution.
    ///
    /// Rows of the intrinsic matrix are scaled by the per-axis size ratio;
    /// distortion is resolution independent and kept as is.
    pub fn rescaled_to(&self, size: ImageSize) -> Self {
        if size == self.image_size || self.image_size.width == 0 || self.image_size.height == 0 {
            return Self {
                image_size: size,
                ..self.clone()
            };
        }
        let sx = size.width as f64 / self.image_size.width as f64;
        let sy = size.height as f64 / self.image_size.height as f64;
        let mut k = self.intrinsic_matrix;
        for c in 0..3 {
            k[(0, c)] *= sx;
            k[(1, c)] *= sy;
        }
        Self {
            intrinsic_matrix: k,
            distortion: self.distortion.clone(),
            image_size: size,
        }
    }

    /// Project a point given in the camera frame to distorted pixels.
    /// Returns `None` for points at or behind the camera centre.
    pub fn project(&self, p: &Point3<f64>) -> Option<Point2<f64>> {
        if p.z <= f64::EPSILON {
            return None;
        }
        let n = Vector2::new(p.x / p.z, p.y / p.z);
        Some(self.normalized_to_pixel(self.distortion.distort(n)))
    }

    /// Map a distorted pixel to its ideal normalized coordinates.
    pub fn undistort_pixel(&self, px: Point2<f64>) -> Vector2<f64> {
        let k = &self.intrinsic_matrix;
        let (fx, fy, cx, cy, s) = (k[(0, 0)], k[(1, 1)], k[(0, 2)], k[(1, 2)], k[(0, 1)]);
        let yn = (px.y - cy) / fy;
        let xn = (px.x - cx - s * yn) / fx;
        self.distortion.undistort(Vector2::new(xn, yn))
    }

    #[inline]
    pub fn normalized_to_pixel(&self, n: Vector2<f64>) -> Point2<f64> {
        let k = &self.intrinsic_matrix;
        Point2::new(
            k[(0, 0)] * n.x + k[(0, 1)] * n.y + k[(0, 2)],
            k[(1, 1)] * n.y + k[(1, 2)],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera(dist: DistortionCoefficients) -> CalibrationParameters {
        CalibrationParameters::new(
            Matrix3::new(800.0, 0.0, 320.0, 0.0, 780.0, 240.0, 0.0, 0.0, 1.0),
            dist,
            ImageSize::new(640, 480),
        )
        .expect("valid camera")
    }

    #[test]
    fn distortion_length_is_checked() {
        assert!(DistortionCoefficients::new(&[0.0; 4]).is_ok());
        assert!(DistortionCoefficients::new(&[0.0; 5]).is_ok());
        assert!(DistortionCoefficients::new(&[0.0; 8]).is_ok());
        assert_eq!(
            DistortionCoefficients::new(&[0.0; 6]),
            Err(CameraModelError::DistortionLength(6))
        );
    }

    #[test]
    fn distortion_serializes_as_plain_list() {
        let d = DistortionCoefficients::five(-0.1, 0.01, 0.0, 0.0, 0.0);
        let json = serde_json::to_string(&d).expect("serialize");
        assert_eq!(json, "[-0.1,0.01,0.0,0.0,0.0]");
        let back: DistortionCoefficients = serde_json::from_str(&json).expect("parse");
        assert_eq!(back, d);
        assert!(serde_json::from_str::<DistortionCoefficients>("[1.0, 2.0]").is_err());
    }

    #[test]
    fn undistort_inverts_distort_for_moderate_lens() {
        let d = DistortionCoefficients::five(-0.2, 0.05, 0.001, -0.0005, 0.01);
        for &(x, y) in &[(0.0, 0.0), (0.3, -0.2), (-0.45, 0.35), (0.1, 0.5)] {
            let p = Vector2::new(x, y);
            let back = d.undistort(d.distort(p));
            assert_relative_eq!(back.x, x, epsilon = 1e-9);
            assert_relative_eq!(back.y, y, epsilon = 1e-9);
        }
    }

    #[test]
    fn rational_model_uses_denominator() {
        let d = DistortionCoefficients::new(&[0.1, 0.0, 0.0, 0.0, 0.0, 0.1, 0.0, 0.0])
            .expect("eight coefficients");
        // Equal numerator and denominator terms cancel.
        let p = Vector2::new(0.3, 0.4);
        let q = d.distort(p);
        assert_relative_eq!(q.x, p.x, epsilon = 1e-15);
        assert_relative_eq!(q.y, p.y, epsilon = 1e-15);
    }

    #[test]
    fn projection_round_trips_through_undistort_pixel() {
        let cam = camera(DistortionCoefficients::five(-0.15, 0.02, 0.0, 0.0, 0.0));
        let p = Point3::new(0.2, -0.1, 1.5);
        let px = cam.project(&p).expect("in front");
        let n = cam.undistort_pixel(px);
        assert_relative_eq!(n.x, p.x / p.z, epsilon = 1e-9);
        assert_relative_eq!(n.y, p.y / p.z, epsilon = 1e-9);
        assert!(cam.project(&Point3::new(0.0, 0.0, -1.0)).is_none());
    }

    #[test]
    fn validate_rejects_bad_matrices() {
        let mut cam = camera(DistortionCoefficients::zeros(5).expect("zeros"));
        cam.intrinsic_matrix[(0, 0)] = -1.0;
        assert!(matches!(
            cam.validate(),
            Err(CameraModelError::NonPositiveFocal { .. })
        ));

        let mut cam = camera(DistortionCoefficients::zeros(4).expect("zeros"));
        cam.intrinsic_matrix[(2, 2)] = 2.0;
        assert_eq!(cam.validate(), Err(CameraModelError::BadBottomRow));

        let mut cam = camera(DistortionCoefficients::zeros(8).expect("zeros"));
        cam.intrinsic_matrix[(1, 2)] = f64::NAN;
        assert_eq!(cam.validate(), Err(CameraModelError::NonFinite));
    }

    #[test]
    fn rescaling_scales_focal_and_centre() {
        let cam = camera(DistortionCoefficients::zeros(5).expect("zeros"));
        let half = cam.rescaled_to(ImageSize::new(320, 240));
        assert_relative_eq!(half.fx(), 400.0);
        assert_relative_eq!(half.fy(), 390.0);
        assert_relative_eq!(half.cx(), 160.0);
        assert_relative_eq!(half.cy(), 120.0);
        assert_eq!(half.image_size, ImageSize::new(320, 240));
        assert_eq!(half.distortion, cam.distortion);
        assert_eq!(cam.rescaled_to(cam.image_size), cam);
    }
}
