//! New camera matrix for the undistorted image and its validity region.

use camcal_core::{CalibrationParameters, ImageSize};
use nalgebra::{Matrix3, Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Border samples per image side.
const GRID: usize = 9;
/// Slack for round-off when rounding the ROI inwards.
const ROUND_EPS: f64 = 1e-6;

/// Pixel rectangle `[x, x + width) × [y, y + height)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Roi {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Roi {
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }
}

#[derive(Clone, Copy, Debug)]
struct Rect {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
}

impl Rect {
    fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    fn is_valid(&self) -> bool {
        [self.x0, self.y0, self.x1, self.y1].iter().all(|v| v.is_finite())
            && self.width() > 0.0
            && self.height() > 0.0
    }
}

/// Undistort a `GRID × GRID` lattice spanning the image border to border and
/// return the bounding (outer) and fully covered (inner) rectangles.
///
/// Points are normalized coordinates, or pixels of `k_new` when given.
fn rectangles(params: &CalibrationParameters, k_new: Option<&Matrix3<f64>>) -> (Rect, Rect) {
    let size = params.image_size;
    let (w, h) = (size.width as f64, size.height as f64);
    let last = (GRID - 1) as f64;

    let mut outer = Rect {
        x0: f64::MAX,
        y0: f64::MAX,
        x1: f64::MIN,
        y1: f64::MIN,
    };
    let mut inner = Rect {
        x0: f64::MIN,
        y0: f64::MIN,
        x1: f64::MAX,
        y1: f64::MAX,
    };

    for j in 0..GRID {
        for i in 0..GRID {
            let px = Point2::new(i as f64 * (w - 1.0) / last, j as f64 * (h - 1.0) / last);
            let n = params.undistort_pixel(px);
            let p = match k_new {
                Some(k) => Vector2::new(
                    k[(0, 0)] * n.x + k[(0, 1)] * n.y + k[(0, 2)],
                    k[(1, 1)] * n.y + k[(1, 2)],
                ),
                None => n,
            };

            outer.x0 = outer.x0.min(p.x);
            outer.y0 = outer.y0.min(p.y);
            outer.x1 = outer.x1.max(p.x);
            outer.y1 = outer.y1.max(p.y);

            if i == 0 {
                inner.x0 = inner.x0.max(p.x);
            }
            if i == GRID - 1 {
                inner.x1 = inner.x1.min(p.x);
            }
            if j == 0 {
                inner.y0 = inner.y0.max(p.y);
            }
            if j == GRID - 1 {
                inner.y1 = inner.y1.min(p.y);
            }
        }
    }
    (outer, inner)
}

/// Camera matrix mapping `rect` onto the full image.
fn fit_matrix(rect: &Rect, size: ImageSize) -> Matrix3<f64> {
    let fx = (size.width as f64 - 1.0) / rect.width();
    let fy = (size.height as f64 - 1.0) / rect.height();
    Matrix3::new(fx, 0.0, -fx * rect.x0, 0.0, fy, -fy * rect.y0, 0.0, 0.0, 1.0)
}

/// Camera matrix for undistorting images of `params.image_size`.
///
/// `alpha = 0` zooms in until every output pixel has a source pixel;
/// `alpha = 1` zooms out until every source pixel is kept. Values between
/// interpolate the two matrices. The returned [`Roi`] is the rectangle of the
/// undistorted image that only holds pixels sourced from the input, rounded
/// inwards and clipped to the image.
pub fn optimal_new_camera_matrix(
    params: &CalibrationParameters,
    alpha: f64,
) -> (Matrix3<f64>, Roi) {
    let size = params.image_size;
    let (outer, inner) = rectangles(params, None);

    let k_new = match (outer.is_valid(), inner.is_valid()) {
        (true, true) => {
            let k_in = fit_matrix(&inner, size);
            let k_out = fit_matrix(&outer, size);
            k_in * (1.0 - alpha) + k_out * alpha
        }
        (true, false) => fit_matrix(&outer, size),
        _ => {
            log::warn!("distortion model does not cover the image border, keeping the original intrinsics");
            return (params.intrinsic_matrix, Roi::default());
        }
    };

    let (_, valid) = rectangles(params, Some(&k_new));
    (k_new, inward_roi(&valid, size))
}

fn inward_roi(rect: &Rect, size: ImageSize) -> Roi {
    if !rect.is_valid() {
        return Roi::default();
    }
    let x0 = (rect.x0 - ROUND_EPS).ceil().clamp(0.0, size.width as f64);
    let y0 = (rect.y0 - ROUND_EPS).ceil().clamp(0.0, size.height as f64);
    let x1 = (rect.x1 + ROUND_EPS).floor().clamp(0.0, size.width as f64);
    let y1 = (rect.y1 + ROUND_EPS).floor().clamp(0.0, size.height as f64);
    if x1 <= x0 || y1 <= y0 {
        return Roi::default();
    }
    Roi::new(x0 as usize, y0 as usize, (x1 - x0) as usize, (y1 - y0) as usize)
}
