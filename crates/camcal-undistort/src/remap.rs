use camcal_core::{sample_bilinear_interleaved, CalibrationParameters, ImageSize, PixelBuffer};
use nalgebra::{Matrix3, Point2, Vector2, Vector3};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Per-pixel source coordinates for undistorting one image size.
///
/// Building the map is the expensive part; applying it is a bilinear gather,
/// so a map can be reused for every frame of the same camera.
#[derive(Clone, Debug)]
pub struct UndistortMap {
    size: ImageSize,
    /// Source pixel of each destination pixel, row-major. `NaN` marks
    /// destinations without a source.
    coords: Vec<Point2<f64>>,
}

impl UndistortMap {
    /// Map from undistorted pixels of `k_new` to distorted pixels of
    /// `params`, for images of `params.image_size`.
    ///
    /// Returns `None` when `k_new` is not invertible.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
    pub fn new(params: &CalibrationParameters, k_new: &Matrix3<f64>) -> Option<Self> {
        let size = params.image_size;
        let inv = k_new.try_inverse()?;
        let mut coords = Vec::with_capacity(size.area());
        for v in 0..size.height {
            for u in 0..size.width {
                let ray = inv * Vector3::new(u as f64, v as f64, 1.0);
                let src = if ray.z.abs() > f64::EPSILON {
                    let n = Vector2::new(ray.x / ray.z, ray.y / ray.z);
                    params.normalized_to_pixel(params.distortion.distort(n))
                } else {
                    Point2::new(f64::NAN, f64::NAN)
                };
                coords.push(src);
            }
        }
        Some(Self { size, coords })
    }

    pub fn size(&self) -> ImageSize {
        self.size
    }

    /// Source pixel for destination `(u, v)`.
    pub fn source(&self, u: usize, v: usize) -> Option<Point2<f64>> {
        if u >= self.size.width || v >= self.size.height {
            return None;
        }
        let p = self.coords[v * self.size.width + u];
        (p.x.is_finite() && p.y.is_finite()).then_some(p)
    }

    /// Resample `src` through the map. Destinations whose source falls
    /// outside the image are zero.
    ///
    /// `src` must have the map's size; any other size gives a blank image of
    /// the map's size.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
    pub fn remap<I: PixelBuffer>(&self, src: &I) -> I {
        let (w, h) = (self.size.width, self.size.height);
        let mut out = I::blank(w, h);
        if src.size() != self.size {
            log::warn!(
                "remap: image is {}x{}, map is {}x{}",
                src.width(),
                src.height(),
                w,
                h
            );
            return out;
        }
        let c = I::CHANNELS;
        let data = src.as_raw();
        let row = |(v, dst_row): (usize, &mut [u8])| {
            for (u, px) in dst_row.chunks_exact_mut(c).enumerate() {
                let p = self.coords[v * w + u];
                sample_bilinear_interleaved(data, w, h, c, p.x, p.y, px);
            }
        };

        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            out.as_raw_mut()
                .par_chunks_mut((w * c).max(1))
                .enumerate()
                .for_each(row);
        }
        #[cfg(not(feature = "rayon"))]
        out.as_raw_mut()
            .chunks_mut((w * c).max(1))
            .enumerate()
            .for_each(row);

        out
    }
}
