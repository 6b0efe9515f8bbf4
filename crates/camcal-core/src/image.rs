//! Lightweight 8-bit image buffers.
//!
//! Colour buffers are always interleaved **RGB** (never BGR). Every crate in
//! the workspace and every conversion in the facade keeps that order, so
//! pixels handed to downstream consumers need no channel swapping.

use serde::{Deserialize, Serialize};

/// Pixel dimensions of an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: usize,
    pub height: usize,
}

impl ImageSize {
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }
}

#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h
}

impl GrayImageView<'_> {
    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.width, self.height)
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }
}

/// Interleaved RGB8 image, row-major, `len = w * h * 3`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgbImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl RgbImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height * 3],
        }
    }

    /// Convert to grayscale with BT.601 luma weights.
    pub fn to_gray(&self) -> GrayImage {
        let data = self
            .data
            .chunks_exact(3)
            .map(|px| {
                let y = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
                y.round().clamp(0.0, 255.0) as u8
            })
            .collect();
        GrayImage {
            width: self.width,
            height: self.height,
            data,
        }
    }
}

/// Common access to interleaved 8-bit buffers so resampling code can be
/// written once for gray and colour images.
pub trait PixelBuffer: Sized {
    const CHANNELS: usize;

    fn width(&self) -> usize;
    fn height(&self) -> usize;
    fn as_raw(&self) -> &[u8];
    fn as_raw_mut(&mut self) -> &mut [u8];

    /// A zero-filled buffer of the given size.
    fn blank(width: usize, height: usize) -> Self;

    /// Build a buffer from raw interleaved bytes. Returns `None` when the
    /// length does not match `width * height * CHANNELS`.
    fn from_raw(width: usize, height: usize, data: Vec<u8>) -> Option<Self>;

    fn size(&self) -> ImageSize {
        ImageSize::new(self.width(), self.height())
    }

    fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Copy out the rectangle `[x, x + w) × [y, y + h)`, clipped to the image.
    fn crop(&self, x: usize, y: usize, w: usize, h: usize) -> Self {
        let x0 = x.min(self.width());
        let y0 = y.min(self.height());
        let x1 = x.saturating_add(w).min(self.width());
        let y1 = y.saturating_add(h).min(self.height());
        let (cw, ch) = (x1 - x0, y1 - y0);
        let c = Self::CHANNELS;
        let src_stride = self.width() * c;
        let dst_stride = cw * c;

        let mut out = Self::blank(cw, ch);
        let src = self.as_raw();
        let dst = out.as_raw_mut();
        for (k, row) in (y0..y1).enumerate() {
            let start = row * src_stride + x0 * c;
            dst[k * dst_stride..(k + 1) * dst_stride]
                .copy_from_slice(&src[start..start + dst_stride]);
        }
        out
    }
}

impl PixelBuffer for GrayImage {
    const CHANNELS: usize = 1;

    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn as_raw(&self) -> &[u8] {
        &self.data
    }

    fn as_raw_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn blank(width: usize, height: usize) -> Self {
        Self::new(width, height)
    }

    fn from_raw(width: usize, height: usize, data: Vec<u8>) -> Option<Self> {
        (data.len() == width.checked_mul(height)?).then_some(Self {
            width,
            height,
            data,
        })
    }
}

impl PixelBuffer for RgbImage {
    const CHANNELS: usize = 3;

    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn as_raw(&self) -> &[u8] {
        &self.data
    }

    fn as_raw_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn blank(width: usize, height: usize) -> Self {
        Self::new(width, height)
    }

    fn from_raw(width: usize, height: usize, data: Vec<u8>) -> Option<Self> {
        (data.len() == width.checked_mul(height)?.checked_mul(3)?).then_some(Self {
            width,
            height,
            data,
        })
    }
}

/// Clamp-to-edge lookup, used where a zero border would bias gradients.
#[inline]
pub fn get_gray_clamped(src: &GrayImageView<'_>, x: i32, y: i32) -> f32 {
    let xc = x.clamp(0, src.width as i32 - 1) as usize;
    let yc = y.clamp(0, src.height as i32 - 1) as usize;
    src.data[yc * src.width + xc] as f32
}

/// Bilinear gray sample with clamp-to-edge borders.
#[inline]
pub fn sample_bilinear(src: &GrayImageView<'_>, x: f32, y: f32) -> f32 {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = get_gray_clamped(src, x0, y0);
    let p10 = get_gray_clamped(src, x0 + 1, y0);
    let p01 = get_gray_clamped(src, x0, y0 + 1);
    let p11 = get_gray_clamped(src, x0 + 1, y0 + 1);

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}

/// Bilinear sample of an interleaved buffer at `(x, y)` in pixel-centre
/// coordinates (pixel `(0, 0)` covers `[-0.5, 0.5)`), writing `C` channels
/// into `out`.
///
/// Returns `false` (leaving `out` untouched) when the sample falls outside
/// the image; the outermost half pixel is clamped to the border.
#[inline]
pub fn sample_bilinear_interleaved(
    data: &[u8],
    width: usize,
    height: usize,
    channels: usize,
    x: f64,
    y: f64,
    out: &mut [u8],
) -> bool {
    if width == 0 || height == 0 {
        return false;
    }
    let max_x = (width - 1) as f64;
    let max_y = (height - 1) as f64;
    if !(x >= -0.5 && y >= -0.5 && x <= max_x + 0.5 && y <= max_y + 0.5) {
        return false;
    }
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let stride = width * channels;
    for (ch, dst) in out.iter_mut().enumerate().take(channels) {
        let p00 = data[y0 * stride + x0 * channels + ch] as f64;
        let p10 = data[y0 * stride + x1 * channels + ch] as f64;
        let p01 = data[y1 * stride + x0 * channels + ch] as f64;
        let p11 = data[y1 * stride + x1 * channels + ch] as f64;
        let a = p00 + fx * (p10 - p00);
        let b = p01 + fx * (p11 - p01);
        *dst = (a + fy * (b - a)).round().clamp(0.0, 255.0) as u8;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_to_gray_uses_luma_weights() {
        let img = RgbImage {
            width: 3,
            height: 1,
            data: vec![255, 0, 0, 0, 255, 0, 0, 0, 255],
        };
        let gray = img.to_gray();
        assert_eq!(gray.data, vec![76, 150, 29]);
    }

    #[test]
    fn crop_clips_to_image_bounds() {
        let img = GrayImage {
            width: 4,
            height: 3,
            data: (0..12).collect(),
        };
        let c = img.crop(2, 1, 10, 10);
        assert_eq!((c.width, c.height), (2, 2));
        assert_eq!(c.data, vec![6, 7, 10, 11]);

        let empty = img.crop(1, 1, 0, 2);
        assert!(empty.is_empty());
        assert!(empty.data.is_empty());
    }

    #[test]
    fn from_raw_rejects_wrong_length() {
        assert!(RgbImage::from_raw(2, 2, vec![0; 11]).is_none());
        assert!(RgbImage::from_raw(2, 2, vec![0; 12]).is_some());
        assert!(GrayImage::from_raw(2, 2, vec![0; 3]).is_none());
    }

    #[test]
    fn gray_bilinear_clamps_at_border() {
        let img = GrayImage {
            width: 2,
            height: 1,
            data: vec![10, 30],
        };
        let v = img.view();
        assert!((sample_bilinear(&v, 0.5, 0.0) - 20.0).abs() < 1e-6);
        assert!((sample_bilinear(&v, -3.0, 0.0) - 10.0).abs() < 1e-6);
        assert!((sample_bilinear(&v, 1.0, 4.0) - 30.0).abs() < 1e-6);
    }

    #[test]
    fn bilinear_interleaved_interpolates_and_rejects_outside() {
        let data = [0u8, 100, 200, 50];
        let mut out = [0u8; 2];
        assert!(sample_bilinear_interleaved(&data, 1, 2, 2, 0.0, 0.5, &mut out));
        assert_eq!(out, [100, 75]);
        assert!(!sample_bilinear_interleaved(&data, 1, 2, 2, 3.0, 0.0, &mut out));
    }
}
