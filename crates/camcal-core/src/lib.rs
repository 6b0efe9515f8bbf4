//! Core types for camcal: 8-bit image buffers with bilinear sampling,
//! plane homographies, board/image correspondences, and the pinhole camera
//! with radial/tangential distortion shared by the detector, solver and
//! undistorter crates.
//!
//! Colour images are interleaved RGB throughout the workspace.

mod camera;
mod correspondence;
mod homography;
mod image;
mod logger;

pub use camera::{
    distort_normalized, undistort_normalized, CalibrationParameters, CameraModelError,
    DistortionCoefficients,
};
pub use correspondence::{Correspondence, CorrespondenceError, CorrespondenceSet};
pub use homography::{estimate_homography, homography_from_4pt, Homography};
pub use image::{
    get_gray_clamped, sample_bilinear, sample_bilinear_interleaved, GrayImage, GrayImageView,
    ImageSize, PixelBuffer, RgbImage,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, level_from_verbosity};
