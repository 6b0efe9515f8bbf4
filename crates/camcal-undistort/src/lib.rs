//! Lens-distortion correction with a calibrated pinhole camera.
//!
//! [`Undistorter::correct`] picks a new camera matrix for the input size
//! ([`optimal_new_camera_matrix`]), resamples the image through the inverse
//! distortion ([`UndistortMap`]) and crops the result to the region that
//! only holds source pixels.
//!
//! ```no_run
//! use camcal_core::{CalibrationParameters, RgbImage};
//! use camcal_undistort::Undistorter;
//!
//! # fn inputs() -> (RgbImage, CalibrationParameters) { unimplemented!() }
//! let (photo, params) = inputs();
//! let result = Undistorter::new().correct(&photo, &params)?;
//! println!("valid region {:?}", result.roi);
//! # Ok::<(), camcal_undistort::UndistortError>(())
//! ```

mod error;
mod optimal;
mod remap;
mod undistorter;

pub use error::UndistortError;
pub use optimal::{optimal_new_camera_matrix, Roi};
pub use remap::UndistortMap;
pub use undistorter::{UndistortParams, UndistortionResult, Undistorter};
