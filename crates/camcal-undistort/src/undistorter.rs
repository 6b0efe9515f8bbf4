use camcal_core::{CalibrationParameters, PixelBuffer};
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

use crate::error::UndistortError;
use crate::optimal::{optimal_new_camera_matrix, Roi};
use crate::remap::UndistortMap;

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct UndistortParams {
    /// Free scaling of the new camera matrix: `1.0` keeps every source
    /// pixel, `0.0` keeps only fully covered output.
    pub alpha: f64,
}

impl Default for UndistortParams {
    fn default() -> Self {
        Self { alpha: 1.0 }
    }
}

/// Corrected image, its validity crop and the geometry that produced them.
#[derive(Clone, Debug, PartialEq)]
pub struct UndistortionResult<I> {
    /// Same dimensions as the input.
    pub corrected: I,
    /// `corrected` cut to `roi`; empty when the ROI has no area.
    pub cropped: I,
    pub roi: Roi,
    pub new_camera_matrix: Matrix3<f64>,
}

/// Removes lens distortion from photographs taken with a calibrated camera.
#[derive(Clone, Debug, Default)]
pub struct Undistorter {
    params: UndistortParams,
}

impl Undistorter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(params: UndistortParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &UndistortParams {
        &self.params
    }

    /// Undistort `image` and crop it to the valid region.
    ///
    /// Parameters solved at another resolution are rescaled to the image
    /// size first.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(width = image.width(), height = image.height()))
    )]
    pub fn correct<I: PixelBuffer>(
        &self,
        image: &I,
        params: &CalibrationParameters,
    ) -> Result<UndistortionResult<I>, UndistortError> {
        params.validate()?;
        let alpha = self.params.alpha;
        if !(0.0..=1.0).contains(&alpha) {
            return Err(UndistortError::InvalidAlpha(alpha));
        }

        if image.is_empty() {
            return Ok(UndistortionResult {
                corrected: I::blank(image.width(), image.height()),
                cropped: I::blank(0, 0),
                roi: Roi::default(),
                new_camera_matrix: params.intrinsic_matrix,
            });
        }

        let size = image.size();
        let local = if size == params.image_size {
            params.clone()
        } else {
            log::warn!(
                "image is {}x{} but parameters were solved at {}x{}; rescaling intrinsics",
                size.width,
                size.height,
                params.image_size.width,
                params.image_size.height
            );
            params.rescaled_to(size)
        };

        let (k_new, roi) = optimal_new_camera_matrix(&local, alpha);
        let corrected = match UndistortMap::new(&local, &k_new) {
            Some(map) => map.remap(image),
            None => {
                log::warn!("new camera matrix is singular, output left blank");
                I::blank(size.width, size.height)
            }
        };
        let cropped = corrected.crop(roi.x, roi.y, roi.width, roi.height);
        log::debug!("undistorted {}x{}, roi {:?}", size.width, size.height, roi);

        Ok(UndistortionResult {
            corrected,
            cropped,
            roi,
            new_camera_matrix: k_new,
        })
    }
}
