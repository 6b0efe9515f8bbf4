//! End-to-end helpers on top of the `image` crate: decode photographs,
//! calibrate from files, undistort files.

use std::path::{Path, PathBuf};

use camcal_chessboard::{
    ChessboardDetector, ChessboardDetectorParams, ChessboardSpec, ChessboardSpecError,
    CorrespondenceBuilder,
};
use camcal_core::{CalibrationParameters, GrayImage, ImageSize, RgbImage};
use camcal_solver::{CalibrationError, CalibrationReport, CalibrationSolver, SolverParams};
use camcal_undistort::{UndistortError, UndistortParams, UndistortionResult, Undistorter};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::io::PersistenceError;

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("{path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: ::image::ImageError,
    },
    #[error("{path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no calibration images given")]
    NoImages,
    #[error(transparent)]
    Spec(#[from] ChessboardSpecError),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Undistort(#[from] UndistortError),
}

/// Tunables for a calibration run, typically loaded from JSON.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrateConfig {
    pub detector: ChessboardDetectorParams,
    pub solver: SolverParams,
    pub undistort: UndistortParams,
}

impl CalibrateConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| PipelineError::Config {
            path: path.to_path_buf(),
            source,
        })
    }
}

pub fn rgb_from_image(img: &::image::RgbImage) -> RgbImage {
    RgbImage {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw().clone(),
    }
}

pub fn rgb_to_image(img: RgbImage) -> Option<::image::RgbImage> {
    ::image::RgbImage::from_raw(img.width as u32, img.height as u32, img.data)
}

pub fn gray_from_image(img: &::image::GrayImage) -> GrayImage {
    GrayImage {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw().clone(),
    }
}

/// Decode any supported format into RGB8.
pub fn load_rgb(path: &Path) -> Result<RgbImage, PipelineError> {
    let img = ::image::open(path).map_err(|source| PipelineError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(rgb_from_image(&img.to_rgb8()))
}

/// Decode and convert to gray with BT.601 weights.
pub fn load_gray(path: &Path) -> Result<GrayImage, PipelineError> {
    Ok(load_rgb(path)?.to_gray())
}

pub fn save_rgb(path: &Path, img: RgbImage) -> Result<(), PipelineError> {
    let (w, h) = (img.width, img.height);
    let Some(buf) = rgb_to_image(img) else {
        return Err(PipelineError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("buffer does not match {w}x{h}"),
            ),
        });
    };
    buf.save(path).map_err(|source| PipelineError::Image {
        path: path.to_path_buf(),
        source,
    })
}

/// Detect the board in every readable image and solve the camera.
///
/// Unreadable files are logged and skipped like images without a board.
#[cfg_attr(feature = "tracing", instrument(level = "info", skip_all, fields(images = paths.len())))]
pub fn calibrate_files(
    paths: &[PathBuf],
    spec: ChessboardSpec,
    config: &CalibrateConfig,
) -> Result<CalibrationReport, PipelineError> {
    if paths.is_empty() {
        return Err(PipelineError::NoImages);
    }
    let detector = ChessboardDetector::new(spec, config.detector.clone());
    let mut builder = CorrespondenceBuilder::new(&detector);
    for path in paths {
        match load_gray(path) {
            Ok(img) => {
                if !builder.add(&img.view()) {
                    log::debug!("{} contributed no corners", path.display());
                }
            }
            Err(e) => {
                log::warn!("skipping unreadable image: {e}");
                builder.skip();
            }
        }
    }
    let set = builder.finish();
    let Some(size) = set.image_size else {
        return Err(CalibrationError::InsufficientData { views: 0 }.into());
    };
    log::info!(
        "{} of {} images contribute {} points",
        set.len(),
        paths.len(),
        set.point_count()
    );
    Ok(CalibrationSolver::new(config.solver.clone()).solve(&set, size)?)
}

/// Undistort one photograph with saved parameters.
///
/// The parameters describe images of `calibration_size`; without one, the
/// size recorded in `params_dir/report.json` is used, and failing that the
/// photo's own size. A photo of a different resolution than the calibration
/// is corrected with proportionally rescaled intrinsics.
pub fn undistort_file(
    input: &Path,
    params_dir: &Path,
    calibration_size: Option<ImageSize>,
    undistort: &UndistortParams,
) -> Result<UndistortionResult<RgbImage>, PipelineError> {
    let img = load_rgb(input)?;
    let photo_size = ImageSize::new(img.width, img.height);
    let size = match calibration_size {
        Some(size) => size,
        None => crate::io::load_calibration_size(params_dir)?.unwrap_or_else(|| {
            log::warn!(
                "no calibration size given and no {} in {}, assuming {}x{}",
                crate::io::REPORT_FILE,
                params_dir.display(),
                photo_size.width,
                photo_size.height
            );
            photo_size
        }),
    };
    let params: CalibrationParameters = crate::io::load_parameters(params_dir, size)?;
    Ok(Undistorter::with_params(undistort.clone()).correct(&img, &params)?)
}
