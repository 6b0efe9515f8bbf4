//! Camera calibration from chessboard photographs and lens-distortion
//! correction.
//!
//! This crate provides:
//! - re-exports of the workspace crates under short module names,
//! - [`io`]: `numpy`-compatible CSV persistence of calibration parameters,
//! - (feature `image`) [`pipeline`]: calibrate from image files and undistort
//!   image files.
//!
//! ## Quickstart
//!
//! ```no_run
//! use std::path::{Path, PathBuf};
//!
//! use camcal::chessboard::ChessboardSpec;
//! use camcal::pipeline::{calibrate_files, CalibrateConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let paths: Vec<PathBuf> = (0..15).map(|i| format!("calib/{i:02}.jpg").into()).collect();
//! let spec = ChessboardSpec::new(9, 6)?.with_square_size(0.025)?;
//! let report = calibrate_files(&paths, spec, &CalibrateConfig::default())?;
//! println!("rms reprojection error {:.3} px", report.rms_error);
//! camcal::io::save_parameters(Path::new("calib"), &report.parameters)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `camcal::core`: image buffers, homographies, camera model.
//! - `camcal::chessboard`: corner detection and correspondence accumulation.
//! - `camcal::solver`: intrinsic calibration.
//! - `camcal::undistort`: undistortion and validity cropping.

pub use camcal_chessboard as chessboard;
pub use camcal_core as core;
pub use camcal_solver as solver;
pub use camcal_undistort as undistort;

pub use camcal_chessboard::{ChessboardDetector, ChessboardDetectorParams, ChessboardSpec};
pub use camcal_core::{CalibrationParameters, DistortionCoefficients, GrayImage, ImageSize, RgbImage};
pub use camcal_solver::{CalibrationReport, CalibrationSolver, SolverParams};
pub use camcal_undistort::{UndistortionResult, Undistorter};

pub mod io;

#[cfg(feature = "image")]
pub mod pipeline;
