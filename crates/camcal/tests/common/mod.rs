#![allow(dead_code)]

use std::path::{Path, PathBuf};

use camcal::chessboard::synthetic::{calibration_poses, render_chessboard};
use camcal::{CalibrationParameters, ChessboardSpec, DistortionCoefficients, ImageSize};
use nalgebra::Matrix3;

pub fn camera() -> CalibrationParameters {
    CalibrationParameters::new(
        Matrix3::new(600.0, 0.0, 322.0, 0.0, 598.0, 238.0, 0.0, 0.0, 1.0),
        DistortionCoefficients::five(-0.1, 0.02, 0.0, 0.0, 0.0),
        ImageSize::new(640, 480),
    )
    .expect("valid camera")
}

pub fn spec() -> ChessboardSpec {
    ChessboardSpec::new(9, 6).expect("9x6 board")
}

/// Render the standard pose spread into `dir` as PNG files.
pub fn write_board_images(dir: &Path) -> Vec<PathBuf> {
    let cam = camera();
    let spec = spec();
    calibration_poses(&spec, 15.0)
        .iter()
        .enumerate()
        .map(|(i, pose)| {
            let img = render_chessboard(&spec, &cam, pose, 3);
            let buf = image::GrayImage::from_raw(img.width as u32, img.height as u32, img.data)
                .expect("buffer size");
            let path = dir.join(format!("view_{i:02}.png"));
            buf.save(&path).expect("write png");
            path
        })
        .collect()
}
