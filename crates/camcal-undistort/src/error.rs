use camcal_core::CameraModelError;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum UndistortError {
    #[error("invalid calibration parameters: {0}")]
    InvalidParameters(#[from] CameraModelError),
    #[error("free scaling parameter must be in [0, 1], got {0}")]
    InvalidAlpha(f64),
}
