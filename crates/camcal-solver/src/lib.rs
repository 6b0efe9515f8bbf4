//! Pinhole camera calibration from planar chessboard views.
//!
//! Intrinsics and `[k1, k2, p1, p2, k3]` distortion are initialised in
//! closed form from per-view plane homographies (principal point at the
//! image centre, zero distortion) and refined together with every view's
//! pose by Levenberg–Marquardt on reprojection error.

mod error;
mod init;
mod model;
mod params;
mod refine;
mod solver;

pub use error::{CalibrationError, SolveFailure};
pub use init::{board_homography, focal_from_homographies, planar_pose};
pub use params::SolverParams;
pub use solver::{CalibrationReport, CalibrationSolver, ViewPose};
