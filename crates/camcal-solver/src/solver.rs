use camcal_core::{
    CalibrationParameters, Correspondence, CorrespondenceSet, DistortionCoefficients, ImageSize,
};
use nalgebra::{Isometry3, Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{CalibrationError, SolveFailure};
use crate::init::{board_homography, focal_from_homographies, image_centre, planar_pose};
use crate::model::{
    isometry_to_pose, pose_to_isometry, view_residuals, Intrinsics, Pose, CX, CY, FX, FY, K1,
};
use crate::params::SolverParams;
use crate::refine::{refine, View};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Plausible focal lengths, as multiples of the larger image side.
const MIN_FOCAL_RATIO: f64 = 0.05;
const MAX_FOCAL_RATIO: f64 = 100.0;

/// Board pose for one calibration view, `p_cam = R(rvec) * p_board + tvec`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewPose {
    pub source_index: usize,
    /// Axis-angle rotation (radians).
    pub rvec: Vector3<f64>,
    pub tvec: Vector3<f64>,
}

impl ViewPose {
    pub fn isometry(&self) -> Isometry3<f64> {
        pose_to_isometry(&[
            self.rvec.x,
            self.rvec.y,
            self.rvec.z,
            self.tvec.x,
            self.tvec.y,
            self.tvec.z,
        ])
    }
}

/// Solved parameters plus reprojection diagnostics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub parameters: CalibrationParameters,
    /// `sqrt(Σ |e|² / N)` over all points, in pixels.
    pub rms_error: f64,
    /// Mean per-point Euclidean reprojection error, in pixels.
    pub mean_error: f64,
    /// Mean Euclidean error of each view, in input order.
    pub per_view_errors: Vec<f64>,
    pub extrinsics: Vec<ViewPose>,
    pub iterations: usize,
    /// `½ Σ |e|²` at the solution.
    pub final_cost: f64,
}

/// Intrinsic calibration from planar chessboard correspondences.
#[derive(Clone, Debug, Default)]
pub struct CalibrationSolver {
    params: SolverParams,
}

impl CalibrationSolver {
    pub fn new(params: SolverParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &SolverParams {
        &self.params
    }

    /// Solve and return only the camera parameters.
    pub fn solve_parameters(
        &self,
        set: &CorrespondenceSet,
        image_size: ImageSize,
    ) -> Result<CalibrationParameters, CalibrationError> {
        self.solve(set, image_size).map(|r| r.parameters)
    }

    /// Solve intrinsics, five distortion coefficients `[k1, k2, p1, p2, k3]`
    /// and per-view poses by minimising total reprojection error.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(views = set.len()))
    )]
    pub fn solve(
        &self,
        set: &CorrespondenceSet,
        image_size: ImageSize,
    ) -> Result<CalibrationReport, CalibrationError> {
        let views = set.len();
        if views == 0 || set.iter().any(|c| c.len() < 4) {
            return Err(CalibrationError::InsufficientData { views });
        }
        if image_size.width == 0 || image_size.height == 0 {
            return Err(SolveFailure::Degenerate("empty image size".into()).into());
        }
        if set
            .iter()
            .flat_map(Correspondence::object_points)
            .any(|p| p.z.abs() > 1e-9)
        {
            return Err(SolveFailure::Degenerate("object points must lie on z = 0".into()).into());
        }

        let (intr0, poses0) = self.initial_guess(set, image_size)?;
        log::debug!(
            "initial fx {:.2}, fy {:.2}, cx {:.2}, cy {:.2}",
            intr0[FX],
            intr0[FY],
            intr0[CX],
            intr0[CY]
        );

        let view_refs: Vec<View<'_>> = set
            .iter()
            .map(|c| View {
                object: c.object_points(),
                image: c.image_points(),
            })
            .collect();
        let refined = refine(&view_refs, intr0, poses0, &self.params)?;

        let intr = refined.intrinsics;
        if !intr.iter().all(|v| v.is_finite()) {
            return Err(SolveFailure::NonFinite.into());
        }
        let extent = image_size.width.max(image_size.height) as f64;
        let focal_range = MIN_FOCAL_RATIO * extent..=MAX_FOCAL_RATIO * extent;
        if !focal_range.contains(&intr[FX]) || !focal_range.contains(&intr[FY]) {
            return Err(SolveFailure::Degenerate(format!(
                "focal length ({:.3e}, {:.3e}) outside {:.1}..={:.1} px",
                intr[FX],
                intr[FY],
                focal_range.start(),
                focal_range.end()
            ))
            .into());
        }

        let k = Matrix3::new(
            intr[FX], 0.0, intr[CX], //
            0.0, intr[FY], intr[CY], //
            0.0, 0.0, 1.0,
        );
        let dist = DistortionCoefficients::new(&intr[K1..])
            .map_err(|e| SolveFailure::Degenerate(e.to_string()))?;
        let parameters = CalibrationParameters::new(k, dist, image_size)
            .map_err(|e| SolveFailure::Degenerate(e.to_string()))?;

        let mut report = build_report(set, parameters, &intr, &refined.poses);
        report.iterations = refined.iterations;
        report.final_cost = refined.cost;
        log::info!(
            "calibrated from {} views in {} iterations: rms {:.4} px, mean {:.4} px",
            views,
            report.iterations,
            report.rms_error,
            report.mean_error
        );
        Ok(report)
    }

    fn initial_guess(
        &self,
        set: &CorrespondenceSet,
        image_size: ImageSize,
    ) -> Result<(Intrinsics, Vec<Pose>), CalibrationError> {
        let homographies = set
            .iter()
            .map(|c| board_homography(c.object_points(), c.image_points()))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| SolveFailure::Degenerate("board homography".into()))?;

        let (cx, cy) = image_centre(image_size);
        let (fx, fy) = focal_from_homographies(&homographies, image_size).ok_or_else(|| {
            SolveFailure::Degenerate(
                "views do not constrain the focal length (fronto-parallel or too few)".into(),
            )
        })?;
        let k = Matrix3::new(fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0);

        let poses = homographies
            .iter()
            .map(|h| planar_pose(&k, h).map(|iso| isometry_to_pose(&iso)))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| SolveFailure::Degenerate("pose from homography".into()))?;

        let mut intr: Intrinsics = [0.0; 9];
        intr[FX] = fx;
        intr[FY] = fy;
        intr[CX] = cx;
        intr[CY] = cy;
        Ok((intr, poses))
    }
}

fn build_report(
    set: &CorrespondenceSet,
    parameters: CalibrationParameters,
    intr: &Intrinsics,
    poses: &[Pose],
) -> CalibrationReport {
    let mut per_view_errors = Vec::with_capacity(set.len());
    let mut extrinsics = Vec::with_capacity(set.len());
    let (mut sq_sum, mut abs_sum, mut count) = (0.0, 0.0, 0usize);
    let mut buf = Vec::new();

    for (c, pose) in set.iter().zip(poses) {
        buf.resize(2 * c.len(), 0.0);
        view_residuals(intr, pose, c.object_points(), c.image_points(), &mut buf);
        let mut view_sum = 0.0;
        for r in buf.chunks_exact(2) {
            let sq = r[0] * r[0] + r[1] * r[1];
            sq_sum += sq;
            view_sum += sq.sqrt();
        }
        abs_sum += view_sum;
        count += c.len();
        per_view_errors.push(view_sum / c.len() as f64);
        extrinsics.push(ViewPose {
            source_index: c.source_index,
            rvec: Vector3::new(pose[0], pose[1], pose[2]),
            tvec: Vector3::new(pose[3], pose[4], pose[5]),
        });
    }

    let n = count.max(1) as f64;
    CalibrationReport {
        parameters,
        rms_error: (sq_sum / n).sqrt(),
        mean_error: abs_sum / n,
        per_view_errors,
        extrinsics,
        iterations: 0,
        final_cost: 0.5 * sq_sum,
    }
}
