//! Levenberg–Marquardt refinement of intrinsics, distortion and per-view
//! poses on total reprojection error.
//!
//! The unknowns are packed as `[active intrinsics | pose_0 | … | pose_N-1]`
//! and handed to the `levenberg_marquardt` solver. The Jacobian is block
//! sparse: the residuals of view `i` depend only on the shared intrinsics and
//! the six pose parameters of view `i`. Blocks are evaluated by central
//! differences into a dense matrix, which stays small (`2M × (9 + 6N)`).

use std::cell::Cell;
use std::time::{Duration, Instant};

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn, Point2, Point3};

use crate::error::SolveFailure;
use crate::model::{view_residuals, Intrinsics, Pose, CX, CY, K3, N_INTRINSICS, N_POSE, P1, P2};
use crate::params::SolverParams;

/// Smallest eigenvalue of the normalised intrinsic Schur complement below
/// which the intrinsics count as unobservable.
const MIN_OBSERVABILITY: f64 = 1e-12;

pub(crate) struct View<'a> {
    pub object: &'a [Point3<f64>],
    pub image: &'a [Point2<f64>],
}

#[derive(Debug, Clone)]
pub(crate) struct Refined {
    pub intrinsics: Intrinsics,
    pub poses: Vec<Pose>,
    pub iterations: usize,
    pub cost: f64,
}

/// Indices of intrinsic parameters that are optimised.
pub(crate) fn active_intrinsics(params: &SolverParams) -> Vec<usize> {
    (0..N_INTRINSICS)
        .filter(|&i| !(params.fix_k3 && i == K3))
        .filter(|&i| !(params.zero_tangent_dist && (i == P1 || i == P2)))
        .filter(|&i| !(params.fix_principal_point && (i == CX || i == CY)))
        .collect()
}

#[inline]
fn fd_step(x: f64) -> f64 {
    1e-6 * (1.0 + x.abs())
}

fn pack(intr: &Intrinsics, poses: &[Pose], active: &[usize]) -> DVector<f64> {
    let values = active
        .iter()
        .map(|&i| intr[i])
        .chain(poses.iter().flat_map(|p| p.iter().copied()));
    DVector::from_iterator(active.len() + N_POSE * poses.len(), values)
}

fn unpack(x: &DVector<f64>, fixed: &Intrinsics, active: &[usize]) -> (Intrinsics, Vec<Pose>) {
    let mut intr = *fixed;
    for (k, &i) in active.iter().enumerate() {
        intr[i] = x[k];
    }
    let poses = x.as_slice()[active.len()..]
        .chunks_exact(N_POSE)
        .map(|c| {
            let mut p: Pose = [0.0; N_POSE];
            p.copy_from_slice(c);
            p
        })
        .collect();
    (intr, poses)
}

fn residual_vector(views: &[View<'_>], intr: &Intrinsics, poses: &[Pose]) -> DVector<f64> {
    let m: usize = views.iter().map(|v| 2 * v.object.len()).sum();
    let mut r = DVector::<f64>::zeros(m);
    let mut row = 0;
    for (view, pose) in views.iter().zip(poses) {
        let m2 = 2 * view.object.len();
        view_residuals(
            intr,
            pose,
            view.object,
            view.image,
            &mut r.as_mut_slice()[row..row + m2],
        );
        row += m2;
    }
    r
}

/// Dense Jacobian of [`residual_vector`] with respect to the packed
/// parameters. Only the intrinsic columns and the view's own pose columns
/// are filled for each block of rows.
fn jacobian_matrix(
    views: &[View<'_>],
    intr: &Intrinsics,
    poses: &[Pose],
    active: &[usize],
) -> DMatrix<f64> {
    let na = active.len();
    let m: usize = views.iter().map(|v| 2 * v.object.len()).sum();
    let mut jac = DMatrix::<f64>::zeros(m, na + N_POSE * views.len());
    let mut plus = Vec::new();
    let mut minus = Vec::new();

    let mut row0 = 0;
    for (vi, (view, pose)) in views.iter().zip(poses).enumerate() {
        let m2 = 2 * view.object.len();
        plus.resize(m2, 0.0);
        minus.resize(m2, 0.0);

        for local in 0..na + N_POSE {
            let mut ip = *intr;
            let mut im = *intr;
            let mut pp = *pose;
            let mut pm = *pose;
            let (h, col) = if local < na {
                let k = active[local];
                let h = fd_step(intr[k]);
                ip[k] += h;
                im[k] -= h;
                (h, local)
            } else {
                let k = local - na;
                let h = fd_step(pose[k]);
                pp[k] += h;
                pm[k] -= h;
                (h, na + N_POSE * vi + k)
            };
            view_residuals(&ip, &pp, view.object, view.image, &mut plus);
            view_residuals(&im, &pm, view.object, view.image, &mut minus);
            for row in 0..m2 {
                jac[(row0 + row, col)] = (plus[row] - minus[row]) / (2.0 * h);
            }
        }
        row0 += m2;
    }
    jac
}

#[derive(Debug, Clone, Copy)]
enum Stop {
    TimedOut(Duration),
    IterationLimit,
}

/// Calibration as a least-squares problem over the packed parameters.
struct CalibrationProblem<'v, 'a> {
    views: &'v [View<'a>],
    fixed: Intrinsics,
    active: Vec<usize>,
    x: DVector<f64>,
    started: Instant,
    timeout: Option<Duration>,
    max_iterations: usize,
    /// One Jacobian per outer LM iteration.
    jacobians: Cell<usize>,
    stop: Cell<Option<Stop>>,
}

impl CalibrationProblem<'_, '_> {
    fn state(&self) -> (Intrinsics, Vec<Pose>) {
        unpack(&self.x, &self.fixed, &self.active)
    }

    /// `false` once the wall-clock budget is spent.
    fn within_budget(&self) -> bool {
        let Some(limit) = self.timeout else {
            return true;
        };
        let elapsed = self.started.elapsed();
        if elapsed > limit {
            self.stop.set(Some(Stop::TimedOut(elapsed)));
            return false;
        }
        true
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for CalibrationProblem<'_, '_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.x.clone_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.x.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        if !self.within_budget() {
            return None;
        }
        let (intr, poses) = self.state();
        Some(residual_vector(self.views, &intr, &poses))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        if !self.within_budget() {
            return None;
        }
        let n = self.jacobians.get() + 1;
        if n > self.max_iterations {
            self.stop.set(Some(Stop::IterationLimit));
            return None;
        }
        self.jacobians.set(n);
        let (intr, poses) = self.state();
        Some(jacobian_matrix(self.views, &intr, &poses, &self.active))
    }
}

/// Reject solutions whose intrinsics are not pinned down by the views.
///
/// The pose parameters are eliminated from `JᵀJ` (Schur complement), the
/// remaining intrinsic block is normalised to unit diagonal and its smallest
/// eigenvalue compared against [`MIN_OBSERVABILITY`].
fn check_observability(
    views: &[View<'_>],
    intr: &Intrinsics,
    poses: &[Pose],
    active: &[usize],
) -> Result<(), SolveFailure> {
    let na = active.len();
    if na == 0 {
        return Ok(());
    }
    let jac = jacobian_matrix(views, intr, poses, active);
    let jtj = jac.tr_mul(&jac);
    let np = jtj.ncols() - na;

    let a = jtj.view((0, 0), (na, na)).into_owned();
    let b = jtj.view((0, na), (na, np)).into_owned();
    let c = jtj.view((na, na), (np, np)).into_owned();
    let c_chol = c.cholesky().ok_or(SolveFailure::Singular)?;
    let schur = a - &b * c_chol.solve(&b.transpose());

    let d: Vec<f64> = schur.diagonal().iter().map(|v| v.max(0.0).sqrt()).collect();
    if d.iter().any(|&v| !(v > 0.0) || !v.is_finite()) {
        return Err(SolveFailure::Degenerate(
            "an intrinsic parameter has no effect on the residuals".into(),
        ));
    }
    let corr = DMatrix::from_fn(na, na, |i, j| schur[(i, j)] / (d[i] * d[j]));
    let min_eig = corr.symmetric_eigenvalues().min();
    log::debug!("intrinsic observability {min_eig:.3e}");
    if !(min_eig >= MIN_OBSERVABILITY) {
        return Err(SolveFailure::Degenerate(format!(
            "views do not constrain the intrinsics (observability {min_eig:.1e})"
        )));
    }
    Ok(())
}

pub(crate) fn refine(
    views: &[View<'_>],
    intr0: Intrinsics,
    poses0: Vec<Pose>,
    params: &SolverParams,
) -> Result<Refined, SolveFailure> {
    let active = active_intrinsics(params);
    let x0 = pack(&intr0, &poses0, &active);
    if !residual_vector(views, &intr0, &poses0)
        .iter()
        .all(|v| v.is_finite())
    {
        return Err(SolveFailure::NonFinite);
    }

    let problem = CalibrationProblem {
        views,
        fixed: intr0,
        active,
        x: x0,
        started: Instant::now(),
        timeout: params.timeout_secs.map(Duration::from_secs_f64),
        max_iterations: params.max_iterations,
        jacobians: Cell::new(0),
        stop: Cell::new(None),
    };

    let lm = LevenbergMarquardt::new()
        .with_ftol(params.cost_tolerance)
        .with_xtol(params.step_tolerance)
        .with_gtol(params.gradient_tolerance)
        .with_stepbound(params.initial_step_bound)
        .with_patience(params.max_iterations.max(1));
    let (problem, report) = lm.minimize(problem);
    let iterations = problem.jacobians.get();

    match problem.stop.get() {
        Some(Stop::TimedOut(elapsed)) => return Err(SolveFailure::TimedOut { elapsed }),
        Some(Stop::IterationLimit) => {
            return Err(SolveFailure::IterationLimit {
                iterations: params.max_iterations,
            })
        }
        None => {}
    }

    match report.termination {
        t if t.was_successful() => {
            log::debug!("lm finished after {iterations} iterations: {t:?}");
        }
        // Tolerances below machine precision: no further reduction exists.
        TerminationReason::NoImprovementPossible(what) => {
            log::debug!("lm cannot improve {what} after {iterations} iterations");
        }
        TerminationReason::LostPatience => {
            return Err(SolveFailure::IterationLimit {
                iterations: params.max_iterations,
            })
        }
        TerminationReason::Numerical(what) => {
            log::debug!("lm hit a non-finite {what}");
            return Err(SolveFailure::NonFinite);
        }
        other => return Err(SolveFailure::Degenerate(format!("{other:?}"))),
    }

    let (intrinsics, poses) = problem.state();
    if !intrinsics
        .iter()
        .chain(poses.iter().flatten())
        .all(|v| v.is_finite())
    {
        return Err(SolveFailure::NonFinite);
    }
    check_observability(views, &intrinsics, &poses, &problem.active)?;

    log::trace!(
        "lm cost {:.6e} after {} residual evaluations",
        report.objective_function,
        report.number_of_evaluations
    );
    Ok(Refined {
        intrinsics,
        poses,
        iterations,
        cost: report.objective_function,
    })
}
