use serde::{Deserialize, Serialize};

/// Calibration solver settings.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SolverParams {
    /// Levenberg–Marquardt iterations before giving up with
    /// `SolveFailure::IterationLimit`.
    pub max_iterations: usize,
    /// Converged once the relative cost decrease of a step falls below this.
    pub cost_tolerance: f64,
    /// Converged once the step is this small relative to the parameters.
    pub step_tolerance: f64,
    /// Converged once the residuals are this close to orthogonal to every
    /// Jacobian column.
    pub gradient_tolerance: f64,
    /// Initial trust-region radius, as a factor of the scaled parameter norm.
    pub initial_step_bound: f64,
    /// Keep `k3` at zero.
    pub fix_k3: bool,
    /// Keep `p1`, `p2` at zero.
    pub zero_tangent_dist: bool,
    /// Keep the principal point at the image centre.
    pub fix_principal_point: bool,
    /// Wall-clock budget in seconds.
    pub timeout_secs: Option<f64>,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            cost_tolerance: 1e-10,
            step_tolerance: 1e-10,
            gradient_tolerance: 1e-12,
            initial_step_bound: 100.0,
            fix_k3: false,
            zero_tangent_dist: false,
            fix_principal_point: false,
            timeout_secs: None,
        }
    }
}
