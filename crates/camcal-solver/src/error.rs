use std::time::Duration;

/// Why the nonlinear solve did not produce parameters.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SolveFailure {
    #[error("no convergence within {iterations} iterations")]
    IterationLimit { iterations: usize },
    #[error("timed out after {elapsed:?}")]
    TimedOut { elapsed: Duration },
    #[error("normal equations are singular")]
    Singular,
    #[error("non-finite value during optimisation")]
    NonFinite,
    #[error("degenerate configuration: {0}")]
    Degenerate(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Nothing usable to calibrate from: no views, or a view with fewer than
    /// four points.
    #[error("insufficient calibration data ({views} usable views)")]
    InsufficientData { views: usize },
    #[error("calibration solve failed: {0}")]
    SolveFailed(#[from] SolveFailure),
}
