//! Error types for the COBYLA solver.

use thiserror::Error;

/// Errors that can occur while building or running the solver.
#[derive(Error, Debug)]
pub enum CobylaError {
    /// Input dimensions disagree (starting point, bounds, ...)
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Problem validation failed
    #[error("Invalid problem: {0}")]
    InvalidProblem(String),

    /// Solver settings validation failed
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// The interpolation simplex lost affine independence
    #[error("Degenerate simplex: interpolation system is numerically singular")]
    DegenerateSimplex,

    /// Fatal numerical failure in the iteration
    #[error("Solver failure: {0}")]
    SolverFailure(String),

    /// An objective or constraint evaluation failed; propagated unmodified
    #[error("Evaluation failed: {0}")]
    Evaluation(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Result type for solver operations.
pub type CobylaResult<T> = Result<T, CobylaError>;
