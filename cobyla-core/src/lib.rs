//! cobyla-core: derivative-free constrained nonlinear optimization
//!
//! This library implements the COBYLA algorithm (Constrained Optimization
//! BY Linear Approximation): an iterative trust-region method that needs no
//! derivatives. It supports:
//!
//! - **Inequality constraints**: g(x) >= 0, boundary inclusive
//! - **Equality constraints**: h(x) == 0, lowered to opposed inequality pairs
//! - **Variable bounds**: lowered to the same inequality representation
//! - **Minimization and maximization**: one flag, internal negation
//!
//! # Algorithm
//!
//! The solver keeps a simplex of n+1 affinely independent points, builds
//! affine models of the objective and every constraint by interpolation,
//! and takes steps from a **trust-region-constrained linear subproblem**
//! with an elastic L1 infeasibility penalty. Steps are accepted by the
//! ratio of actual to predicted merit decrease; the radius shrinks when the
//! models run out of usable steps and the run stops at the final radius or
//! when all configured error thresholds are met at a feasible point.
//! Lagrange multipliers are estimated from the subproblem's dual values.
//!
//! # Example
//!
//! ```ignore
//! use cobyla_core::{Constraint, OptimizationProblem, SolverSettings, solve};
//!
//! // Nearest point to the origin on the plane x1 + 2*x2 = 3
//! let problem = OptimizationProblem::new(2, |x| x[0] * x[0] + x[1] * x[1])
//!     .with_constraint(Constraint::level(|x| x[0] + 2.0 * x[1], 3.0));
//!
//! let result = solve(&problem, &[1.0, 1.0], &SolverSettings::default())?;
//!
//! println!("Status: {}", result.status);
//! println!("Optimal value: {}", result.obj_val);
//! println!("Solution: {:?}", result.x);
//! ```
//!
//! The solver is single-threaded and carries no process-wide state;
//! independent instances may run concurrently.

#![warn(clippy::all)]

pub mod cobyla;
pub mod error;
pub mod linalg;
pub mod problem;

// Re-export main types
pub use cobyla::CobylaSolver;
pub use error::{CobylaError, CobylaResult};
pub use problem::{
    Bounds, Constraint, OptimizationProblem, OptimizationResult, SolveInfo, SolveStatus,
    SolverSettings,
};

/// Main solve entry point.
///
/// Builds a [`CobylaSolver`] for `problem` at `starting_point` and runs it
/// to termination.
pub fn solve(
    problem: &OptimizationProblem<'_>,
    starting_point: &[f64],
    settings: &SolverSettings,
) -> CobylaResult<OptimizationResult> {
    CobylaSolver::new(problem, starting_point, settings.clone())?.run()
}
