//! Problem data structures and validation.
//!
//! This module defines the optimization problem representation consumed by
//! the solver and all associated configuration/result types.

use std::fmt;

use crate::error::{CobylaError, CobylaResult};

/// Error type produced by user-supplied evaluators.
pub type EvalError = Box<dyn std::error::Error + Send + Sync>;

/// A user-supplied evaluator: maps a point to a scalar, or fails.
///
/// Evaluators must be deterministic and side-effect-free; the solver may
/// re-evaluate the same point. Failures propagate out of `run()` unmodified.
pub type EvalFn<'a> = Box<dyn Fn(&[f64]) -> Result<f64, EvalError> + 'a>;

/// Constraint definition.
///
/// Feasibility convention: `Ineq(g)` is satisfied when `g(x) >= 0`
/// (boundary inclusive), `Eq(h)` when `h(x) = 0` within the configured
/// constraint tolerance.
pub enum Constraint<'a> {
    /// Equality constraint: h(x) == 0
    Eq(EvalFn<'a>),
    /// Inequality constraint: g(x) >= 0
    Ineq(EvalFn<'a>),
}

impl<'a> Constraint<'a> {
    /// Equality constraint from an infallible closure.
    pub fn eq(h: impl Fn(&[f64]) -> f64 + 'a) -> Self {
        Constraint::Eq(Box::new(move |x| Ok(h(x))))
    }

    /// Inequality constraint `g(x) >= 0` from an infallible closure.
    pub fn ineq(g: impl Fn(&[f64]) -> f64 + 'a) -> Self {
        Constraint::Ineq(Box::new(move |x| Ok(g(x))))
    }

    /// Level constraint: `f(x) == value`.
    ///
    /// This is the nearest-point formulation: the caller supplies a level
    /// function and the target level, and the solver treats it as the
    /// equality `f(x) - value = 0`.
    pub fn level(f: impl Fn(&[f64]) -> f64 + 'a, value: f64) -> Self {
        Constraint::Eq(Box::new(move |x| Ok(f(x) - value)))
    }
}

/// Variable bounds, one entry per coordinate.
///
/// `f64::NEG_INFINITY` / `f64::INFINITY` denote "no bound" on that side.
/// Zero-width bounds (`lower[i] == upper[i]`) are permitted and freeze the
/// coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    /// Lower bounds (length n)
    pub lower: Vec<f64>,
    /// Upper bounds (length n)
    pub upper: Vec<f64>,
}

/// Optimization problem descriptor.
///
/// Bundles the objective, the constraint set, optional variable bounds and
/// the minimize/maximize flag. The descriptor is read-only to the solver.
///
/// Maximization is handled by negating the objective internally; the solver
/// itself always minimizes, and reported objective values are restored to
/// the caller's orientation.
pub struct OptimizationProblem<'a> {
    objective: EvalFn<'a>,
    constraints: Vec<Constraint<'a>>,
    bounds: Option<Bounds>,
    minimization: bool,
    dimension: usize,
}

impl<'a> OptimizationProblem<'a> {
    /// Create a minimization problem from an infallible objective.
    pub fn new(dimension: usize, objective: impl Fn(&[f64]) -> f64 + 'a) -> Self {
        Self::new_fallible(dimension, move |x| Ok(objective(x)))
    }

    /// Create a minimization problem from a fallible objective.
    ///
    /// Evaluator failures are never swallowed or retried: they abort the
    /// run and propagate to the caller.
    pub fn new_fallible(
        dimension: usize,
        objective: impl Fn(&[f64]) -> Result<f64, EvalError> + 'a,
    ) -> Self {
        Self {
            objective: Box::new(objective),
            constraints: Vec::new(),
            bounds: None,
            minimization: true,
            dimension,
        }
    }

    /// Append a constraint.
    pub fn with_constraint(mut self, constraint: Constraint<'a>) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Attach variable bounds.
    ///
    /// Fails with `DimensionMismatch` if either vector disagrees with the
    /// problem dimension, and with `InvalidProblem` if a lower bound exceeds
    /// its upper bound.
    pub fn with_bounds(mut self, lower: Vec<f64>, upper: Vec<f64>) -> CobylaResult<Self> {
        if lower.len() != self.dimension || upper.len() != self.dimension {
            return Err(CobylaError::DimensionMismatch(format!(
                "bounds have lengths {}/{}, expected {}",
                lower.len(),
                upper.len(),
                self.dimension
            )));
        }
        for i in 0..self.dimension {
            if lower[i] > upper[i] {
                return Err(CobylaError::InvalidProblem(format!(
                    "coordinate {} has lower bound {} > upper bound {}",
                    i, lower[i], upper[i]
                )));
            }
        }
        self.bounds = Some(Bounds { lower, upper });
        Ok(self)
    }

    /// Flip the problem to maximization.
    pub fn maximize(mut self) -> Self {
        self.minimization = false;
        self
    }

    /// Number of variables.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of user constraints (before lowering).
    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// Whether the problem minimizes (true) or maximizes (false).
    pub fn is_minimization(&self) -> bool {
        self.minimization
    }

    /// Variable bounds, if any.
    pub fn bounds(&self) -> Option<&Bounds> {
        self.bounds.as_ref()
    }

    /// Evaluate the raw objective (caller orientation, no negation).
    pub(crate) fn eval_objective_raw(&self, x: &[f64]) -> CobylaResult<f64> {
        (self.objective)(x).map_err(CobylaError::from)
    }

    /// Number of lowered inequality rows.
    ///
    /// Every equality contributes an opposed pair, every finite bound one
    /// row; see [`OptimizationProblem::eval_lowered`] for the layout.
    pub(crate) fn lowered_len(&self) -> usize {
        let mut m = 0;
        for c in &self.constraints {
            m += match c {
                Constraint::Eq(_) => 2,
                Constraint::Ineq(_) => 1,
            };
        }
        if let Some(b) = &self.bounds {
            m += b.lower.iter().filter(|l| l.is_finite()).count();
            m += b.upper.iter().filter(|u| u.is_finite()).count();
        }
        m
    }

    /// Evaluate all lowered inequality rows at `x`.
    ///
    /// Layout: user constraints in declaration order, each `Eq(h)` as the
    /// adjacent pair `h(x)`, `-h(x)`, each `Ineq(g)` as `g(x)`; then
    /// `x[i] - lower[i]` for every finite lower bound by coordinate; then
    /// `upper[i] - x[i]` for every finite upper bound. A row value >= 0
    /// means the row is satisfied. Each user function is evaluated exactly
    /// once per point.
    pub(crate) fn eval_lowered(&self, x: &[f64]) -> CobylaResult<Vec<f64>> {
        let mut out = Vec::with_capacity(self.lowered_len());
        for c in &self.constraints {
            match c {
                Constraint::Eq(h) => {
                    let v = h(x).map_err(CobylaError::from)?;
                    out.push(v);
                    out.push(-v);
                }
                Constraint::Ineq(g) => {
                    out.push(g(x).map_err(CobylaError::from)?);
                }
            }
        }
        if let Some(b) = &self.bounds {
            for (i, &l) in b.lower.iter().enumerate() {
                if l.is_finite() {
                    out.push(x[i] - l);
                }
            }
            for (i, &u) in b.upper.iter().enumerate() {
                if u.is_finite() {
                    out.push(u - x[i]);
                }
            }
        }
        Ok(out)
    }
}

/// Solver settings and tolerances.
///
/// One unified configuration struct; every field has a validated default.
#[derive(Debug, Clone)]
pub struct SolverSettings {
    /// Initial trust-region radius. `None` derives `max(1.0, 0.1 * |x0|_inf)`
    /// from the starting-point scale at `run()` time.
    pub rhobeg: Option<f64>,

    /// Final trust-region radius; must satisfy `0 < rhoend <= rhobeg`.
    pub rhoend: f64,

    /// Maximum number of outer iterations.
    pub max_iter: usize,

    /// Stop when `|f(x_{k+1}) - f(x_k)|` falls below this threshold.
    pub max_absolute_error: f64,

    /// Stop when the relative objective change falls below this threshold.
    pub max_relative_error: f64,

    /// Stop when the step norm `|x_{k+1} - x_k|_2` falls below this threshold.
    pub max_residual_error: f64,

    /// Feasibility tolerance: a point is feasible when every lowered
    /// constraint value is >= -tolerance. A value of exactly 0 is feasible.
    pub max_constraint_error: f64,

    /// Enable the per-iteration log on stderr.
    pub verbose: bool,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            rhobeg: None,
            rhoend: 1e-7,
            max_iter: 100,
            max_absolute_error: 1e-5,
            max_relative_error: 1e-5,
            max_residual_error: 1e-5,
            max_constraint_error: 1e-5,
            verbose: false,
        }
    }
}

impl SolverSettings {
    /// Validate the settings against the radius actually used at run time.
    pub(crate) fn validate(&self, rhobeg: f64) -> CobylaResult<()> {
        if !(rhobeg.is_finite() && rhobeg > 0.0) {
            return Err(CobylaError::InvalidSettings(format!(
                "rhobeg must be finite and positive, got {rhobeg}"
            )));
        }
        if !(self.rhoend.is_finite() && self.rhoend > 0.0) {
            return Err(CobylaError::InvalidSettings(format!(
                "rhoend must be finite and positive, got {}",
                self.rhoend
            )));
        }
        if self.rhoend > rhobeg {
            return Err(CobylaError::InvalidSettings(format!(
                "rhoend {} exceeds rhobeg {rhobeg}",
                self.rhoend
            )));
        }
        for (name, v) in [
            ("max_absolute_error", self.max_absolute_error),
            ("max_relative_error", self.max_relative_error),
            ("max_residual_error", self.max_residual_error),
            ("max_constraint_error", self.max_constraint_error),
        ] {
            if !(v.is_finite() && v >= 0.0) {
                return Err(CobylaError::InvalidSettings(format!(
                    "{name} must be finite and non-negative, got {v}"
                )));
            }
        }
        Ok(())
    }
}

/// Termination status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// Converged: error thresholds met at a feasible point, or the
    /// trust-region radius was exhausted with no further improvement.
    Converged,

    /// Iteration cap reached; the result is a valid partial answer, not an
    /// error.
    MaxIterReached,
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveStatus::Converged => write!(f, "Converged"),
            SolveStatus::MaxIterReached => write!(f, "MaxIterReached"),
        }
    }
}

/// Immutable solve result.
///
/// Constructed exactly once at termination.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Termination status
    pub status: SolveStatus,

    /// Optimal point (length n)
    pub x: Vec<f64>,

    /// Objective value at `x`, in the caller's orientation
    pub obj_val: f64,

    /// Lowered constraint values at `x` (same layout as the lowering:
    /// user constraints in order with equality pairs adjacent, then finite
    /// lower bounds by coordinate, then finite upper bounds)
    pub constraints: Vec<f64>,

    /// Lagrange multiplier estimates, one per lowered constraint row,
    /// taken from the final linear subproblem's dual values
    pub multipliers: Vec<f64>,

    /// Detailed solve information and diagnostics
    pub info: SolveInfo,
}

/// Detailed solve information and diagnostics.
#[derive(Debug, Clone)]
pub struct SolveInfo {
    /// Number of outer iterations completed
    pub iters: usize,

    /// Number of objective/constraint evaluations
    pub evals: usize,

    /// Total solve time (milliseconds)
    pub solve_time_ms: u64,

    /// Final `|f(x_{k+1}) - f(x_k)|` over the last incumbent move
    /// (infinity if the incumbent never moved)
    pub absolute_error: f64,

    /// Final relative objective change over the last incumbent move
    pub relative_error: f64,

    /// Final step norm over the last incumbent move
    pub residual_error: f64,

    /// Worst lowered-constraint violation at the final point (0 if feasible)
    pub constraint_error: f64,

    /// Trust-region radius at termination
    pub rho_final: f64,
}
