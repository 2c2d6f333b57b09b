//! COBYLA iteration driver.
//!
//! Implements the linear-approximation trust-region loop: interpolate
//! affine models through the simplex, solve the trust-region LP for a
//! trial step, accept or reject by merit ratio, shrink the radius when the
//! model runs out of usable steps, and stop on error thresholds or radius
//! exhaustion.

use std::time::Instant;

use log::debug;
use nalgebra::DVector;

use crate::error::{CobylaError, CobylaResult};
use crate::linalg::lp::solve_trust_region_lp;
use crate::problem::{
    OptimizationProblem, OptimizationResult, SolveInfo, SolveStatus, SolverSettings,
};

mod model;
mod simplex;
mod termination;

use simplex::Simplex;
use termination::ErrorMeasures;

/// Merit-ratio threshold for accepting a trial point as the new incumbent.
/// Actual improvement must be non-trivially positive, not merely
/// non-negative, to guard against cycling.
const RATIO_ACCEPT: f64 = 0.1;

/// Trust-region reduction factor when no acceptable step exists.
const RHO_SHRINK: f64 = 0.5;

/// Initial constraint-penalty weight.
const MU_INIT: f64 = 1.0;

/// Penalty-weight ceiling.
const MU_MAX: f64 = 1e12;

/// A subproblem dual this close to the penalty weight means the weight is
/// capping the multipliers; double and re-solve.
const MU_PRESSURE: f64 = 0.9;

/// Counts evaluations and applies the minimize/maximize orientation.
struct Evaluator<'s, 'a> {
    problem: &'s OptimizationProblem<'a>,
    sign: f64,
    evals: usize,
}

impl Evaluator<'_, '_> {
    fn eval(&mut self, x: &DVector<f64>) -> CobylaResult<(f64, DVector<f64>)> {
        self.evals += 1;
        let raw = self.problem.eval_objective_raw(x.as_slice())?;
        let lowered = self.problem.eval_lowered(x.as_slice())?;
        Ok((self.sign * raw, DVector::from_vec(lowered)))
    }
}

/// The COBYLA solver.
///
/// Owns its configuration and scratch state; the problem is read-only.
/// `run()` is deterministic and restarts from the configured starting
/// point, so repeated calls on an unchanged solver return identical
/// results. Independent solvers may run concurrently on separate threads.
pub struct CobylaSolver<'s, 'a> {
    problem: &'s OptimizationProblem<'a>,
    x0: DVector<f64>,
    settings: SolverSettings,
    rhobeg: f64,
}

impl<'s, 'a> CobylaSolver<'s, 'a> {
    /// Create a solver for `problem` starting at `starting_point`.
    ///
    /// Fails with `DimensionMismatch` if the starting point disagrees with
    /// the problem dimension, and with `InvalidSettings` on inconsistent
    /// radii or negative tolerances.
    pub fn new(
        problem: &'s OptimizationProblem<'a>,
        starting_point: &[f64],
        settings: SolverSettings,
    ) -> CobylaResult<Self> {
        if problem.dimension() == 0 {
            return Err(CobylaError::InvalidProblem(
                "problem dimension must be at least 1".to_string(),
            ));
        }
        if starting_point.len() != problem.dimension() {
            return Err(CobylaError::DimensionMismatch(format!(
                "starting point has length {}, expected {}",
                starting_point.len(),
                problem.dimension()
            )));
        }
        let x0 = DVector::from_column_slice(starting_point);
        let rhobeg = settings.rhobeg.unwrap_or_else(|| (0.1 * x0.amax()).max(1.0));
        settings.validate(rhobeg)?;
        Ok(Self {
            problem,
            x0,
            settings,
            rhobeg,
        })
    }

    /// Run the optimization to termination.
    ///
    /// Convergence and the iteration cap both yield a complete result
    /// (distinguished by [`SolveStatus`]); fatal numerical failures and
    /// evaluator errors yield `Err` and no partial result.
    pub fn run(&mut self) -> CobylaResult<OptimizationResult> {
        let start_time = Instant::now();
        let m = self.problem.lowered_len();
        let sign = if self.problem.is_minimization() {
            1.0
        } else {
            -1.0
        };
        let mut ev = Evaluator {
            problem: self.problem,
            sign,
            evals: 0,
        };

        let mut rho = self.rhobeg;
        let (f0, c0) = ev.eval(&self.x0)?;
        let mut simplex = Simplex::init(self.x0.clone(), f0, c0, rho, &mut |x| ev.eval(x))?;

        let mut mu = MU_INIT;
        let mut errors = ErrorMeasures::new();
        let mut multipliers = DVector::<f64>::zeros(m);
        let mut rebuilt_after_degeneracy = false;
        let mut iters = 0usize;

        let status = loop {
            if iters >= self.settings.max_iter {
                break SolveStatus::MaxIterReached;
            }
            iters += 1;

            let best = simplex.best_index(mu);
            let model = match model::build(&simplex, best) {
                Ok(mdl) => {
                    rebuilt_after_degeneracy = false;
                    mdl
                }
                Err(CobylaError::DegenerateSimplex) => {
                    if rebuilt_after_degeneracy {
                        return Err(CobylaError::SolverFailure(
                            "simplex degenerate again after rebuild".to_string(),
                        ));
                    }
                    simplex.rebuild(best, rho, &mut |x| ev.eval(x))?;
                    rebuilt_after_degeneracy = true;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let xb = simplex.points[best].clone();
            let fb = simplex.f[best];
            let cb = simplex.con[best].clone();

            // Trial step, with the penalty weight raised until it stops
            // capping the subproblem duals.
            let mut step = solve_trust_region_lp(&model.g, &model.a, &cb, rho, mu)?;
            while step.max_dual >= MU_PRESSURE * mu && mu < MU_MAX {
                mu *= 2.0;
                step = solve_trust_region_lp(&model.g, &model.a, &cb, rho, mu)?;
            }
            multipliers.copy_from(&step.duals);

            let c_pred = &cb + &model.a * &step.d;
            let pred = -model.g.dot(&step.d)
                + mu * (simplex::l1_violation(&cb) - simplex::l1_violation(&c_pred));

            if self.settings.verbose {
                eprintln!(
                    "cobyla: iter {iters:4}  rho {rho:10.3e}  f {:14.6e}  viol {:10.3e}  mu {mu:9.2e}",
                    sign * fb,
                    simplex::max_violation(&cb),
                );
            }

            if pred <= 0.0 {
                // The model finds no usable step at this radius.
                if rho <= self.settings.rhoend {
                    break SolveStatus::Converged;
                }
                rho = (rho * RHO_SHRINK).max(self.settings.rhoend);
                simplex.rebuild(best, rho, &mut |x| ev.eval(x))?;
                continue;
            }

            let xt = &xb + &step.d;
            let (ft, ct) = ev.eval(&xt)?;
            let merit_b = fb + mu * simplex::l1_violation(&cb);
            let merit_t = ft + mu * simplex::l1_violation(&ct);
            let actual = merit_b - merit_t;
            let ratio = actual / pred;
            let worst = simplex.worst_index(mu, best);

            if ratio >= RATIO_ACCEPT {
                // New incumbent; the worst vertex makes room.
                let viol_t = simplex::max_violation(&ct);
                simplex.replace(worst, xt.clone(), ft, ct);
                errors.record_move(fb, ft, &xb, &xt, viol_t);
                debug!(
                    "accepted step |d|={:.3e} ratio={ratio:.3} at rho={rho:.3e}",
                    step.d.amax()
                );
                if errors.thresholds_met(&self.settings) {
                    break SolveStatus::Converged;
                }
            } else if merit_t < simplex.merit(worst, mu) {
                // Rejected as incumbent, but refines the simplex.
                let viol_t = simplex::max_violation(&ct);
                let improves_incumbent = merit_t < merit_b;
                simplex.replace(worst, xt.clone(), ft, ct);
                if improves_incumbent {
                    errors.record_move(fb, ft, &xb, &xt, viol_t);
                    if errors.thresholds_met(&self.settings) {
                        break SolveStatus::Converged;
                    }
                }
            } else {
                // No acceptable trial at this radius.
                if rho <= self.settings.rhoend {
                    break SolveStatus::Converged;
                }
                rho = (rho * RHO_SHRINK).max(self.settings.rhoend);
                let keep = simplex.best_index(mu);
                simplex.rebuild(keep, rho, &mut |x| ev.eval(x))?;
            }
        };

        let best = simplex.best_index(mu);
        let constraint_error = simplex::max_violation(&simplex.con[best]);
        Ok(OptimizationResult {
            status,
            x: simplex.points[best].iter().copied().collect(),
            obj_val: sign * simplex.f[best],
            constraints: simplex.con[best].iter().copied().collect(),
            multipliers: multipliers.iter().copied().collect(),
            info: SolveInfo {
                iters,
                evals: ev.evals,
                solve_time_ms: start_time.elapsed().as_millis() as u64,
                absolute_error: errors.absolute,
                relative_error: errors.relative,
                residual_error: errors.residual,
                constraint_error,
                rho_final: rho,
            },
        })
    }
}
