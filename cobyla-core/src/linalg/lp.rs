//! Trust-region linear subproblem solver.
//!
//! Solves the piecewise-linear subproblem
//!
//! ```text
//! minimize    g·d + mu * sum_i max(0, -(c_i + a_i·d))
//! subject to  |d|_inf <= rho
//! ```
//!
//! posed as an exact LP with one elastic slack per constraint row and solved
//! by a dense two-phase tableau simplex method with Bland's rule. The
//! elastic L1 penalty realizes the least-violation search: with `mu` large
//! enough, violation is reduced first and ties between equally-infeasible
//! steps are broken toward larger predicted objective decrease.
//!
//! Column layout: `e` (n, the step in box units, `d = rho*(e - 1)`),
//! `s` (m, per-row violation), `r` (m, surplus), `t` (n, box slack),
//! then one artificial per row. Rows are equilibrated before pivoting so
//! tolerances act on O(1) entries, and the duals of the constraint rows are
//! read back off the artificial columns of the final tableau.

use log::trace;
use nalgebra::{DMatrix, DVector};

use crate::error::{CobylaError, CobylaResult};

/// Entering tolerance on reduced costs (entries are scaled to O(1)).
const TOL_RC: f64 = 1e-9;
/// Pivot-element tolerance in the ratio test.
const TOL_PIV: f64 = 1e-9;
/// Residual infeasibility accepted at the end of phase 1.
const TOL_PHASE1: f64 = 1e-7;

/// Solution of the trust-region subproblem.
#[derive(Debug, Clone)]
pub struct TrustRegionStep {
    /// Step in the original variable space, `|d|_inf <= rho`
    pub d: DVector<f64>,
    /// Dual values of the m linearized constraint rows (clamped to >= 0);
    /// these are the Lagrange-multiplier estimates
    pub duals: DVector<f64>,
    /// Largest dual, used by the caller to test the penalty-weight cap
    pub max_dual: f64,
}

/// Solve the trust-region LP.
///
/// `g` is the model objective gradient (length n), `a` the m x n matrix of
/// constraint gradients, `c0` the constraint values at the incumbent. The
/// subproblem is always feasible (violation is elastic), so failure here is
/// a numerical breakdown, not an infeasibility certificate.
pub fn solve_trust_region_lp(
    g: &DVector<f64>,
    a: &DMatrix<f64>,
    c0: &DVector<f64>,
    rho: f64,
    mu: f64,
) -> CobylaResult<TrustRegionStep> {
    let m = a.nrows();
    let n = a.ncols();
    debug_assert_eq!(g.len(), n);
    debug_assert_eq!(c0.len(), m);

    let n_struct = 2 * n + 2 * m;
    let n_rows = m + n;
    let rhs = n_struct + n_rows; // rhs column index
    let mut tab = DMatrix::<f64>::zeros(n_rows + 1, rhs + 1);
    let mut sigma = vec![1.0_f64; m];
    let mut flip = vec![1.0_f64; n_rows];

    // Constraint rows: (rho*a_i/sigma_i)·e + s_i - r_i = (rho*sum_j a_ij - c0_i)/sigma_i
    for i in 0..m {
        let mut row_inf = 0.0_f64;
        let mut row_sum = 0.0_f64;
        for j in 0..n {
            let v = rho * a[(i, j)];
            row_inf = row_inf.max(v.abs());
            row_sum += v;
        }
        let b_i = row_sum - c0[i];
        let scale = row_inf.max(b_i.abs());
        sigma[i] = if scale > 1e-300 { scale } else { 1.0 };
        for j in 0..n {
            tab[(i, j)] = rho * a[(i, j)] / sigma[i];
        }
        tab[(i, n + i)] = 1.0;
        tab[(i, n + m + i)] = -1.0;
        tab[(i, rhs)] = b_i / sigma[i];
    }

    // Box rows: e_j + t_j = 2
    for j in 0..n {
        let r = m + j;
        tab[(r, j)] = 1.0;
        tab[(r, n + 2 * m + j)] = 1.0;
        tab[(r, rhs)] = 2.0;
    }

    // Sign-normalize, then install the artificial basis.
    let mut basis = vec![0_usize; n_rows];
    for r in 0..n_rows {
        if tab[(r, rhs)] < 0.0 {
            flip[r] = -1.0;
            for j in 0..=rhs {
                tab[(r, j)] = -tab[(r, j)];
            }
        }
        tab[(r, n_struct + r)] = 1.0;
        basis[r] = n_struct + r;
    }

    let max_pivots = 200 * (n_struct + n_rows + 1);

    // Phase 1: minimize the artificial sum.
    let mut costs = vec![0.0_f64; n_struct + n_rows];
    for c in costs.iter_mut().skip(n_struct) {
        *c = 1.0;
    }
    reset_cost_row(&mut tab, &basis, &costs);
    pivot_to_optimality(&mut tab, &mut basis, n_struct, false, max_pivots)?;
    let phase1_obj = -tab[(n_rows, rhs)];
    if phase1_obj > TOL_PHASE1 {
        return Err(CobylaError::SolverFailure(format!(
            "trust-region subproblem lost feasibility (phase-1 residual {phase1_obj:.3e})"
        )));
    }
    drive_out_artificials(&mut tab, &mut basis, n_struct);

    // Phase 2: the real objective, scaled to O(1) reduced costs.
    let mut omega = 0.0_f64;
    for j in 0..n {
        omega = omega.max((rho * g[j]).abs());
    }
    for i in 0..m {
        omega = omega.max((mu * sigma[i]).abs());
    }
    if omega <= 1e-300 {
        omega = 1.0;
    }
    for c in costs.iter_mut() {
        *c = 0.0;
    }
    for j in 0..n {
        costs[j] = rho * g[j] / omega;
    }
    for i in 0..m {
        costs[n + i] = mu * sigma[i] / omega;
    }
    reset_cost_row(&mut tab, &basis, &costs);
    pivot_to_optimality(&mut tab, &mut basis, n_struct, true, max_pivots)?;

    // Recover the step.
    let mut e = vec![0.0_f64; n];
    for (r, &b) in basis.iter().enumerate() {
        if b < n {
            e[b] = tab[(r, rhs)];
        }
    }
    let mut d = DVector::<f64>::zeros(n);
    for j in 0..n {
        d[j] = (rho * (e[j] - 1.0)).clamp(-rho, rho);
    }

    // Duals off the artificial columns of the cost row.
    let mut duals = DVector::<f64>::zeros(m);
    let mut max_dual = 0.0_f64;
    for i in 0..m {
        let y_scaled = -tab[(n_rows, n_struct + i)];
        let y = omega * flip[i] * y_scaled / sigma[i];
        duals[i] = y.max(0.0);
        max_dual = max_dual.max(duals[i]);
    }

    trace!(
        "trust-region lp: rho={rho:.3e} mu={mu:.3e} |d|={:.3e} max_dual={max_dual:.3e}",
        d.amax()
    );

    Ok(TrustRegionStep { d, duals, max_dual })
}

/// Rebuild the reduced-cost row for the given cost vector and basis.
///
/// `rc_j = c_j - sum_i c_basis(i) * T(i,j)`; the value cell holds the
/// negated objective.
fn reset_cost_row(tab: &mut DMatrix<f64>, basis: &[usize], costs: &[f64]) {
    let n_rows = basis.len();
    let n_cols = tab.ncols();
    for j in 0..n_cols {
        let cj = if j < costs.len() { costs[j] } else { 0.0 };
        let mut rc = cj;
        for (i, &b) in basis.iter().enumerate() {
            let cb = costs[b];
            if cb != 0.0 {
                rc -= cb * tab[(i, j)];
            }
        }
        tab[(n_rows, j)] = rc;
    }
    // The rhs cell computed by the same formula is already -objective.
}

/// Bland-rule simplex iteration until no eligible reduced cost is negative.
///
/// Artificial columns (indices >= `n_struct`) are barred from entering when
/// `ban_artificials` is set (phase 2).
fn pivot_to_optimality(
    tab: &mut DMatrix<f64>,
    basis: &mut [usize],
    n_struct: usize,
    ban_artificials: bool,
    max_pivots: usize,
) -> CobylaResult<()> {
    let n_rows = basis.len();
    let rhs = tab.ncols() - 1;
    for _ in 0..max_pivots {
        // Entering column: Bland's rule, smallest eligible index.
        let mut entering = None;
        let col_limit = if ban_artificials { n_struct } else { rhs };
        for j in 0..col_limit {
            if tab[(n_rows, j)] < -TOL_RC {
                entering = Some(j);
                break;
            }
        }
        let Some(j) = entering else {
            return Ok(());
        };

        // Ratio test; ties go to the smallest basis index (anti-cycling).
        let mut leaving = None;
        let mut best_ratio = f64::INFINITY;
        for i in 0..n_rows {
            let piv = tab[(i, j)];
            if piv > TOL_PIV {
                let ratio = tab[(i, rhs)] / piv;
                let better = ratio < best_ratio - 1e-12
                    || (ratio < best_ratio + 1e-12
                        && leaving.is_some_and(|l: usize| basis[i] < basis[l]));
                if better {
                    best_ratio = ratio;
                    leaving = Some(i);
                }
            }
        }
        let Some(i) = leaving else {
            return Err(CobylaError::SolverFailure(
                "trust-region subproblem is unbounded".to_string(),
            ));
        };

        pivot(tab, i, j);
        basis[i] = j;
    }
    Err(CobylaError::SolverFailure(
        "trust-region subproblem did not terminate".to_string(),
    ))
}

/// Gauss-Jordan pivot at (row, col), cost row included.
fn pivot(tab: &mut DMatrix<f64>, row: usize, col: usize) {
    let n_cols = tab.ncols();
    let piv = tab[(row, col)];
    for j in 0..n_cols {
        tab[(row, j)] /= piv;
    }
    tab[(row, col)] = 1.0;
    for i in 0..tab.nrows() {
        if i == row {
            continue;
        }
        let factor = tab[(i, col)];
        if factor != 0.0 {
            for j in 0..n_cols {
                tab[(i, j)] -= factor * tab[(row, j)];
            }
            tab[(i, col)] = 0.0;
        }
    }
}

/// Pivot zero-level artificials out of the basis after phase 1.
///
/// Rows with no structural nonzero are redundant; their artificial stays
/// basic at zero and never re-enters elsewhere.
fn drive_out_artificials(tab: &mut DMatrix<f64>, basis: &mut [usize], n_struct: usize) {
    let n_rows = basis.len();
    for r in 0..n_rows {
        if basis[r] < n_struct {
            continue;
        }
        for j in 0..n_struct {
            if tab[(r, j)].abs() > 1e-7 {
                pivot(tab, r, j);
                basis[r] = j;
                break;
            }
        }
    }
}
