//! Linear interpolation models of the objective and constraints.

use log::debug;
use nalgebra::{DMatrix, DVector};

use crate::cobyla::simplex::Simplex;
use crate::error::{CobylaError, CobylaResult};

/// Pivot-ratio threshold below which the edge matrix is treated as
/// numerically singular (the simplex has lost affine independence).
const SINGULARITY_RATIO: f64 = 1e-12;

/// Affine models interpolating the simplex vertices, anchored at the base
/// vertex: `f(x_b + d) ~ f_b + g·d`, `c_i(x_b + d) ~ c_i(x_b) + a_i·d`.
pub(crate) struct LinearModel {
    /// Objective gradient estimate (length n)
    pub g: DVector<f64>,
    /// Constraint gradient estimates (m x n, row per lowered constraint)
    pub a: DMatrix<f64>,
}

/// Build the models by interpolation through all n+1 vertices.
///
/// One LU factorization of the edge matrix serves the objective and every
/// constraint gradient. Near-singularity is detected from the pivot-ratio
/// of the factor, which is scale-invariant in rho.
pub(crate) fn build(simplex: &Simplex, base: usize) -> CobylaResult<LinearModel> {
    let n = simplex.n();
    let m = simplex.con[base].len();
    let xb = &simplex.points[base];

    let others: Vec<usize> = (0..=n).filter(|&j| j != base).collect();
    let edges = DMatrix::<f64>::from_fn(n, n, |r, c| simplex.points[others[r]][c] - xb[c]);
    let mut rhs = DMatrix::<f64>::zeros(n, 1 + m);
    for (r, &j) in others.iter().enumerate() {
        rhs[(r, 0)] = simplex.f[j] - simplex.f[base];
        for i in 0..m {
            rhs[(r, 1 + i)] = simplex.con[j][i] - simplex.con[base][i];
        }
    }

    let lu = edges.lu();
    let diag = lu.u().diagonal();
    let max_pivot = diag.amax();
    let min_pivot = diag.iter().fold(f64::INFINITY, |acc, &v| acc.min(v.abs()));
    if !(max_pivot > 0.0) || min_pivot < SINGULARITY_RATIO * max_pivot {
        debug!("interpolation pivots {min_pivot:.3e}..{max_pivot:.3e}, simplex degenerate");
        return Err(CobylaError::DegenerateSimplex);
    }
    let sol = lu.solve(&rhs).ok_or(CobylaError::DegenerateSimplex)?;

    let g = DVector::from_fn(n, |j, _| sol[(j, 0)]);
    let a = DMatrix::from_fn(m, n, |i, j| sol[(j, 1 + i)]);
    Ok(LinearModel { g, a })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn eval_linear(x: &DVector<f64>) -> CobylaResult<(f64, DVector<f64>)> {
        let f = 2.0 * x[0] - 3.0 * x[1];
        let c = DVector::from_vec(vec![x[0] + x[1] - 1.0]);
        Ok((f, c))
    }

    #[test]
    fn models_are_exact_on_linear_functions() {
        let center = DVector::from_vec(vec![0.5, -0.25]);
        let (f0, c0) = eval_linear(&center).unwrap();
        let s = Simplex::init(center, f0, c0, 0.1, &mut eval_linear).unwrap();
        let model = build(&s, 0).unwrap();
        assert_relative_eq!(model.g[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(model.g[1], -3.0, epsilon = 1e-12);
        assert_relative_eq!(model.a[(0, 0)], 1.0, epsilon = 1e-12);
        assert_relative_eq!(model.a[(0, 1)], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn duplicate_vertices_are_reported_degenerate() {
        let center = DVector::from_vec(vec![0.0, 0.0]);
        let (f0, c0) = eval_linear(&center).unwrap();
        let mut s = Simplex::init(center, f0, c0, 1.0, &mut eval_linear).unwrap();
        let clone = s.points[1].clone();
        let (f, c) = eval_linear(&clone).unwrap();
        s.replace(2, clone, f, c);
        assert!(matches!(build(&s, 0), Err(CobylaError::DegenerateSimplex)));
    }

    #[test]
    fn any_base_vertex_gives_the_same_gradients() {
        let center = DVector::from_vec(vec![1.0, 2.0]);
        let (f0, c0) = eval_linear(&center).unwrap();
        let s = Simplex::init(center, f0, c0, 0.5, &mut eval_linear).unwrap();
        for base in 0..3 {
            let model = build(&s, base).unwrap();
            assert_relative_eq!(model.g[0], 2.0, epsilon = 1e-12);
            assert_relative_eq!(model.g[1], -3.0, epsilon = 1e-12);
        }
    }
}
