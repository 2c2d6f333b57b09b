//! Interpolation simplex: n+1 vertices with cached evaluations.

use nalgebra::DVector;

use crate::error::CobylaResult;

/// Sum of constraint violations (L1), the infeasibility term of the merit
/// function. A row value of exactly 0 contributes nothing.
pub(crate) fn l1_violation(c: &DVector<f64>) -> f64 {
    c.iter().map(|&v| (-v).max(0.0)).sum()
}

/// Worst single-row violation, the reported constraint error.
pub(crate) fn max_violation(c: &DVector<f64>) -> f64 {
    c.iter().map(|&v| (-v).max(0.0)).fold(0.0, f64::max)
}

/// The n+1 sampling vertices with their cached objective and constraint
/// values. Solver-private; mutated every iteration, discarded at
/// termination.
pub(crate) struct Simplex {
    /// Vertex coordinates (n+1 entries of length n)
    pub points: Vec<DVector<f64>>,
    /// Objective values (internal minimization orientation)
    pub f: Vec<f64>,
    /// Lowered constraint values per vertex
    pub con: Vec<DVector<f64>>,
}

impl Simplex {
    /// Build the initial simplex around `center` with edge scale `rho`:
    /// `v_0 = center`, `v_j = center + rho * e_j`. The center's values are
    /// supplied by the caller; the other n vertices are evaluated here.
    pub fn init<E>(
        center: DVector<f64>,
        f0: f64,
        con0: DVector<f64>,
        rho: f64,
        eval: &mut E,
    ) -> CobylaResult<Self>
    where
        E: FnMut(&DVector<f64>) -> CobylaResult<(f64, DVector<f64>)>,
    {
        let n = center.len();
        let mut points = Vec::with_capacity(n + 1);
        let mut f = Vec::with_capacity(n + 1);
        let mut con = Vec::with_capacity(n + 1);
        points.push(center);
        f.push(f0);
        con.push(con0);
        for j in 0..n {
            let mut v = points[0].clone();
            v[j] += rho;
            let (fv, cv) = eval(&v)?;
            points.push(v);
            f.push(fv);
            con.push(cv);
        }
        Ok(Self { points, f, con })
    }

    /// Rebuild around the vertex at `keep`, at edge scale `rho`.
    ///
    /// The kept vertex and its cached values move to slot 0; the other n
    /// vertices are regenerated on the coordinate axes and re-evaluated.
    pub fn rebuild<E>(&mut self, keep: usize, rho: f64, eval: &mut E) -> CobylaResult<()>
    where
        E: FnMut(&DVector<f64>) -> CobylaResult<(f64, DVector<f64>)>,
    {
        let center = self.points[keep].clone();
        let f0 = self.f[keep];
        let con0 = self.con[keep].clone();
        let fresh = Self::init(center, f0, con0, rho, eval)?;
        *self = fresh;
        Ok(())
    }

    /// Number of variables.
    pub fn n(&self) -> usize {
        self.points.len() - 1
    }

    /// Merit value of vertex `idx` under penalty weight `mu`.
    pub fn merit(&self, idx: usize, mu: f64) -> f64 {
        self.f[idx] + mu * l1_violation(&self.con[idx])
    }

    /// Incumbent: lowest merit, ties broken toward lower violation, then
    /// lower index.
    pub fn best_index(&self, mu: f64) -> usize {
        let mut best = 0;
        for i in 1..self.points.len() {
            let (mi, mb) = (self.merit(i, mu), self.merit(best, mu));
            if mi < mb
                || (mi == mb && max_violation(&self.con[i]) < max_violation(&self.con[best]))
            {
                best = i;
            }
        }
        best
    }

    /// Highest-merit vertex other than `exclude`.
    pub fn worst_index(&self, mu: f64, exclude: usize) -> usize {
        let mut worst = usize::MAX;
        for i in 0..self.points.len() {
            if i == exclude {
                continue;
            }
            if worst == usize::MAX || self.merit(i, mu) > self.merit(worst, mu) {
                worst = i;
            }
        }
        worst
    }

    /// Overwrite vertex `idx` with a new point and its values.
    pub fn replace(&mut self, idx: usize, x: DVector<f64>, f: f64, con: DVector<f64>) {
        self.points[idx] = x;
        self.f[idx] = f;
        self.con[idx] = con;
    }
}
