//! Dense linear-algebra kernels for the solver.

pub mod lp;
