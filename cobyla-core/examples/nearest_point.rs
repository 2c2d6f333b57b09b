//! Nearest-point example for the COBYLA solver.
//!
//! Finds the point closest to the origin on the hyperplane
//!
//!   x1 + 2*x2 - 3*x3 + 4*x4 = 3
//!
//! starting from (1, 1, 1, 1). The exact answer is 3*w/|w|^2 for
//! w = (1, 2, -3, 4), i.e. (0.1, 0.2, -0.3, 0.4).

use cobyla_core::{solve, Constraint, OptimizationProblem, SolverSettings};

fn main() {
    println!("cobyla-core - Nearest Point Example");
    println!("===================================");
    println!();

    let problem = OptimizationProblem::new(4, |x: &[f64]| x.iter().map(|v| v * v).sum::<f64>())
        .with_constraint(Constraint::level(
            |x: &[f64]| x[0] + 2.0 * x[1] - 3.0 * x[2] + 4.0 * x[3],
            3.0,
        ));

    let settings = SolverSettings {
        rhoend: 1e-10,
        max_iter: 1000,
        max_absolute_error: 1e-10,
        max_relative_error: 1e-10,
        max_residual_error: 1e-10,
        max_constraint_error: 1e-10,
        verbose: true,
        ..Default::default()
    };

    match solve(&problem, &[1.0, 1.0, 1.0, 1.0], &settings) {
        Ok(result) => {
            println!();
            println!("Status:      {}", result.status);
            println!("x =          {:?}", result.x);
            println!("obj_val =    {:.12}", result.obj_val);
            println!("multipliers: {:?}", result.multipliers);
            println!(
                "iters = {}, evals = {}, rho_final = {:.3e}",
                result.info.iters, result.info.evals, result.info.rho_final
            );
        }
        Err(e) => eprintln!("solve failed: {e}"),
    }
}
