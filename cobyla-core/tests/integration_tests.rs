//! End-to-end integration tests for the COBYLA solver.
//!
//! These tests validate the full iteration pipeline on linear,
//! bound-constrained and equality-constrained problems.

use approx::assert_relative_eq;
use cobyla_core::{
    solve, CobylaError, CobylaSolver, Constraint, OptimizationProblem, SolveStatus,
    SolverSettings,
};

const W: [f64; 4] = [1.0, 2.0, -3.0, 4.0];

fn linear_form(x: &[f64]) -> f64 {
    x.iter().zip(W.iter()).map(|(xi, wi)| xi * wi).sum()
}

#[test]
fn test_linear_objective_on_bound_box_min() {
    // min x1 + 2*x2 - 3*x3 + 4*x4 over [-3, 5]^4 from the origin.
    //
    // The minimum sits on the box vertex selected against the gradient:
    // x = (-3, -3, 5, -3), objective -36.
    let problem = OptimizationProblem::new(4, linear_form)
        .with_bounds(vec![-3.0; 4], vec![5.0; 4])
        .unwrap();

    let result = solve(&problem, &[0.0; 4], &SolverSettings::default()).expect("Solve failed");

    println!("=== Bound box (min) ===");
    println!("Status: {}", result.status);
    println!("x = {:?}", result.x);
    println!("obj = {}", result.obj_val);

    assert_eq!(result.status, SolveStatus::Converged);
    let expected = [-3.0, -3.0, 5.0, -3.0];
    for (xi, ei) in result.x.iter().zip(expected.iter()) {
        assert_relative_eq!(*xi, *ei, epsilon = 1e-6);
    }
    assert_relative_eq!(result.obj_val, -36.0, epsilon = 1e-6);
    // The reported value matches the linear form at the reported point.
    assert_relative_eq!(result.obj_val, linear_form(&result.x), epsilon = 1e-9);
}

#[test]
fn test_linear_objective_on_bound_box_max() {
    // Same box, maximization: the opposite vertex (5, 5, -3, 5), objective 44.
    let problem = OptimizationProblem::new(4, linear_form)
        .with_bounds(vec![-3.0; 4], vec![5.0; 4])
        .unwrap()
        .maximize();

    let result = solve(&problem, &[0.0; 4], &SolverSettings::default()).expect("Solve failed");

    assert_eq!(result.status, SolveStatus::Converged);
    let expected = [5.0, 5.0, -3.0, 5.0];
    for (xi, ei) in result.x.iter().zip(expected.iter()) {
        assert_relative_eq!(*xi, *ei, epsilon = 1e-6);
    }
    assert_relative_eq!(result.obj_val, 44.0, epsilon = 1e-6);
}

#[test]
fn test_maximization_mirrors_negated_minimization() {
    // max f must find the same point as min -f, with opposite reported
    // values.
    let bounds = (vec![-3.0; 4], vec![5.0; 4]);
    let max_problem = OptimizationProblem::new(4, linear_form)
        .with_bounds(bounds.0.clone(), bounds.1.clone())
        .unwrap()
        .maximize();
    let neg_problem = OptimizationProblem::new(4, |x: &[f64]| -linear_form(x))
        .with_bounds(bounds.0, bounds.1)
        .unwrap();

    let settings = SolverSettings::default();
    let r_max = solve(&max_problem, &[0.0; 4], &settings).expect("Solve failed");
    let r_neg = solve(&neg_problem, &[0.0; 4], &settings).expect("Solve failed");

    assert_eq!(r_max.x, r_neg.x);
    assert_relative_eq!(r_max.obj_val, -r_neg.obj_val, epsilon = 1e-12);
}

#[test]
fn test_nearest_point_on_level_plane() {
    // The classic scenario: x1 + 2*x2 - 3*x3 + 4*x4 as a level function
    // with level 3.0, starting from (1, 1, 1, 1), all tolerances 1e-10.
    // The nearest point to the origin on the plane is 3*w/|w|^2 =
    // (0.1, 0.2, -0.3, 0.4).
    let problem = OptimizationProblem::new(4, |x: &[f64]| x.iter().map(|v| v * v).sum::<f64>())
        .with_constraint(Constraint::level(linear_form, 3.0));

    let settings = SolverSettings {
        rhoend: 1e-12,
        max_iter: 2000,
        max_absolute_error: 1e-10,
        max_relative_error: 1e-10,
        max_residual_error: 1e-10,
        max_constraint_error: 1e-10,
        ..Default::default()
    };

    let result = solve(&problem, &[1.0; 4], &settings).expect("Solve failed");

    println!("=== Nearest point on level plane ===");
    println!("Status: {}", result.status);
    println!("x = {:?}", result.x);
    println!("obj = {:.12}", result.obj_val);
    println!("info = {:?}", result.info);

    assert_eq!(result.status, SolveStatus::Converged);
    // The level equality holds to tight tolerance at the solution.
    assert!((linear_form(&result.x) - 3.0).abs() <= 1e-9);
    assert!(result.info.constraint_error <= 1e-9);

    let expected = [0.1, 0.2, -0.3, 0.4];
    for (xi, ei) in result.x.iter().zip(expected.iter()) {
        assert_relative_eq!(*xi, *ei, epsilon = 1e-5);
    }
    assert_relative_eq!(result.obj_val, 0.3, epsilon = 1e-6);

    // Multiplier estimate: grad f = 2x* = 0.2*w, so the net multiplier of
    // the equality pair is 0.2.
    assert_eq!(result.multipliers.len(), 2);
    let net = result.multipliers[0] - result.multipliers[1];
    assert_relative_eq!(net, 0.2, epsilon = 1e-2);
}

#[test]
fn test_run_twice_yields_identical_results() {
    // The solver is deterministic and run() restarts from the configured
    // starting point, so a second run reproduces the first bit for bit.
    let problem = OptimizationProblem::new(2, |x: &[f64]| {
        (x[0] - 1.0).powi(2) + (x[1] + 2.0).powi(2)
    });
    let settings = SolverSettings {
        rhoend: 1e-8,
        max_iter: 500,
        ..Default::default()
    };

    let mut solver = CobylaSolver::new(&problem, &[5.0, 5.0], settings).unwrap();
    let first = solver.run().expect("Solve failed");
    let second = solver.run().expect("Solve failed");

    assert_eq!(first.x, second.x);
    assert_eq!(first.obj_val, second.obj_val);
    assert_eq!(first.info.iters, second.info.iters);
    assert_eq!(first.info.evals, second.info.evals);
}

#[test]
fn test_tighter_rhoend_never_worsens_the_minimum() {
    // All else equal, shrinking rhoend only refines further.
    let run_with = |rhoend: f64| {
        let problem = OptimizationProblem::new(2, |x: &[f64]| {
            (x[0] - 3.14159).powi(2) + (x[1] + 1.5).powi(2)
        });
        let settings = SolverSettings {
            rhoend,
            max_iter: 500,
            // Disable threshold-based stopping so both runs refine down to
            // their configured radius.
            max_absolute_error: 0.0,
            max_relative_error: 0.0,
            max_residual_error: 0.0,
            max_constraint_error: 0.0,
            ..Default::default()
        };
        solve(&problem, &[0.0, 0.0], &settings).expect("Solve failed")
    };

    let loose = run_with(1e-3);
    let tight = run_with(1e-6);

    println!("loose obj = {:.3e}, tight obj = {:.3e}", loose.obj_val, tight.obj_val);
    assert!(tight.obj_val <= loose.obj_val + 1e-9);
}

#[test]
fn test_iteration_cap_is_a_result_not_an_error() {
    let problem = OptimizationProblem::new(2, |x: &[f64]| x[0] * x[0] + x[1] * x[1]);
    let settings = SolverSettings {
        max_iter: 3,
        ..Default::default()
    };

    let result = solve(&problem, &[10.0, 10.0], &settings).expect("cap must not be an error");

    assert_eq!(result.status, SolveStatus::MaxIterReached);
    assert_eq!(result.x.len(), 2);
    assert!(result.obj_val.is_finite());
    assert!(result.info.iters <= 3);
}

#[test]
fn test_starting_point_dimension_mismatch() {
    let problem = OptimizationProblem::new(3, |x: &[f64]| x[0]);
    let res = CobylaSolver::new(&problem, &[1.0, 2.0], SolverSettings::default());
    assert!(matches!(res.err(), Some(CobylaError::DimensionMismatch(_))));
}

#[test]
fn test_evaluator_failure_propagates() {
    let problem = OptimizationProblem::new_fallible(2, |_x: &[f64]| {
        Err("sensor offline".to_string().into())
    });
    let err = solve(&problem, &[0.0, 0.0], &SolverSettings::default()).unwrap_err();
    match err {
        CobylaError::Evaluation(source) => {
            assert!(source.to_string().contains("sensor offline"));
        }
        other => panic!("expected Evaluation, got {other:?}"),
    }
}

#[test]
fn test_zero_width_bound_freezes_a_coordinate() {
    // x0 is pinned to 1 by a zero-width bound; the free coordinate still
    // reaches its unconstrained optimum.
    let problem = OptimizationProblem::new(2, |x: &[f64]| {
        (x[0] - 2.0).powi(2) + (x[1] - 2.0).powi(2)
    })
    .with_bounds(vec![1.0, -5.0], vec![1.0, 5.0])
    .unwrap();

    let settings = SolverSettings {
        rhoend: 1e-8,
        max_iter: 500,
        ..Default::default()
    };
    let result = solve(&problem, &[1.0, 0.0], &settings).expect("Solve failed");

    assert_eq!(result.status, SolveStatus::Converged);
    assert_relative_eq!(result.x[0], 1.0, epsilon = 1e-6);
    assert_relative_eq!(result.x[1], 2.0, epsilon = 1e-4);
}

#[test]
fn test_inequality_constraint_is_boundary_inclusive() {
    // min x subject to x >= 0: the optimum sits exactly on the boundary,
    // and a constraint value of 0 counts as feasible.
    let problem = OptimizationProblem::new(1, |x: &[f64]| x[0])
        .with_constraint(Constraint::ineq(|x: &[f64]| x[0]));

    let settings = SolverSettings {
        rhoend: 1e-9,
        max_iter: 300,
        ..Default::default()
    };
    let result = solve(&problem, &[2.0], &settings).expect("Solve failed");

    assert_eq!(result.status, SolveStatus::Converged);
    assert_relative_eq!(result.x[0], 0.0, epsilon = 1e-6);
    assert!(result.info.constraint_error <= 1e-9);
    // The active bound prices at 1: grad f = 1 = multiplier * grad g.
    assert_relative_eq!(result.multipliers[0], 1.0, epsilon = 1e-2);
}
