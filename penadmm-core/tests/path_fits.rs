extern crate nalgebra as na;

use approx::assert_relative_eq;
use penadmm_core::{
    config::FitConfig,
    coord::CoordSolver,
    dataset::Dataset,
    genridge::{GenRidgeAdmm, first_difference},
    lasso::{LassoAdmm, LassoCoord},
    logistic::LogisticLassoAdmm,
    mcp::McpCoord,
    path::{fit_admm_path, fit_coord_path},
    problem::{AdmmProblem, AdmmSolver},
    utils::LassoError,
};

fn gaussian() -> Dataset {
    Dataset::synthetic_gaussian(100, 20, 5, 0.1, 2024).unwrap()
}

fn admm_solver<P: AdmmProblem>(model: P, config: &FitConfig) -> AdmmSolver<P> {
    AdmmSolver::new(model, config.eps_abs, config.eps_rel, config.spectral_estimator())
}

#[test]
fn admm_and_coordinate_descent_paths_agree() {
    let data = gaussian();
    let config = FitConfig::default()
        .with_tolerances(1e-10, 1e-10)
        .with_maxit(50_000)
        .with_nlambda(10)
        .with_lmin_ratio(0.05);

    let mut admm = admm_solver(LassoAdmm::new(&data.x, &data.y).unwrap(), &config);
    let admm_fit = fit_admm_path(&mut admm, &config).unwrap();

    let cd_config = config.clone().with_tolerances(1e-13, 1e-13);
    let mut cd = CoordSolver::new(LassoCoord::new(&data.x, &data.y).unwrap(), cd_config.eps_rel);
    let cd_fit = fit_coord_path(&mut cd, &cd_config).unwrap();

    assert_eq!(admm_fit.len(), 10);
    assert_eq!(admm_fit.lambdas, cd_fit.lambdas);
    assert!(admm_fit.converged.iter().all(|c| *c));
    assert!(cd_fit.converged.iter().all(|c| *c));

    let a = admm_fit.coefficient_matrix();
    let b = cd_fit.coefficient_matrix();
    assert!((&a - &b).amax() < 1e-5);

    for i in 0..admm_fit.len() {
        let support = |m: &na::DMatrix<f64>| -> Vec<usize> {
            (0..m.nrows()).filter(|&j| m[(j, i)].abs() > 1e-6).collect()
        };
        assert_eq!(support(&a), support(&b), "supports differ at step {}", i);
    }
}

#[test]
fn warm_started_path_matches_cold_starts() {
    let data = gaussian();
    let config = FitConfig::default()
        .with_tolerances(1e-10, 1e-10)
        .with_maxit(50_000)
        .with_nlambda(6)
        .with_lmin_ratio(0.1);

    let mut path_solver = admm_solver(LassoAdmm::new(&data.x, &data.y).unwrap(), &config);
    let fit = fit_admm_path(&mut path_solver, &config).unwrap();

    for (i, &lambda) in fit.lambdas.iter().enumerate() {
        let mut cold = admm_solver(LassoAdmm::new(&data.x, &data.y).unwrap(), &config);
        cold.init(lambda, config.rho).unwrap();
        cold.solve(config.maxit).unwrap();
        assert!(cold.converged());

        let diff = cold.coefficients().to_dense() - fit.coefficients[i].to_dense();
        assert!(diff.amax() < 1e-5, "step {} differs by {}", i, diff.amax());
    }
}

#[test]
fn auto_rho_follows_lambda_two_thirds() {
    let data = gaussian();
    let config = FitConfig::default().with_nlambda(5).with_lmin_ratio(0.1);

    let mut solver = admm_solver(LassoAdmm::new(&data.x, &data.y).unwrap(), &config);
    let fit = fit_admm_path(&mut solver, &config).unwrap();

    for i in 1..fit.len() {
        let expected = (fit.lambdas[i] / fit.lambdas[0]).powf(2.0 / 3.0);
        assert_relative_eq!(fit.rhos[i] / fit.rhos[0], expected, max_relative = 1e-10);
    }
}

#[test]
fn fixed_rho_stays_fixed() {
    let data = gaussian();
    let config = FitConfig::default().with_rho(3.5).with_nlambda(5);

    let mut solver = admm_solver(LassoAdmm::new(&data.x, &data.y).unwrap(), &config);
    let fit = fit_admm_path(&mut solver, &config).unwrap();
    assert!(fit.rhos.iter().all(|r| *r == 3.5));
    assert!(!solver.rho_auto());
}

#[test]
fn first_path_value_is_the_zero_solution() {
    let data = gaussian();
    let config = FitConfig::default().with_nlambda(3);

    let mut admm = admm_solver(LassoAdmm::new(&data.x, &data.y).unwrap(), &config);
    let fit = fit_admm_path(&mut admm, &config).unwrap();
    assert_eq!(fit.coefficients[0].nnz(), 0);
    assert_eq!(fit.iterations[0], 0);
    assert!(fit.converged[0]);

    let d = first_difference(data.ncols());
    let model = GenRidgeAdmm::new(&data.x, &data.y, &d, 0.5).unwrap();
    let mut genridge = admm_solver(model, &config);
    let fit = fit_admm_path(&mut genridge, &config).unwrap();
    assert_eq!(fit.coefficients[0].nnz(), 0);
    assert!(fit.coefficients[2].nnz() > 0);
}

#[test]
fn explicit_lambda_sequence_is_used_verbatim() {
    let data = gaussian();
    let config = FitConfig::default().with_lambda(vec![50.0, 20.0, 5.0]);

    let mut cd = CoordSolver::new(
        McpCoord::new(&data.x, &data.y, vec![], 3.0).unwrap(),
        config.eps_rel,
    );
    let fit = fit_coord_path(&mut cd, &config).unwrap();
    assert_eq!(fit.lambdas, vec![50.0, 20.0, 5.0]);
    assert_eq!(cd.timing_tracker().path_timings().len(), 3);
}

#[test]
fn logistic_path_on_binomial_data() {
    let data = Dataset::synthetic_binomial(200, 10, 3, 7).unwrap();
    let config = FitConfig::default().with_nlambda(8).with_lmin_ratio(0.05);

    let model = LogisticLassoAdmm::new(&data.x, &data.y)
        .unwrap()
        .with_newton(config.newton_maxit, config.newton_tol);
    let mut solver = admm_solver(model, &config);
    let fit = fit_admm_path(&mut solver, &config).unwrap();

    assert_eq!(fit.coefficients[0].nnz(), 0);
    assert!(fit.coefficients[7].nnz() > 0);
    let report = solver.problem().report();
    assert_eq!(report.calls, fit.iterations.iter().sum::<usize>());
}

#[test]
fn invalid_configuration_is_rejected() {
    let data = gaussian();
    let model = LassoAdmm::new(&data.x, &data.y).unwrap();
    let config = FitConfig::default().with_alpha(0.0);
    let mut solver = admm_solver(model, &FitConfig::default());
    assert!(matches!(
        fit_admm_path(&mut solver, &config),
        Err(LassoError::InvalidConfig(_))
    ));

    let config = FitConfig::default().with_penalty_factor(vec![1.0; 3]);
    assert!(matches!(
        fit_admm_path(&mut solver, &config),
        Err(LassoError::DimensionMismatch { .. })
    ));
}

#[cfg(feature = "linfa")]
#[test]
fn lasso_objective_matches_linfa() {
    let data = gaussian();
    let lambda = 0.2 * penadmm_core::utils::max_abs(&data.x.tr_mul(&data.y));
    let config = FitConfig::default().with_tolerances(1e-9, 1e-9).with_maxit(50_000);

    let mut solver = admm_solver(LassoAdmm::new(&data.x, &data.y).unwrap(), &config);
    solver.init(lambda, config.rho).unwrap();
    solver.solve(config.maxit).unwrap();
    let beta = solver.coefficients().to_dense();
    let ours = 0.5 * (&data.y - &data.x * &beta).norm_squared() + lambda * beta.lp_norm(1);

    let reference = penadmm_core::utils::find_p_star_linfa(&data.x, &data.y, lambda).unwrap();
    assert_relative_eq!(ours, reference, max_relative = 1e-3);
}
