extern crate nalgebra as na;

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::{
    config::FitConfig,
    coord::{CoordProblem, CoordSolver},
    problem::{AdmmProblem, AdmmSolver},
    sparse::SparseVector,
    utils::LassoError,
};

/// A strictly decreasing sequence of penalty strengths.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LambdaPath {
    values: Vec<f64>,
}

impl LambdaPath {
    /// `nlambda` values spaced evenly on the log scale from `lambda_max`
    /// down to `lmin_ratio * lambda_max`.
    pub fn log_spaced(lambda_max: f64, lmin_ratio: f64, nlambda: usize) -> Self {
        if nlambda <= 1 {
            return LambdaPath {
                values: vec![lambda_max; nlambda],
            };
        }
        let log_max = lambda_max.ln();
        let log_min = (lmin_ratio * lambda_max).ln();
        let step = (log_min - log_max) / (nlambda - 1) as f64;
        let mut values: Vec<f64> = (0..nlambda)
            .map(|i| (log_max + step * i as f64).exp())
            .collect();
        // exp(ln(x)) may be off by one ulp; the top must be exact
        values[0] = lambda_max;
        LambdaPath { values }
    }

    /// Wraps a caller-supplied sequence, checking that it is strictly
    /// decreasing, positive and finite.
    pub fn from_values(values: Vec<f64>) -> Result<Self, LassoError> {
        if values.is_empty() {
            return Err(LassoError::InvalidConfig("lambda sequence is empty".to_string()));
        }
        if values.iter().any(|l| !(*l > 0.0) || !l.is_finite()) {
            return Err(LassoError::InvalidConfig(
                "lambda values must be positive and finite".to_string(),
            ));
        }
        if values.windows(2).any(|w| w[1] >= w[0]) {
            return Err(LassoError::InvalidConfig(
                "lambda sequence must be strictly decreasing".to_string(),
            ));
        }
        Ok(LambdaPath { values })
    }

    /// The configured sequence if there is one, otherwise a log-spaced path
    /// starting at `lambda_max`.
    pub fn resolve(config: &FitConfig, lambda_max: f64) -> Result<Self, LassoError> {
        match &config.lambda {
            Some(values) => Self::from_values(values.clone()),
            None => {
                if !(lambda_max > 0.0) || !lambda_max.is_finite() {
                    return Err(LassoError::InvalidConfig(format!(
                        "cannot generate a lambda path from lambda_max = {}; the response is orthogonal to every predictor",
                        lambda_max
                    )));
                }
                Ok(Self::log_spaced(lambda_max, config.lmin_ratio, config.nlambda))
            }
        }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Solutions along a lambda path, one entry per lambda value.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PathFit {
    pub lambdas: Vec<f64>,
    pub coefficients: Vec<SparseVector>,
    pub iterations: Vec<usize>,
    pub converged: Vec<bool>,
    /// ADMM penalty used per lambda; 0 for coordinate descent fits
    pub rhos: Vec<f64>,
}

impl PathFit {
    pub fn len(&self) -> usize {
        self.lambdas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lambdas.is_empty()
    }

    /// Coefficients as a dense `p x nlambda` matrix.
    pub fn coefficient_matrix(&self) -> na::DMatrix<f64> {
        let p = self.coefficients.first().map_or(0, |c| c.dim());
        let mut out = na::DMatrix::zeros(p, self.coefficients.len());
        for (k, coef) in self.coefficients.iter().enumerate() {
            for (j, v) in coef.iter() {
                out[(j, k)] = v;
            }
        }
        out
    }

    /// Indices of the nonzero coefficients at path position `i`.
    pub fn support(&self, i: usize) -> Vec<usize> {
        self.coefficients
            .get(i)
            .map(|c| c.indices().to_vec())
            .unwrap_or_default()
    }

    fn record(&mut self, lambda: f64, coefficients: SparseVector, iterations: usize, converged: bool, rho: f64) {
        self.lambdas.push(lambda);
        self.coefficients.push(coefficients);
        self.iterations.push(iterations);
        self.converged.push(converged);
        self.rhos.push(rho);
    }
}

fn report_step(index: usize, total: usize, lambda: f64, iterations: usize, converged: bool, nnz: usize, max_iter: usize) {
    if !converged {
        log::warn!(
            "[LambdaPath] lambda = {:e} did not converge within {} iterations",
            lambda,
            max_iter
        );
    }
    log::info!(
        "[LambdaPath] {}/{}: lambda = {:.6e}, iterations = {}, nonzeros = {}",
        index + 1,
        total,
        lambda,
        iterations,
        nnz
    );
}

fn tolerance_mismatch(solver: String, config: String) -> LassoError {
    LassoError::InvalidConfig(format!(
        "solver was built with tolerance {} but the configuration asks for {}",
        solver, config
    ))
}

/// Fits an ADMM model along the lambda path, cold-starting the first value
/// and warm-starting every later one from the previous solution.
///
/// The solver's tolerances must equal `config.eps_abs`/`config.eps_rel`.
/// Model settings (`alpha`, `penalty_factor`, the Newton settings) are
/// fixed when the model is built; here they are only validated.
pub fn fit_admm_path<P: AdmmProblem>(
    solver: &mut AdmmSolver<P>,
    config: &FitConfig,
) -> Result<PathFit, LassoError> {
    config.validate(solver.problem().dim_main())?;
    if solver.tolerances() != (config.eps_abs, config.eps_rel) {
        return Err(tolerance_mismatch(
            format!("{:?}", solver.tolerances()),
            format!("{:?}", (config.eps_abs, config.eps_rel)),
        ));
    }
    let path = LambdaPath::resolve(config, solver.problem().lambda_max())?;
    let mut fit = PathFit::default();

    for (i, &lambda) in path.values().iter().enumerate() {
        let start = Instant::now();
        let solver_lambda = solver.problem().solver_lambda(lambda);
        if i == 0 {
            solver.init(solver_lambda, config.rho)?;
        } else {
            solver.init_warm(solver_lambda)?;
        }
        let iterations = solver.solve(config.maxit)?;
        let converged = solver.converged();

        solver
            .timing_tracker_mut()
            .record_path_step(lambda, iterations, converged, start.elapsed());
        report_step(
            i,
            path.len(),
            lambda,
            iterations,
            converged,
            solver.coefficients().nnz(),
            config.maxit,
        );
        fit.record(lambda, solver.coefficients().clone(), iterations, converged, solver.rho());
    }
    Ok(fit)
}

/// Fits a coordinate descent model along the lambda path with warm starts.
///
/// The solver's tolerance must equal `config.eps_rel`; `gamma` and
/// `penalty_factor` are fixed when the model is built.
pub fn fit_coord_path<P: CoordProblem>(
    solver: &mut CoordSolver<P>,
    config: &FitConfig,
) -> Result<PathFit, LassoError> {
    config.validate(solver.coefficients().len())?;
    if solver.tol() != config.eps_rel {
        return Err(tolerance_mismatch(
            solver.tol().to_string(),
            config.eps_rel.to_string(),
        ));
    }
    let path = LambdaPath::resolve(config, solver.problem().lambda_zero())?;
    let mut fit = PathFit::default();

    for (i, &lambda) in path.values().iter().enumerate() {
        let start = Instant::now();
        if i == 0 {
            solver.init(lambda);
        } else {
            solver.init_warm(lambda);
        }
        let iterations = solver.solve(config.maxit);
        let converged = solver.converged();
        let coefficients = SparseVector::from_dense(solver.coefficients());

        solver
            .timing_tracker_mut()
            .record_path_step(lambda, iterations, converged, start.elapsed());
        report_step(
            i,
            path.len(),
            lambda,
            iterations,
            converged,
            coefficients.nnz(),
            config.maxit,
        );
        fit.record(lambda, coefficients, iterations, converged, 0.0);
    }
    Ok(fit)
}
