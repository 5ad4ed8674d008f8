//! L1-penalized logistic regression for the ADMM engine.
extern crate nalgebra as na;

use serde::{Deserialize, Serialize};

use crate::{
    ops::{sigmoid, soft_threshold_sparse, softplus},
    problem::{AdmmProblem, AdmmState},
    sparse::SparseVector,
    utils::{LassoError, SymmetricFactor, max_abs, weighted_gram, zero_is_optimal},
};

/// Counters of the inner Newton solves of one model.
///
/// The Newton iteration is undamped. Steps that fail to decrease the
/// subproblem objective and solves that stop at the iteration cap are
/// counted here instead of being corrected.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NewtonReport {
    /// Number of x-updates
    pub calls: usize,
    /// Newton steps over all x-updates
    pub inner_iterations: usize,
    /// x-updates that hit the inner iteration cap
    pub capped_calls: usize,
    /// Newton steps after which the subproblem objective went up
    pub non_decrease_steps: usize,
}

/// Logistic Lasso: `sum_i log(1 + exp(x_i'b)) - y_i x_i'b + lambda ||b||_1`.
///
/// Labels are expected in `{0, 1}`; any value in `[0, 1]` is accepted.
/// There is no intercept.
pub struct LogisticLassoAdmm<'a> {
    x: &'a na::DMatrix<f64>,
    xy: na::DVector<f64>,
    /// Negative loss gradient at zero, `X'(y - 1/2)`
    grad0: na::DVector<f64>,
    lambda0: f64,
    lambda: f64,
    rho: f64,
    newton_maxit: usize,
    newton_tol: f64,
    report: NewtonReport,
    /// Set once a non-decrease warning was logged for the current lambda
    warned: bool,
}

impl<'a> LogisticLassoAdmm<'a> {
    pub fn new(x: &'a na::DMatrix<f64>, y: &'a na::DVector<f64>) -> Result<Self, LassoError> {
        if y.len() != x.nrows() {
            return Err(LassoError::DimensionMismatch {
                what: "response",
                expected: x.nrows(),
                found: y.len(),
            });
        }
        if y.iter().any(|v| !(0.0..=1.0).contains(v)) {
            return Err(LassoError::InvalidConfig(
                "logistic labels must lie in [0, 1]".to_string(),
            ));
        }
        let xy = x.tr_mul(y);
        let grad0 = x.tr_mul(&y.map(|v| v - 0.5));
        let lambda0 = max_abs(&grad0);
        Ok(LogisticLassoAdmm {
            x,
            xy,
            grad0,
            lambda0,
            lambda: 0.0,
            rho: 1.0,
            newton_maxit: 100,
            newton_tol: 1e-5,
            report: NewtonReport::default(),
            warned: false,
        })
    }

    /// Sets the inner iteration cap and the tolerance on `|g' dx|`.
    pub fn with_newton(mut self, maxit: usize, tol: f64) -> Self {
        self.newton_maxit = maxit;
        self.newton_tol = tol;
        self
    }

    pub fn report(&self) -> &NewtonReport {
        &self.report
    }

    /// `sum softplus(eta) - y'eta + adj_y'b + rho/2 ||b - adj_z||^2`
    fn subproblem_objective(
        &self,
        eta: &na::DVector<f64>,
        beta: &na::DVector<f64>,
        state: &AdmmState,
    ) -> f64 {
        let loss: f64 = eta.iter().map(|&e| softplus(e)).sum::<f64>() - self.xy.dot(beta);
        let dist = beta.norm_squared() - 2.0 * state.adj_z.dot_dense(beta)
            + state.adj_z.norm_squared();
        loss + state.adj_y.dot(beta) + 0.5 * self.rho * dist
    }
}

impl AdmmProblem for LogisticLassoAdmm<'_> {
    fn dim_main(&self) -> usize {
        self.x.ncols()
    }

    fn lambda_zero(&self) -> f64 {
        self.lambda0
    }

    fn design(&self) -> &na::DMatrix<f64> {
        self.x
    }

    fn set_penalty(&mut self, lambda: f64, rho: f64) -> Result<(), LassoError> {
        self.lambda = lambda;
        self.rho = rho;
        self.warned = false;
        Ok(())
    }

    fn next_x(&mut self, state: &AdmmState) -> Result<na::DVector<f64>, LassoError> {
        let x = self.x;
        let rho = self.rho;
        let mut beta = state.main_x.clone();
        let mut prev_obj = f64::INFINITY;
        let mut converged = false;
        self.report.calls += 1;

        for _ in 0..self.newton_maxit {
            self.report.inner_iterations += 1;

            let eta = x * &beta;
            let obj = self.subproblem_objective(&eta, &beta, state);
            if obj > prev_obj + 1e-12 * prev_obj.abs().max(1.0) {
                self.report.non_decrease_steps += 1;
                if !self.warned {
                    log::warn!(
                        "[LogisticLasso] Newton step increased the subproblem objective ({:e} -> {:e}) at lambda = {:e}",
                        prev_obj,
                        obj,
                        self.lambda
                    );
                    self.warned = true;
                }
            }
            prev_obj = obj;

            let prob = eta.map(sigmoid);
            let mut grad = x.tr_mul(&prob) - &self.xy + &state.adj_y + &beta * rho;
            state.adj_z.add_scaled_to(&mut grad, -rho);

            let w = prob.map(|p| p * (1.0 - p));
            let mut hess = weighted_gram(x, &w);
            for i in 0..hess.nrows() {
                hess[(i, i)] += rho;
            }
            let dx = SymmetricFactor::new(hess)?.solve(&grad)?;
            beta -= &dx;

            if grad.dot(&dx).abs() < self.newton_tol {
                converged = true;
                break;
            }
        }

        if !converged {
            self.report.capped_calls += 1;
            log::debug!(
                "[LogisticLasso] Newton solve stopped at the cap of {} iterations",
                self.newton_maxit
            );
        }
        Ok(beta)
    }

    fn a_mult(&self, x: &na::DVector<f64>) -> na::DVector<f64> {
        x.clone()
    }

    fn b_mult(&self, z: &SparseVector) -> na::DVector<f64> {
        z.to_dense()
    }

    fn c_norm(&self) -> f64 {
        0.0
    }

    fn next_z(&self, ax: &na::DVector<f64>, state: &AdmmState) -> SparseVector {
        let v = ax + &state.adj_y / state.rho;
        soft_threshold_sparse(&v, self.lambda / state.rho, &[])
    }

    fn zero_solution_dual(&self, lambda: f64) -> Option<na::DVector<f64>> {
        zero_is_optimal(&self.grad0, lambda, &[]).then(|| self.grad0.clone())
    }
}
