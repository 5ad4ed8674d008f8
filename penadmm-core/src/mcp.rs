//! Minimax concave penalty regression for the coordinate descent engine.
extern crate nalgebra as na;

use crate::{
    coord::{CoordProblem, CoordState},
    ops::mcp_threshold,
    utils::{LassoError, check_penalty_factor, penalized_max},
};

/// MCP-penalized least squares,
///
/// ```text
/// 1/2 ||y - X b||^2 + sum_j P(b_j; lambda, gamma)
/// ```
///
/// with `P(t) = lambda |t| - t^2 / (2 gamma)` for `|t| < lambda gamma` and
/// `lambda^2 gamma / 2` beyond.
///
/// In the partial-loss form only the first `num_loss` rows of `X` and `y`
/// enter the squared loss; the null deviance that scales the stopping rule
/// is still taken over the full response.
pub struct McpCoord<'a> {
    x: &'a na::DMatrix<f64>,
    y: &'a na::DVector<f64>,
    num_loss: usize,
    penalty_factor: Vec<f64>,
    gamma: f64,
    lambda0: f64,
    lambda: f64,
    null_dev: f64,
    objective: f64,
}

impl<'a> McpCoord<'a> {
    /// MCP regression over every row of `X`.
    pub fn new(
        x: &'a na::DMatrix<f64>,
        y: &'a na::DVector<f64>,
        penalty_factor: Vec<f64>,
        gamma: f64,
    ) -> Result<Self, LassoError> {
        Self::partial(x, y, penalty_factor, gamma, x.nrows())
    }

    /// MCP regression whose loss covers only the first `num_loss` rows.
    pub fn partial(
        x: &'a na::DMatrix<f64>,
        y: &'a na::DVector<f64>,
        penalty_factor: Vec<f64>,
        gamma: f64,
        num_loss: usize,
    ) -> Result<Self, LassoError> {
        if y.len() != x.nrows() {
            return Err(LassoError::DimensionMismatch {
                what: "response",
                expected: x.nrows(),
                found: y.len(),
            });
        }
        if num_loss == 0 || num_loss > x.nrows() {
            return Err(LassoError::InvalidConfig(format!(
                "num_loss must lie in [1, {}], got {}",
                x.nrows(),
                num_loss
            )));
        }
        if !(gamma > 1.0) {
            return Err(LassoError::InvalidConfig(format!(
                "gamma must be > 1, got {}",
                gamma
            )));
        }
        check_penalty_factor(x.ncols(), &penalty_factor)?;

        let xy = x.rows(0, num_loss).tr_mul(&y.rows(0, num_loss));
        let lambda0 = penalized_max(&xy, &penalty_factor);
        let mean = y.mean();
        let null_dev = y.iter().map(|v| (v - mean) * (v - mean)).sum();

        Ok(McpCoord {
            x,
            y,
            num_loss,
            penalty_factor,
            gamma,
            lambda0,
            lambda: 0.0,
            null_dev,
            objective: null_dev,
        })
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    pub fn num_loss(&self) -> usize {
        self.num_loss
    }

    pub fn null_dev(&self) -> f64 {
        self.null_dev
    }

    /// Penalized objective recorded by the latest stopping test.
    pub fn objective(&self) -> f64 {
        self.objective
    }

    fn penalized_objective(&self, state: &CoordState) -> f64 {
        let (lambda, gamma) = (self.lambda, self.gamma);
        let penalty: f64 = state
            .beta
            .iter()
            .map(|b| {
                let abs_beta = b.abs();
                if abs_beta < lambda * gamma {
                    lambda * (abs_beta - 0.5 * b * b / (lambda * gamma))
                } else {
                    0.5 * lambda * lambda * gamma
                }
            })
            .sum();
        0.5 * state.resid.norm_squared() + penalty
    }
}

impl CoordProblem for McpCoord<'_> {
    fn loss_design(&self) -> na::DMatrixView<'_, f64> {
        self.x.rows(0, self.num_loss)
    }

    fn loss_response(&self) -> na::DVectorView<'_, f64> {
        self.y.rows(0, self.num_loss)
    }

    fn lambda_zero(&self) -> f64 {
        self.lambda0
    }

    /// A cold start also resets the recorded objective to the null
    /// deviance; a warm start keeps the previous lambda's objective.
    fn set_lambda(&mut self, lambda: f64, cold_start: bool) {
        self.lambda = lambda;
        if cold_start {
            self.objective = self.null_dev;
        }
    }

    fn threshold(&self, j: usize, grad: f64, xsq: f64) -> f64 {
        let factor = self.penalty_factor.get(j).copied().unwrap_or(1.0);
        mcp_threshold(grad, factor * self.lambda / xsq, self.gamma)
    }

    /// Stops once the penalized objective changes by less than
    /// `tol * null_dev` between two sweeps.
    fn converged(&mut self, state: &CoordState, tol: f64) -> bool {
        let objective_prev = self.objective;
        self.objective = self.penalized_objective(state);
        (objective_prev - self.objective).abs() < self.null_dev * tol
    }
}
