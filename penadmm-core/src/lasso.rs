//! Squared-loss Lasso, `1/2 ||y - X b||^2 + lambda ||b||_1`, as an ADMM
//! model and as a coordinate descent model.
extern crate nalgebra as na;

use crate::{
    coord::CoordProblem,
    ops::{soft_threshold, soft_threshold_sparse},
    problem::{AdmmProblem, AdmmState},
    sparse::SparseVector,
    utils::{
        GramFactor, LassoError, check_penalty_factor, max_abs, penalized_max, zero_is_optimal,
    },
};

fn check_response(x: &na::DMatrix<f64>, y: &na::DVector<f64>) -> Result<(), LassoError> {
    if y.len() != x.nrows() {
        return Err(LassoError::DimensionMismatch {
            what: "response",
            expected: x.nrows(),
            found: y.len(),
        });
    }
    Ok(())
}

/// Lasso in ADMM form with constraint `x - z = 0`.
///
/// The x-update solves `(X'X + rho I) x = X'y - adj_y + rho * adj_z` with a
/// cached [`GramFactor`]; the factor is rebuilt only when rho changes, so a
/// path with fixed rho factorizes once.
pub struct LassoAdmm<'a> {
    x: &'a na::DMatrix<f64>,
    xy: na::DVector<f64>,
    lambda0: f64,
    lambda: f64,
    factor: Option<GramFactor>,
    factor_rho: f64,
}

impl<'a> LassoAdmm<'a> {
    pub fn new(x: &'a na::DMatrix<f64>, y: &'a na::DVector<f64>) -> Result<Self, LassoError> {
        check_response(x, y)?;
        let xy = x.tr_mul(y);
        let lambda0 = max_abs(&xy);
        Ok(LassoAdmm {
            x,
            xy,
            lambda0,
            lambda: 0.0,
            factor: None,
            factor_rho: f64::NAN,
        })
    }
}

impl AdmmProblem for LassoAdmm<'_> {
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
        if self.factor.is_none() || self.factor_rho != rho {
            log::debug!("[LassoAdmm] factorizing for rho = {:e}", rho);
            self.factor = Some(GramFactor::new(self.x, rho)?);
            self.factor_rho = rho;
        }
        Ok(())
    }

    fn next_x(&mut self, state: &AdmmState) -> Result<na::DVector<f64>, LassoError> {
        let factor = self.factor.as_ref().ok_or_else(|| {
            LassoError::Factorization("x-update called before set_penalty".to_string())
        })?;
        let mut rhs = &self.xy - &state.adj_y;
        state.adj_z.add_scaled_to(&mut rhs, state.rho);
        factor.solve(self.x, &rhs)
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
        zero_is_optimal(&self.xy, lambda, &[]).then(|| self.xy.clone())
    }
}

/// Lasso for the coordinate descent engine, with optional per-coefficient
/// penalty factors.
pub struct LassoCoord<'a> {
    x: &'a na::DMatrix<f64>,
    y: &'a na::DVector<f64>,
    xy: na::DVector<f64>,
    penalty_factor: Vec<f64>,
    lambda0: f64,
    lambda: f64,
}

impl<'a> LassoCoord<'a> {
    pub fn new(x: &'a na::DMatrix<f64>, y: &'a na::DVector<f64>) -> Result<Self, LassoError> {
        check_response(x, y)?;
        let xy = x.tr_mul(y);
        let lambda0 = max_abs(&xy);
        Ok(LassoCoord {
            x,
            y,
            xy,
            penalty_factor: Vec::new(),
            lambda0,
            lambda: 0.0,
        })
    }

    /// Scales the penalty of coefficient `j` by `penalty_factor[j]`; a zero
    /// factor leaves the coefficient unpenalized.
    pub fn with_penalty_factor(mut self, penalty_factor: Vec<f64>) -> Result<Self, LassoError> {
        check_penalty_factor(self.x.ncols(), &penalty_factor)?;
        self.lambda0 = penalized_max(&self.xy, &penalty_factor);
        self.penalty_factor = penalty_factor;
        Ok(self)
    }
}

impl CoordProblem for LassoCoord<'_> {
    fn loss_design(&self) -> na::DMatrixView<'_, f64> {
        self.x.rows(0, self.x.nrows())
    }

    fn loss_response(&self) -> na::DVectorView<'_, f64> {
        self.y.rows(0, self.y.len())
    }

    fn lambda_zero(&self) -> f64 {
        self.lambda0
    }

    fn set_lambda(&mut self, lambda: f64, _cold_start: bool) {
        self.lambda = lambda;
    }

    fn threshold(&self, j: usize, grad: f64, xsq: f64) -> f64 {
        let factor = self.penalty_factor.get(j).copied().unwrap_or(1.0);
        soft_threshold(grad, factor * self.lambda / xsq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{coord::CoordSolver, problem::AdmmSolver, spectral::SpectralRadiusEstimator};
    use approx::assert_relative_eq;

    fn data(n: usize, p: usize) -> (na::DMatrix<f64>, na::DVector<f64>) {
        let x = na::DMatrix::from_fn(n, p, |i, j| {
            ((i * 13 + j * 7) % 17) as f64 / 8.0 - 1.0 + 0.05 * ((i + j) as f64).sin()
        });
        let mut beta = na::DVector::zeros(p);
        beta[0] = 2.0;
        beta[2] = -1.5;
        let y = &x * &beta + na::DVector::from_fn(n, |i, _| 0.1 * (i as f64 * 0.7).cos());
        (x, y)
    }

    fn objective(x: &na::DMatrix<f64>, y: &na::DVector<f64>, b: &na::DVector<f64>, lambda: f64) -> f64 {
        0.5 * (y - x * b).norm_squared() + lambda * b.lp_norm(1)
    }

    #[test]
    fn response_length_is_checked() {
        let (x, _) = data(10, 3);
        let y = na::DVector::zeros(9);
        assert!(matches!(
            LassoAdmm::new(&x, &y),
            Err(LassoError::DimensionMismatch { what: "response", .. })
        ));
    }

    #[test]
    fn zero_solution_above_lambda_zero() {
        let (x, y) = data(40, 6);
        let model = LassoAdmm::new(&x, &y).unwrap();
        let lambda = model.lambda_zero() * 1.01;
        let mut solver = AdmmSolver::new(model, 1e-8, 1e-8, SpectralRadiusEstimator::default());
        solver.init(lambda, 1.0).unwrap();
        solver.solve(5000).unwrap();
        assert_eq!(solver.coefficients().nnz(), 0);
    }

    #[test]
    fn exact_zero_at_lambda_zero() {
        let (x, y) = data(40, 6);
        let model = LassoAdmm::new(&x, &y).unwrap();
        let lambda0 = model.lambda_zero();
        let mut solver = AdmmSolver::new(model, 1e-6, 1e-6, SpectralRadiusEstimator::default());
        solver.init(lambda0, 0.0).unwrap();
        assert_eq!(solver.solve(5000).unwrap(), 0);
        assert!(solver.converged());
        assert_eq!(solver.coefficients().nnz(), 0);
        assert_eq!(solver.state().main_x.amax(), 0.0);
        assert_eq!(solver.state().dual_y, x.tr_mul(&y));

        // the dual at zero is a valid warm start for the next value
        solver.init_warm(0.5 * lambda0).unwrap();
        assert!(solver.solve(5000).unwrap() > 0);
        assert!(solver.converged());
        assert!(solver.coefficients().nnz() > 0);
    }

    #[test]
    fn admm_and_coordinate_descent_agree() {
        let (x, y) = data(50, 8);
        let lambda = 0.2 * max_abs(&x.tr_mul(&y));

        let mut admm = AdmmSolver::new(
            LassoAdmm::new(&x, &y).unwrap(),
            1e-10,
            1e-10,
            SpectralRadiusEstimator::default(),
        );
        admm.init(lambda, 0.0).unwrap();
        admm.solve(20_000).unwrap();
        assert!(admm.converged());

        let mut cd = CoordSolver::new(LassoCoord::new(&x, &y).unwrap(), 1e-12);
        cd.init(lambda);
        cd.solve(100_000);
        assert!(cd.converged());

        let z = admm.coefficients().to_dense();
        assert!((&z - cd.coefficients()).amax() < 1e-5);
        assert_relative_eq!(
            objective(&x, &y, &z, lambda),
            objective(&x, &y, cd.coefficients(), lambda),
            max_relative = 1e-7
        );
    }

    #[test]
    fn fat_design_uses_woodbury_path() {
        let (x, y) = data(6, 20);
        let lambda = 0.3 * max_abs(&x.tr_mul(&y));
        let mut admm = AdmmSolver::new(
            LassoAdmm::new(&x, &y).unwrap(),
            1e-10,
            1e-10,
            SpectralRadiusEstimator::default(),
        );
        admm.init(lambda, 1.0).unwrap();
        admm.solve(50_000).unwrap();
        assert!(admm.converged());

        // KKT: |X'(y - Xb)|_j <= lambda, with equality on the support
        let b = admm.coefficients().to_dense();
        let grad = x.tr_mul(&(&y - &x * &b));
        for j in 0..20 {
            assert!(grad[j].abs() <= lambda * (1.0 + 1e-4));
            if b[j] != 0.0 {
                assert_relative_eq!(grad[j], lambda * b[j].signum(), max_relative = 1e-3);
            }
        }
    }

    #[test]
    fn warm_start_keeps_state() {
        let (x, y) = data(30, 5);
        let lambda0 = max_abs(&x.tr_mul(&y));
        let mut solver = AdmmSolver::new(
            LassoAdmm::new(&x, &y).unwrap(),
            1e-8,
            1e-8,
            SpectralRadiusEstimator::default(),
        );
        solver.init(0.5 * lambda0, 2.0).unwrap();
        solver.solve(3000).unwrap();
        let z = solver.coefficients().clone();
        let y_dual = solver.state().dual_y.clone();

        solver.init_warm(0.4 * lambda0).unwrap();
        assert_eq!(solver.coefficients(), &z);
        assert_eq!(solver.state().dual_y, y_dual);
        assert_eq!(solver.rho(), 2.0);
        assert!(!solver.rho_auto());
    }

    #[test]
    fn zero_penalty_factor_leaves_coefficient_free() {
        let (x, y) = data(40, 4);
        let lambda0 = max_abs(&x.tr_mul(&y));
        let model = LassoCoord::new(&x, &y)
            .unwrap()
            .with_penalty_factor(vec![1.0, 0.0, 1.0, 1.0])
            .unwrap();
        let mut cd = CoordSolver::new(model, 1e-10);
        cd.init(10.0 * lambda0);
        cd.solve(10_000);
        let b = cd.coefficients();
        assert_eq!(b[0], 0.0);
        assert_eq!(b[2], 0.0);
        assert!(b[1] != 0.0);
    }

    #[test]
    fn penalty_factor_length_is_checked() {
        let (x, y) = data(10, 3);
        let res = LassoCoord::new(&x, &y).unwrap().with_penalty_factor(vec![1.0; 2]);
        assert!(matches!(res, Err(LassoError::DimensionMismatch { .. })));
    }
}
