//! Lasso with an additional fused ridge penalty `||D b||^2` for a sparse
//! structure matrix `D`.
extern crate nalgebra as na;

use sprs::{CsMat, TriMat};

use crate::{
    ops::soft_threshold_sparse,
    problem::{AdmmProblem, AdmmState},
    sparse::SparseVector,
    utils::{LassoError, SymmetricFactor, check_penalty_factor, penalized_max, zero_is_optimal},
};

/// The `(p - 1) x p` first-difference matrix, row `i` being `b_{i+1} - b_i`.
pub fn first_difference(p: usize) -> CsMat<f64> {
    let rows = p.saturating_sub(1);
    let mut tri = TriMat::new((rows, p));
    for i in 0..rows {
        tri.add_triplet(i, i, -1.0);
        tri.add_triplet(i, i + 1, 1.0);
    }
    tri.to_csr()
}

/// Dense `D'D` accumulated from the rows of a sparse `D`, in either
/// storage order.
pub fn structure_gram(d: &CsMat<f64>) -> na::DMatrix<f64> {
    let p = d.cols();
    let d = d.to_csr();
    let mut dd = na::DMatrix::zeros(p, p);
    for row in d.outer_iterator() {
        for (ja, &va) in row.iter() {
            for (jb, &vb) in row.iter() {
                dd[(ja, jb)] += va * vb;
            }
        }
    }
    dd
}

/// Generalized ridge Lasso,
///
/// ```text
/// 1/2 ||y - X b||^2 + lambda * sum_j f_j |b_j| + lambda (1 - alpha) / (2 alpha) ||D b||^2
/// ```
///
/// where `lambda` is the L1 weight the solver runs with. Along a path the
/// solver weight is `alpha` times the path value, see [`AdmmProblem::solver_lambda`].
///
/// The x-update system `X'X + lambda (1 - alpha) / alpha * D'D + rho I` is
/// factorized once per distinct `(rho, lambda, alpha)`.
pub struct GenRidgeAdmm<'a> {
    x: &'a na::DMatrix<f64>,
    xy: na::DVector<f64>,
    xx: na::DMatrix<f64>,
    dd: na::DMatrix<f64>,
    alpha: f64,
    penalty_factor: Vec<f64>,
    lambda0: f64,
    lambda: f64,
    factor: Option<SymmetricFactor>,
    /// (rho, lambda, alpha) the current factor was built for
    factor_key: (f64, f64, f64),
    factorizations: usize,
}

impl<'a> GenRidgeAdmm<'a> {
    pub fn new(
        x: &'a na::DMatrix<f64>,
        y: &'a na::DVector<f64>,
        d: &CsMat<f64>,
        alpha: f64,
    ) -> Result<Self, LassoError> {
        if y.len() != x.nrows() {
            return Err(LassoError::DimensionMismatch {
                what: "response",
                expected: x.nrows(),
                found: y.len(),
            });
        }
        if d.cols() != x.ncols() {
            return Err(LassoError::DimensionMismatch {
                what: "structure matrix columns",
                expected: x.ncols(),
                found: d.cols(),
            });
        }
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(LassoError::InvalidConfig(format!(
                "alpha must lie in (0, 1], got {}",
                alpha
            )));
        }
        let xy = x.tr_mul(y);
        let lambda0 = penalized_max(&xy, &[]);
        Ok(GenRidgeAdmm {
            x,
            xy,
            xx: x.tr_mul(x),
            dd: structure_gram(d),
            alpha,
            penalty_factor: Vec::new(),
            lambda0,
            lambda: 0.0,
            factor: None,
            factor_key: (f64::NAN, f64::NAN, f64::NAN),
            factorizations: 0,
        })
    }

    pub fn with_penalty_factor(mut self, penalty_factor: Vec<f64>) -> Result<Self, LassoError> {
        check_penalty_factor(self.x.ncols(), &penalty_factor)?;
        self.lambda0 = penalized_max(&self.xy, &penalty_factor);
        self.penalty_factor = penalty_factor;
        Ok(self)
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Number of system factorizations performed so far.
    pub fn factorizations(&self) -> usize {
        self.factorizations
    }

    fn refactor(&mut self, rho: f64) -> Result<(), LassoError> {
        let key = (rho, self.lambda, self.alpha);
        if self.factor.is_some() && self.factor_key == key {
            return Ok(());
        }
        let ridge = self.lambda * (1.0 - self.alpha) / self.alpha;
        let mut system = &self.xx + &self.dd * ridge;
        for i in 0..system.nrows() {
            system[(i, i)] += rho;
        }
        log::debug!(
            "[GenRidge] factorizing for rho = {:e}, lambda = {:e}, alpha = {}",
            rho,
            self.lambda,
            self.alpha
        );
        self.factor = Some(SymmetricFactor::new(system)?);
        self.factor_key = key;
        self.factorizations += 1;
        Ok(())
    }
}

impl AdmmProblem for GenRidgeAdmm<'_> {
    fn dim_main(&self) -> usize {
        self.x.ncols()
    }

    fn lambda_zero(&self) -> f64 {
        self.lambda0
    }

    /// Path value at which the solver weight `alpha * lambda` reaches
    /// `lambda_zero`.
    fn lambda_max(&self) -> f64 {
        self.lambda0 / self.alpha
    }

    fn solver_lambda(&self, path_lambda: f64) -> f64 {
        path_lambda * self.alpha
    }

    fn design(&self) -> &na::DMatrix<f64> {
        self.x
    }

    fn set_penalty(&mut self, lambda: f64, rho: f64) -> Result<(), LassoError> {
        self.lambda = lambda;
        self.refactor(rho)
    }

    fn next_x(&mut self, state: &AdmmState) -> Result<na::DVector<f64>, LassoError> {
        let factor = self.factor.as_ref().ok_or_else(|| {
            LassoError::Factorization("x-update called before set_penalty".to_string())
        })?;
        let mut rhs = &self.xy - &state.adj_y;
        state.adj_z.add_scaled_to(&mut rhs, state.rho);
        factor.solve(&rhs)
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
        soft_threshold_sparse(&v, self.lambda / state.rho, &self.penalty_factor)
    }

    fn zero_solution_dual(&self, lambda: f64) -> Option<na::DVector<f64>> {
        zero_is_optimal(&self.xy, lambda, &self.penalty_factor).then(|| self.xy.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lasso::LassoAdmm, problem::AdmmSolver, spectral::SpectralRadiusEstimator};

    fn data(n: usize, p: usize) -> (na::DMatrix<f64>, na::DVector<f64>) {
        let x = na::DMatrix::from_fn(n, p, |i, j| (((i + 1) * (j + 2)) as f64 * 0.61).sin());
        // piecewise constant signal
        let beta = na::DVector::from_fn(p, |j, _| if j < p / 2 { 1.0 } else { 0.0 });
        let y = &x * &beta;
        (x, y)
    }

    #[test]
    fn first_difference_structure() {
        let d = first_difference(4);
        assert_eq!((d.rows(), d.cols()), (3, 4));
        let dd = structure_gram(&d);
        let expected = na::DMatrix::from_row_slice(
            4,
            4,
            &[
                1.0, -1.0, 0.0, 0.0, //
                -1.0, 2.0, -1.0, 0.0, //
                0.0, -1.0, 2.0, -1.0, //
                0.0, 0.0, -1.0, 1.0,
            ],
        );
        assert_eq!(dd, expected);
        assert_eq!(first_difference(1).rows(), 0);
        // column-major storage gives the same Gram matrix
        assert_eq!(structure_gram(&first_difference(4).to_csc()), expected);
    }

    #[test]
    fn structure_columns_must_match() {
        let (x, y) = data(10, 5);
        let d = first_difference(4);
        assert!(matches!(
            GenRidgeAdmm::new(&x, &y, &d, 0.5),
            Err(LassoError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn path_scaling_by_alpha() {
        let (x, y) = data(20, 6);
        let d = first_difference(6);
        let model = GenRidgeAdmm::new(&x, &y, &d, 0.25).unwrap();
        assert_eq!(model.alpha(), 0.25);
        assert_eq!(model.lambda_max(), model.lambda_zero() * 4.0);
        assert_eq!(model.solver_lambda(2.0), 0.5);
    }

    #[test]
    fn factorization_reused_while_penalty_is_fixed() {
        let (x, y) = data(20, 6);
        let d = first_difference(6);
        let model = GenRidgeAdmm::new(&x, &y, &d, 0.5).unwrap();
        let lambda = 0.1 * model.lambda_zero();
        let mut solver = AdmmSolver::new(model, 1e-8, 1e-8, SpectralRadiusEstimator::default());
        solver.init(lambda, 1.0).unwrap();
        solver.solve(500).unwrap();
        assert_eq!(solver.problem().factorizations(), 1);

        // same lambda and rho: no new factorization
        solver.init_warm(lambda).unwrap();
        assert_eq!(solver.problem().factorizations(), 1);

        solver.init_warm(0.5 * lambda).unwrap();
        assert_eq!(solver.problem().factorizations(), 2);
    }

    #[test]
    fn alpha_one_is_plain_lasso() {
        let (x, y) = data(30, 6);
        let d = first_difference(6);
        let ridge = GenRidgeAdmm::new(&x, &y, &d, 1.0).unwrap();
        let lambda = 0.2 * ridge.lambda_zero();

        let mut a = AdmmSolver::new(ridge, 1e-10, 1e-10, SpectralRadiusEstimator::default());
        a.init(lambda, 1.0).unwrap();
        a.solve(20_000).unwrap();

        let mut b = AdmmSolver::new(
            LassoAdmm::new(&x, &y).unwrap(),
            1e-10,
            1e-10,
            SpectralRadiusEstimator::default(),
        );
        b.init(lambda, 1.0).unwrap();
        b.solve(20_000).unwrap();

        let diff = a.coefficients().to_dense() - b.coefficients().to_dense();
        assert!(diff.amax() < 1e-6);
    }

    #[test]
    fn fused_penalty_smooths_coefficients() {
        let (x, y) = data(40, 8);
        let d = first_difference(8);
        let roughness = |b: &na::DVector<f64>| (1..b.len()).map(|j| (b[j] - b[j - 1]).powi(2)).sum::<f64>();

        let mut fits = Vec::new();
        for alpha in [1.0, 0.05] {
            let model = GenRidgeAdmm::new(&x, &y, &d, alpha).unwrap();
            let lambda = model.solver_lambda(0.05 * model.lambda_max());
            let mut solver = AdmmSolver::new(model, 1e-9, 1e-9, SpectralRadiusEstimator::default());
            solver.init(lambda, 0.0).unwrap();
            solver.solve(20_000).unwrap();
            fits.push(solver.coefficients().to_dense());
        }
        assert!(roughness(&fits[1]) <= roughness(&fits[0]) + 1e-8);
    }
}
