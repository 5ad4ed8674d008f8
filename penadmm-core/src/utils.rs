extern crate nalgebra as na;

#[cfg(any(feature = "accelerate", feature = "openblas", feature = "netlib"))]
use nalgebra_lapack::Cholesky;
use thiserror::Error;

/// Error type for the solvers, factorizations and path driver.
///
/// `LassoError` is the primary error type used throughout the library.
/// Running out of iterations is *not* an error: solvers report it through
/// their iteration counts and convergence flags instead.
///
/// # Example
///
/// ```rust
/// # use penadmm_core::utils::LassoError;
///
/// fn might_fail() -> Result<(), LassoError> {
///     Err(LassoError::InvalidConfig("gamma must be > 1".to_string()))
/// }
/// ```
#[derive(Debug, Error)]
pub enum LassoError {
    /// A configuration value is out of range; raised before any iteration runs
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Two inputs that must agree in size do not
    #[error("dimension mismatch for {what}: expected {expected}, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    /// A symmetric system could not be factorized
    #[error("factorization failed: {0}")]
    Factorization(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// A problem or config file could not be encoded or decoded
    #[error("encoding error: {0}")]
    Encoding(String),
}

impl From<serde_json::Error> for LassoError {
    fn from(e: serde_json::Error) -> Self {
        LassoError::Encoding(e.to_string())
    }
}

impl From<bincode::error::EncodeError> for LassoError {
    fn from(e: bincode::error::EncodeError) -> Self {
        LassoError::Encoding(e.to_string())
    }
}

impl From<bincode::error::DecodeError> for LassoError {
    fn from(e: bincode::error::DecodeError) -> Self {
        LassoError::Encoding(e.to_string())
    }
}

/// Cholesky factorization of a symmetric positive definite matrix.
///
/// Uses LAPACK's Cholesky when any LAPACK backend feature is enabled
/// (accelerate, openblas, or netlib) and nalgebra's built-in Cholesky
/// otherwise.
pub struct SymmetricFactor {
    #[cfg(any(feature = "accelerate", feature = "openblas", feature = "netlib"))]
    chol: Cholesky<f64, na::Dyn>,
    #[cfg(not(any(feature = "accelerate", feature = "openblas", feature = "netlib")))]
    chol: na::Cholesky<f64, na::Dyn>,
}

impl SymmetricFactor {
    /// Factorizes `m`, which must be symmetric positive definite.
    pub fn new(m: na::DMatrix<f64>) -> Result<Self, LassoError> {
        let dim = m.nrows();

        #[cfg(any(feature = "accelerate", feature = "openblas", feature = "netlib"))]
        let chol = Cholesky::new(m);

        #[cfg(not(any(feature = "accelerate", feature = "openblas", feature = "netlib")))]
        let chol = m.cholesky();

        chol.map(|chol| SymmetricFactor { chol }).ok_or_else(|| {
            LassoError::Factorization(format!(
                "{}x{} system is not positive definite",
                dim, dim
            ))
        })
    }

    /// Solves `M v = b` with the stored factor.
    pub fn solve(&self, b: &na::DVector<f64>) -> Result<na::DVector<f64>, LassoError> {
        #[cfg(any(feature = "accelerate", feature = "openblas", feature = "netlib"))]
        {
            self.chol
                .solve(b)
                .ok_or_else(|| LassoError::Factorization("triangular solve failed".to_string()))
        }

        #[cfg(not(any(feature = "accelerate", feature = "openblas", feature = "netlib")))]
        {
            Ok(self.chol.solve(b))
        }
    }
}

/// Factorization of `X'X + rho * I` for the quadratic x-update.
///
/// Automatically chooses between two approaches based on the matrix dimensions:
///
/// 1. Sherman-Morrison-Woodbury for "fat" matrices (n < p/2), so only the
///    n×n system `rho * I + X X'` is ever factorized
/// 2. Cholesky decomposition of the p×p system otherwise
///
/// # Usage in ADMM
///
/// Solves systems of the form `(X'X + rho I) x = X'y - adj_y + rho * adj_z`
/// once per outer iteration, reusing the factor until `rho` changes.
pub enum GramFactor {
    Cholesky(SymmetricFactor),
    Woodbury { rho: f64, inner: SymmetricFactor },
}

impl GramFactor {
    pub fn new(x: &na::DMatrix<f64>, rho: f64) -> Result<Self, LassoError> {
        let n = x.nrows();
        let p = x.ncols();

        if n < p / 2 {
            // rho*I + X*X'
            let mut xxt = x * x.transpose();
            for i in 0..n {
                xxt[(i, i)] += rho;
            }
            Ok(GramFactor::Woodbury {
                rho,
                inner: SymmetricFactor::new(xxt)?,
            })
        } else {
            let mut xtx = x.tr_mul(x);
            for i in 0..p {
                xtx[(i, i)] += rho;
            }
            Ok(GramFactor::Cholesky(SymmetricFactor::new(xtx)?))
        }
    }

    pub fn solve(
        &self,
        x: &na::DMatrix<f64>,
        rhs: &na::DVector<f64>,
    ) -> Result<na::DVector<f64>, LassoError> {
        match self {
            GramFactor::Cholesky(factor) => factor.solve(rhs),
            GramFactor::Woodbury { rho, inner } => {
                // (X'X + rho*I)^-1 v = (v - X'(rho*I + XX')^-1 X v) / rho
                let t = inner.solve(&(x * rhs))?;
                Ok((rhs - x.tr_mul(&t)) / *rho)
            }
        }
    }
}

/// Computes `X' diag(w) X`.
pub fn weighted_gram(x: &na::DMatrix<f64>, w: &na::DVector<f64>) -> na::DMatrix<f64> {
    let mut wx = x.clone();
    for (i, mut row) in wx.row_iter_mut().enumerate() {
        row *= w[i];
    }
    x.tr_mul(&wx)
}

/// Infinity norm of a vector, or 0 for an empty one.
pub fn max_abs(v: &na::DVector<f64>) -> f64 {
    v.iter().fold(0.0f64, |acc, x| acc.max(x.abs()))
}

/// `max_j |v_j| / f_j` over coordinates with a positive factor; with no
/// factors this is `max_abs(v)`.
pub fn penalized_max(v: &na::DVector<f64>, penalty_factor: &[f64]) -> f64 {
    if penalty_factor.is_empty() {
        return max_abs(v);
    }
    v.iter()
        .zip(penalty_factor)
        .filter(|(_, f)| **f > 0.0)
        .fold(0.0f64, |acc, (x, f)| acc.max(x.abs() / f))
}

/// Whether `b = 0` satisfies the L1 optimality conditions
/// `|v_j| <= f_j * lambda`, where `v` is the negative loss gradient at zero.
///
/// A few ulps of slack absorb the rounding of path scalings such as
/// `(lambda0 / alpha) * alpha`.
pub fn zero_is_optimal(v: &na::DVector<f64>, lambda: f64, penalty_factor: &[f64]) -> bool {
    let bound = lambda * (1.0 + 4.0 * f64::EPSILON);
    v.iter().enumerate().all(|(j, x)| {
        let factor = penalty_factor.get(j).copied().unwrap_or(1.0);
        x.abs() <= factor * bound
    })
}

/// Checks that `penalty_factor` is empty or holds `p` non-negative values.
pub fn check_penalty_factor(p: usize, penalty_factor: &[f64]) -> Result<(), LassoError> {
    if !penalty_factor.is_empty() && penalty_factor.len() != p {
        return Err(LassoError::DimensionMismatch {
            what: "penalty_factor",
            expected: p,
            found: penalty_factor.len(),
        });
    }
    if penalty_factor.iter().any(|f| !(*f >= 0.0)) {
        return Err(LassoError::InvalidConfig(
            "penalty factors must be non-negative".to_string(),
        ));
    }
    Ok(())
}

/// Computes the optimal Lasso objective value with linfa's elastic net.
///
/// Intended as a cross-check of the solvers in this crate, not for
/// production use. The objective is `0.5 * ||y - X b||^2 + lambda * ||b||_1`;
/// linfa minimizes the average loss, hence the `lambda / n` penalty.
#[cfg(feature = "linfa")]
pub fn find_p_star_linfa(
    x: &na::DMatrix<f64>,
    y: &na::DVector<f64>,
    lambda: f64,
) -> Result<f64, LassoError> {
    use linfa::prelude::*;
    use linfa_elasticnet::ElasticNet;
    use ndarray::{Array, Array1};

    let n = x.nrows();
    let p = x.ncols();

    let x_nd = Array::from_shape_fn((n, p), |(i, j)| x[(i, j)]);
    let y_nd = Array1::from_vec(y.as_slice().to_vec());
    let dataset = Dataset::new(x_nd.clone(), y_nd.clone());

    let model = ElasticNet::lasso()
        .penalty(lambda / n as f64)
        .with_intercept(false)
        .fit(&dataset)
        .map_err(|e| LassoError::Factorization(format!("linfa fit failed: {}", e)))?;

    let beta = model.hyperplane().to_owned();
    let resid = x_nd.dot(&beta) - y_nd;
    let sq_norm = resid.mapv(|v| v * v).sum();
    let l1 = beta.mapv(f64::abs).sum();

    Ok(0.5 * sq_norm + lambda * l1)
}
