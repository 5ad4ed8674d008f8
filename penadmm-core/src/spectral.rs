extern crate nalgebra as na;

use rand::{Rng, SeedableRng, rngs::SmallRng};
use rand_distr::StandardNormal;

/// A symmetric positive semi-definite linear operator.
pub trait SymmetricOperator {
    fn dim(&self) -> usize;
    fn apply(&self, v: &na::DVector<f64>) -> na::DVector<f64>;
}

/// The Gram operator `v -> X'(X v)`, applied without forming `X'X`.
pub struct GramOperator<'a> {
    x: &'a na::DMatrix<f64>,
}

impl<'a> GramOperator<'a> {
    pub fn new(x: &'a na::DMatrix<f64>) -> Self {
        GramOperator { x }
    }
}

impl SymmetricOperator for GramOperator<'_> {
    fn dim(&self) -> usize {
        self.x.ncols()
    }

    fn apply(&self, v: &na::DVector<f64>) -> na::DVector<f64> {
        self.x.tr_mul(&(self.x * v))
    }
}

impl SymmetricOperator for na::DMatrix<f64> {
    fn dim(&self) -> usize {
        self.nrows()
    }

    fn apply(&self, v: &na::DVector<f64>) -> na::DVector<f64> {
        self * v
    }
}

/// Estimates the largest eigenvalue of a symmetric PSD operator.
///
/// Runs power iteration from a random start vector drawn from a
/// `SmallRng` seeded with `seed`, so repeated fits on the same data pick
/// the same `rho`.
#[derive(Clone, Debug)]
pub struct SpectralRadiusEstimator {
    seed: u64,
    max_iter: usize,
    tol: f64,
}

impl Default for SpectralRadiusEstimator {
    fn default() -> Self {
        SpectralRadiusEstimator {
            seed: 0,
            max_iter: 100,
            tol: 1e-4,
        }
    }
}

impl SpectralRadiusEstimator {
    pub fn new(seed: u64, max_iter: usize, tol: f64) -> Self {
        SpectralRadiusEstimator {
            seed,
            max_iter,
            tol,
        }
    }

    pub fn estimate<O: SymmetricOperator>(&self, op: &O) -> f64 {
        let n = op.dim();
        if n == 0 {
            return 0.0;
        }

        let mut rng = SmallRng::seed_from_u64(self.seed);
        let mut v = na::DVector::<f64>::from_fn(n, |_, _| rng.sample(StandardNormal));
        let norm = v.norm();
        if norm == 0.0 {
            v[0] = 1.0;
        } else {
            v /= norm;
        }

        let mut estimate = 0.0;
        for i in 0..self.max_iter {
            let w = op.apply(&v);
            let rayleigh = v.dot(&w);
            let w_norm = w.norm();
            if w_norm == 0.0 {
                return 0.0;
            }
            v = w / w_norm;

            if i > 0 && (rayleigh - estimate).abs() <= self.tol * rayleigh.abs() {
                log::debug!("[SpectralRadius] converged after {} iterations", i + 1);
                return rayleigh;
            }
            estimate = rayleigh;
        }
        estimate
    }
}

/// The ADMM penalty `sigma^(1/3) * lambda^(2/3)`.
pub fn auto_rho(sigma: f64, lambda: f64) -> f64 {
    sigma.cbrt() * lambda.powf(2.0 / 3.0)
}
