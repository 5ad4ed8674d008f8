extern crate nalgebra as na;

use rand::{Rng, SeedableRng, rngs::SmallRng};
use rand_distr::{Normal, StandardNormal};
#[cfg(feature = "rayon")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{ops::sigmoid, utils::LassoError};

const BINCODE_CONFIG: bincode::config::Configuration = bincode::config::standard()
    .with_little_endian()
    .with_variable_int_encoding();

/// A regression problem: design, response and, for synthetic data, the
/// coefficients that generated it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub x: na::DMatrix<f64>,
    pub y: na::DVector<f64>,
    pub beta_true: Option<na::DVector<f64>>,
}

impl Dataset {
    pub fn new(x: na::DMatrix<f64>, y: na::DVector<f64>) -> Result<Self, LassoError> {
        if y.len() != x.nrows() {
            return Err(LassoError::DimensionMismatch {
                what: "response",
                expected: x.nrows(),
                found: y.len(),
            });
        }
        Ok(Dataset {
            x,
            y,
            beta_true: None,
        })
    }

    pub fn nrows(&self) -> usize {
        self.x.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.x.ncols()
    }

    pub fn save(&self, path: &Path) -> Result<(), LassoError> {
        let bytes = bincode::serde::encode_to_vec(self, BINCODE_CONFIG)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, LassoError> {
        let bytes = std::fs::read(path)?;
        let (dataset, _): (Dataset, _) = bincode::serde::decode_from_slice(&bytes, BINCODE_CONFIG)?;
        if dataset.y.len() != dataset.x.nrows() {
            return Err(LassoError::DimensionMismatch {
                what: "response",
                expected: dataset.x.nrows(),
                found: dataset.y.len(),
            });
        }
        Ok(dataset)
    }

    /// Gaussian response `y = X beta + e` with `e ~ N(0, noise^2)` and `k`
    /// standard normal coefficients at random positions.
    pub fn synthetic_gaussian(
        n: usize,
        p: usize,
        k: usize,
        noise: f64,
        seed: u64,
    ) -> Result<Self, LassoError> {
        check_shape(n, p, k)?;
        if !(noise >= 0.0) || !noise.is_finite() {
            return Err(LassoError::InvalidConfig(format!(
                "noise level must be finite and non-negative, got {}",
                noise
            )));
        }
        let noise_dist = Normal::new(0.0, noise).map_err(|e| {
            LassoError::InvalidConfig(format!("noise level {} rejected: {}", noise, e))
        })?;

        let x = standardized_design(n, p, seed);
        let mut rng = SmallRng::seed_from_u64(seed);
        let beta = sparse_coefficients(&mut rng, p, k);
        let errors = na::DVector::from_fn(n, |_, _| rng.sample(noise_dist));
        let y = &x * &beta + errors;

        Ok(Dataset {
            x,
            y,
            beta_true: Some(beta),
        })
    }

    /// Binary response with `P(y_i = 1) = sigmoid(x_i' beta)`.
    pub fn synthetic_binomial(n: usize, p: usize, k: usize, seed: u64) -> Result<Self, LassoError> {
        check_shape(n, p, k)?;
        let x = standardized_design(n, p, seed);
        let mut rng = SmallRng::seed_from_u64(seed);
        let beta = sparse_coefficients(&mut rng, p, k);
        let eta = &x * &beta;
        let y = eta.map(|e| if rng.random::<f64>() < sigmoid(e) { 1.0 } else { 0.0 });

        Ok(Dataset {
            x,
            y,
            beta_true: Some(beta),
        })
    }
}

fn check_shape(n: usize, p: usize, k: usize) -> Result<(), LassoError> {
    if n == 0 || p == 0 {
        return Err(LassoError::InvalidConfig(format!(
            "design must be non-empty, got {}x{}",
            n, p
        )));
    }
    if k > p {
        return Err(LassoError::InvalidConfig(format!(
            "cannot place {} nonzero coefficients among {} predictors",
            k, p
        )));
    }
    Ok(())
}

/// One standard normal column scaled to norm `sqrt(n)`.
fn standardized_column(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut values: Vec<f64> = (0..n).map(|_| rng.sample(StandardNormal)).collect();
    let norm = values.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        let scale = (n as f64).sqrt() / norm;
        values.iter_mut().for_each(|x| *x *= scale);
    }
    values
}

/// Column `j` is drawn from its own generator seeded with `seed + 1 + j`,
/// so the design does not depend on how columns are scheduled.
fn standardized_design(n: usize, p: usize, seed: u64) -> na::DMatrix<f64> {
    let mut x = na::DMatrix::zeros(n, p);
    let column_seed = |j: usize| seed.wrapping_add(1 + j as u64);

    #[cfg(feature = "rayon")]
    {
        let columns: Vec<Vec<f64>> = (0..p)
            .into_par_iter()
            .map(|j| standardized_column(n, column_seed(j)))
            .collect();
        for (j, column) in columns.into_iter().enumerate() {
            x.column_mut(j).copy_from_slice(&column);
        }
    }

    #[cfg(not(feature = "rayon"))]
    {
        for j in 0..p {
            x.column_mut(j)
                .copy_from_slice(&standardized_column(n, column_seed(j)));
        }
    }

    x
}

fn sparse_coefficients(rng: &mut SmallRng, p: usize, k: usize) -> na::DVector<f64> {
    let mut beta = na::DVector::zeros(p);
    let indices = rand::seq::index::sample(rng, p, k).into_vec();
    for idx in indices {
        beta[idx] = rng.sample(StandardNormal);
    }
    beta
}
