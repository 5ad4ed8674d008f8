use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{spectral::SpectralRadiusEstimator, utils::LassoError};

/// Configuration for fitting a penalized regression path.
///
/// Every field has a default, so a JSON config file only needs to name the
/// settings it changes.
///
/// # Example
///
/// ```rust
/// # use penadmm_core::config::FitConfig;
///
/// let config = FitConfig::default()
///     .with_tolerances(1e-8, 1e-8)
///     .with_nlambda(20)
///     .with_maxit(10_000);
/// assert!(config.validate(10).is_ok());
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Absolute tolerance of the ADMM stopping rule
    pub eps_abs: f64,
    /// Relative tolerance of the ADMM stopping rule; also the coordinate
    /// descent tolerance
    pub eps_rel: f64,
    /// Outer iteration cap per lambda value
    pub maxit: usize,
    /// ADMM penalty parameter; values <= 0 select auto-tuning
    pub rho: f64,
    /// Elastic mix between the L1 and the fused ridge penalty, in (0, 1]
    pub alpha: f64,
    /// MCP shape parameter, > 1
    pub gamma: f64,
    /// Per-coefficient penalty multipliers; empty means uniform
    pub penalty_factor: Vec<f64>,
    /// Explicit lambda sequence; when absent a log-spaced path is generated
    pub lambda: Option<Vec<f64>>,
    /// Length of the generated path
    pub nlambda: usize,
    /// Smallest generated lambda as a fraction of the largest
    pub lmin_ratio: f64,
    /// Seed of the spectral radius estimator used for auto-tuned rho
    pub eigen_seed: u64,
    pub eigen_maxit: usize,
    pub eigen_tol: f64,
    /// Inner Newton iteration cap of the logistic x-update
    pub newton_maxit: usize,
    /// Inner Newton tolerance on |g'dx|
    pub newton_tol: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        FitConfig {
            eps_abs: 1e-6,
            eps_rel: 1e-6,
            maxit: 5000,
            rho: 0.0,
            alpha: 1.0,
            gamma: 3.0,
            penalty_factor: Vec::new(),
            lambda: None,
            nlambda: 100,
            lmin_ratio: 1e-3,
            eigen_seed: 0,
            eigen_maxit: 100,
            eigen_tol: 1e-4,
            newton_maxit: 100,
            newton_tol: 1e-5,
        }
    }
}

impl FitConfig {
    /// Loads a configuration from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, LassoError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn with_tolerances(mut self, eps_abs: f64, eps_rel: f64) -> Self {
        self.eps_abs = eps_abs;
        self.eps_rel = eps_rel;
        self
    }

    pub fn with_maxit(mut self, maxit: usize) -> Self {
        self.maxit = maxit;
        self
    }

    pub fn with_rho(mut self, rho: f64) -> Self {
        self.rho = rho;
        self
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_penalty_factor(mut self, penalty_factor: Vec<f64>) -> Self {
        self.penalty_factor = penalty_factor;
        self
    }

    pub fn with_lambda(mut self, lambda: Vec<f64>) -> Self {
        self.lambda = Some(lambda);
        self
    }

    pub fn with_nlambda(mut self, nlambda: usize) -> Self {
        self.nlambda = nlambda;
        self
    }

    pub fn with_lmin_ratio(mut self, lmin_ratio: f64) -> Self {
        self.lmin_ratio = lmin_ratio;
        self
    }

    pub fn spectral_estimator(&self) -> SpectralRadiusEstimator {
        SpectralRadiusEstimator::new(self.eigen_seed, self.eigen_maxit, self.eigen_tol)
    }

    /// Checks every setting against a design with `p` predictors.
    pub fn validate(&self, p: usize) -> Result<(), LassoError> {
        let invalid = |msg: String| Err(LassoError::InvalidConfig(msg));

        if !(self.eps_abs >= 0.0) || !(self.eps_rel >= 0.0) {
            return invalid(format!(
                "tolerances must be non-negative (eps_abs = {}, eps_rel = {})",
                self.eps_abs, self.eps_rel
            ));
        }
        if self.maxit == 0 {
            return invalid("maxit must be positive".to_string());
        }
        if !self.rho.is_finite() {
            return invalid(format!("rho must be finite, got {}", self.rho));
        }
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return invalid(format!("alpha must lie in (0, 1], got {}", self.alpha));
        }
        if !(self.gamma > 1.0) {
            return invalid(format!("gamma must be > 1, got {}", self.gamma));
        }
        if !self.penalty_factor.is_empty() {
            if self.penalty_factor.len() != p {
                return Err(LassoError::DimensionMismatch {
                    what: "penalty_factor",
                    expected: p,
                    found: self.penalty_factor.len(),
                });
            }
            if self.penalty_factor.iter().any(|f| !(*f >= 0.0)) {
                return invalid("penalty factors must be non-negative".to_string());
            }
        }
        match &self.lambda {
            Some(seq) => {
                if seq.is_empty() {
                    return invalid("lambda sequence is empty".to_string());
                }
                if seq.iter().any(|l| !(*l > 0.0) || !l.is_finite()) {
                    return invalid("lambda values must be positive and finite".to_string());
                }
                if seq.windows(2).any(|w| w[1] >= w[0]) {
                    return invalid("lambda sequence must be strictly decreasing".to_string());
                }
            }
            None => {
                if self.nlambda == 0 {
                    return invalid("nlambda must be positive".to_string());
                }
                if !(self.lmin_ratio > 0.0 && self.lmin_ratio < 1.0) {
                    return invalid(format!(
                        "lmin_ratio must lie in (0, 1), got {}",
                        self.lmin_ratio
                    ));
                }
            }
        }
        if self.newton_maxit == 0 || !(self.newton_tol > 0.0) {
            return invalid("newton_maxit and newton_tol must be positive".to_string());
        }
        if self.eigen_maxit == 0 {
            return invalid("eigen_maxit must be positive".to_string());
        }
        Ok(())
    }
}
