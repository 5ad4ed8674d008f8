//! Proximal operators and scalar link functions.
extern crate nalgebra as na;

use crate::sparse::SparseVector;

/// Soft thresholding operation for L1 regularization.
/// Computes sign(x) * max(|x| - threshold, 0).
pub fn soft_threshold(value: f64, threshold: f64) -> f64 {
    if value > threshold {
        value - threshold
    } else if value < -threshold {
        value + threshold
    } else {
        0.0
    }
}

/// Soft thresholds every entry of `v` straight into sparse storage, so the
/// stored support is exactly the set of surviving coordinates.
///
/// # Arguments
///
/// * `v` - The dense input vector
/// * `threshold` - The common threshold, e.g. `lambda / rho`
/// * `penalty_factor` - Optional per-coordinate multipliers of `threshold`;
///   an empty slice means a uniform penalty
pub fn soft_threshold_sparse(
    v: &na::DVector<f64>,
    threshold: f64,
    penalty_factor: &[f64],
) -> SparseVector {
    let mut out = SparseVector::with_capacity(v.len(), v.len());
    if penalty_factor.is_empty() {
        for (i, &val) in v.iter().enumerate() {
            let t = soft_threshold(val, threshold);
            if t != 0.0 {
                out.push(i, t);
            }
        }
    } else {
        for (i, &val) in v.iter().enumerate() {
            let t = soft_threshold(val, threshold * penalty_factor[i]);
            if t != 0.0 {
                out.push(i, t);
            }
        }
    }
    out
}

/// Thresholding operator of the minimax concave penalty.
///
/// Values beyond the bend point `threshold * gamma` are returned unshrunk;
/// values between `threshold` and the bend point are soft thresholded and
/// rescaled by `1 / (1 - 1/gamma)`.
pub fn mcp_threshold(value: f64, threshold: f64, gamma: f64) -> f64 {
    if value.abs() > threshold * gamma {
        value
    } else if value > threshold {
        (value - threshold) / (1.0 - 1.0 / gamma)
    } else if value < -threshold {
        (value + threshold) / (1.0 - 1.0 / gamma)
    } else {
        0.0
    }
}

/// Logistic function `1 / (1 + exp(-eta))`.
pub fn sigmoid(eta: f64) -> f64 {
    if eta >= 0.0 {
        1.0 / (1.0 + (-eta).exp())
    } else {
        let e = eta.exp();
        e / (1.0 + e)
    }
}

/// `log(1 + exp(eta))` without overflow.
pub fn softplus(eta: f64) -> f64 {
    if eta > 0.0 {
        eta + (-eta).exp().ln_1p()
    } else {
        eta.exp().ln_1p()
    }
}
