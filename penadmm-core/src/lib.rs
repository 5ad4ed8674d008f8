//! penadmm-core
//!
//! This library fits sparse penalized regression models along a decreasing
//! path of penalty strengths. Two generic engines do the iterating: an
//! accelerated ADMM solver with adaptive restart and a cyclic coordinate
//! descent solver. Each model plugs into one of them through a small set of
//! hooks.
//!
//! # Functionality
//!
//! - Accelerated ADMM with momentum restart and spectral auto-tuning of rho
//! - Coordinate descent with incremental residual updates
//! - Lasso (ADMM and coordinate descent), logistic Lasso, generalized
//!   ridge Lasso and MCP regression, including a partial-loss MCP variant
//! - Warm-started lambda paths
//! - Sparse iterates, timing and logging
//!
//! # Features
//!
//! - `accelerate` - Use the `accelerate` backend for Cholesky factorizations
//! - `netlib` - Use the `netlib` backend for Cholesky factorizations
//! - `openblas` - Use the `openblas` backend for Cholesky factorizations
//! - `rayon` - Generate synthetic designs column-parallel
//! - `linfa` - Cross-check Lasso objectives against `linfa-elasticnet`

/// Fit configuration and validation
pub mod config;

/// Coordinate descent engine
pub mod coord;

/// Problem files and synthetic data
pub mod dataset;

/// Generalized ridge Lasso with a sparse structure matrix
pub mod genridge;

/// Lasso models for both engines
pub mod lasso;

/// Logistic Lasso with a Newton x-update
pub mod logistic;

/// MCP regression models
pub mod mcp;

/// Thresholding operators and link functions
pub mod ops;

/// Lambda sequences and the path driver
pub mod path;

/// Accelerated ADMM engine
pub mod problem;

/// Sparse vectors and their residual arithmetic
pub mod sparse;

/// Spectral radius estimation for rho auto-tuning
pub mod spectral;

/// Timing and logging utilities
pub mod timing;

/// Errors and factorization helpers
pub mod utils;
