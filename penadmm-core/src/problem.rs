extern crate nalgebra as na;

use crate::{
    sparse::{SparseVector, diff_squared_norm},
    spectral::{GramOperator, SpectralRadiusEstimator, auto_rho},
    timing::{TimingTracker, time_fn},
    utils::LassoError,
};

/// Restart sensitivity of the accelerated iteration. Momentum is kept only
/// while the combined residual shrinks by at least this factor.
pub const RESTART_ETA: f64 = 0.999;

/// Iterate and bookkeeping state of the accelerated ADMM engine.
///
/// The problem solved is
///
/// ```text
/// minimize f(x) + g(z)   subject to   A x - B z = 0
/// ```
///
/// `init` zeroes every vector; `init_warm` keeps `main_x`, `aux_z`,
/// `dual_y`, the extrapolated copies and the momentum (`adj_a`, `adj_c`),
/// and resets only the convergence measurements.
#[derive(Clone, Debug)]
pub struct AdmmState {
    /// Primal iterate x
    pub main_x: na::DVector<f64>,
    /// Auxiliary iterate z, kept sparse
    pub aux_z: SparseVector,
    /// Scaled dual iterate y
    pub dual_y: na::DVector<f64>,
    /// z before the latest update
    pub old_z: SparseVector,
    /// y before the latest update
    pub old_y: na::DVector<f64>,
    /// Extrapolated z used by the next x-update
    pub adj_z: SparseVector,
    /// Extrapolated y used by the next x- and z-updates
    pub adj_y: na::DVector<f64>,
    /// Momentum weight, >= 1
    pub adj_a: f64,
    /// Combined residual of the previous iteration
    pub adj_c: f64,
    /// Augmented Lagrangian penalty, > 0
    pub rho: f64,
    pub eps_primal: f64,
    pub eps_dual: f64,
    pub resid_primal: f64,
    pub resid_dual: f64,
    /// Number of momentum restarts in the current solve
    pub restarts: usize,
}

impl AdmmState {
    pub fn zeros(dim_main: usize, dim_aux: usize, dim_dual: usize) -> Self {
        AdmmState {
            main_x: na::DVector::zeros(dim_main),
            aux_z: SparseVector::zeros(dim_aux),
            dual_y: na::DVector::zeros(dim_dual),
            old_z: SparseVector::zeros(dim_aux),
            old_y: na::DVector::zeros(dim_dual),
            adj_z: SparseVector::zeros(dim_aux),
            adj_y: na::DVector::zeros(dim_dual),
            adj_a: 1.0,
            adj_c: f64::INFINITY,
            rho: 1.0,
            eps_primal: 0.0,
            eps_dual: 0.0,
            resid_primal: f64::INFINITY,
            resid_dual: f64::INFINITY,
            restarts: 0,
        }
    }

    /// Places the iterates at `x = z = 0` with dual `y`; the residuals are
    /// exactly zero there.
    fn set_zero_solution(&mut self, y: na::DVector<f64>) {
        self.main_x.fill(0.0);
        self.aux_z.clear();
        self.old_z.clear();
        self.adj_z.clear();
        self.old_y.copy_from(&y);
        self.adj_y.copy_from(&y);
        self.dual_y = y;
        self.adj_a = 1.0;
        self.adj_c = f64::INFINITY;
        self.resid_primal = 0.0;
        self.resid_dual = 0.0;
    }

    fn reset_convergence(&mut self) {
        self.eps_primal = 0.0;
        self.eps_dual = 0.0;
        self.resid_primal = f64::INFINITY;
        self.resid_dual = f64::INFINITY;
        self.restarts = 0;
    }

    /// `rho * ||r||^2 + rho * ||z - adj_z||^2`
    pub fn combined_residual(&self) -> f64 {
        self.rho * self.resid_primal * self.resid_primal
            + self.rho * diff_squared_norm(&self.aux_z, &self.adj_z)
    }

    /// Applies the restart test to a freshly computed combined residual.
    ///
    /// If `c_new < RESTART_ETA * adj_c` the momentum weight grows and the
    /// extrapolated iterates move past `aux_z`/`dual_y`. Otherwise momentum
    /// restarts from `adj_a = 1` at the current iterates and `adj_c` becomes
    /// `adj_c / RESTART_ETA`.
    ///
    /// # Returns
    ///
    /// `true` if a restart happened
    pub fn update_momentum(&mut self, c_new: f64) -> bool {
        let c_old = self.adj_c;
        if c_new < RESTART_ETA * c_old {
            let a_old = self.adj_a;
            self.adj_a = 0.5 + 0.5 * (1.0 + 4.0 * a_old * a_old).sqrt();
            let ratio = (a_old - 1.0) / self.adj_a;

            self.adj_z = SparseVector::extrapolate(&self.aux_z, &self.old_z, ratio);
            self.adj_y = &self.dual_y + (&self.dual_y - &self.old_y) * ratio;
            self.adj_c = c_new;
            false
        } else {
            self.adj_a = 1.0;
            self.adj_z = self.aux_z.clone();
            self.adj_y = self.dual_y.clone();
            self.adj_c = c_old / RESTART_ETA;
            self.restarts += 1;
            true
        }
    }
}

/// Model-specific hooks of the accelerated ADMM engine.
///
/// Each method corresponds to one ingredient of an ADMM iteration. The
/// engine owns the iterates and passes them in read-only; models own their
/// data views and factorization caches.
///
/// # ADMM Algorithm Steps
///
/// 1. `next_x` - minimize f(x) + rho/2 ||A x - B adj_z + adj_y / rho||^2
/// 2. `a_mult` - form A x
/// 3. `next_z` - minimize g(z) + rho/2 ||A x - B z + adj_y / rho||^2
/// 4. `b_mult` - form B z for the primal residual
pub trait AdmmProblem {
    /// Length of x
    fn dim_main(&self) -> usize;

    /// Length of z
    fn dim_aux(&self) -> usize {
        self.dim_main()
    }

    /// Length of y and of the constraint
    fn dim_dual(&self) -> usize {
        self.dim_main()
    }

    /// Smallest penalty for which the solution is identically zero.
    fn lambda_zero(&self) -> f64;

    /// Top of the default lambda path.
    fn lambda_max(&self) -> f64 {
        self.lambda_zero()
    }

    /// Maps a path value to the penalty the model is solved with.
    fn solver_lambda(&self, path_lambda: f64) -> f64 {
        path_lambda
    }

    /// Design matrix whose Gram matrix drives rho auto-tuning.
    fn design(&self) -> &na::DMatrix<f64>;

    /// Called whenever lambda or rho changes, before any iteration that
    /// uses them. Models refresh their factorization caches here.
    fn set_penalty(&mut self, lambda: f64, rho: f64) -> Result<(), LassoError>;

    fn next_x(&mut self, state: &AdmmState) -> Result<na::DVector<f64>, LassoError>;

    fn a_mult(&self, x: &na::DVector<f64>) -> na::DVector<f64>;

    fn b_mult(&self, z: &SparseVector) -> na::DVector<f64>;

    /// Norm of the constraint's constant term
    fn c_norm(&self) -> f64;

    fn next_z(&self, ax: &na::DVector<f64>, state: &AdmmState) -> SparseVector;

    /// Dual iterate certifying `x = z = 0` as the exact solution at
    /// `lambda`, or `None` if zero is not optimal there.
    ///
    /// The engine skips iterating when this returns a value.
    fn zero_solution_dual(&self, _lambda: f64) -> Option<na::DVector<f64>> {
        None
    }
}

/// Accelerated ADMM solver with adaptive restart.
///
/// The `AdmmSolver` owns the iterate state of one model and drives the
/// outer iterations, including rho auto-tuning, warm starts between lambda
/// values and per-step timing.
///
/// # Example
///
/// ```rust,no_run
/// # use penadmm_core::problem::AdmmSolver;
/// # use penadmm_core::lasso::LassoAdmm;
/// # use penadmm_core::spectral::SpectralRadiusEstimator;
/// # fn example(x: nalgebra::DMatrix<f64>, y: nalgebra::DVector<f64>) -> Result<(), penadmm_core::utils::LassoError> {
/// let model = LassoAdmm::new(&x, &y)?;
/// let mut solver = AdmmSolver::new(model, 1e-6, 1e-6, SpectralRadiusEstimator::default());
/// solver.init(0.5, 0.0)?;
/// let iterations = solver.solve(1000)?;
/// println!("{} iterations, {} nonzeros", iterations, solver.state().aux_z.nnz());
/// # Ok(())
/// # }
/// ```
pub struct AdmmSolver<P: AdmmProblem> {
    problem: P,
    state: AdmmState,
    eps_abs: f64,
    eps_rel: f64,
    lambda: f64,
    rho_auto: bool,
    estimator: SpectralRadiusEstimator,
    /// Cached top eigenvalue of X'X; it does not depend on lambda
    sigma: Option<f64>,
    converged: bool,
    timing_tracker: TimingTracker,
}

impl<P: AdmmProblem> AdmmSolver<P> {
    pub fn new(problem: P, eps_abs: f64, eps_rel: f64, estimator: SpectralRadiusEstimator) -> Self {
        let state = AdmmState::zeros(problem.dim_main(), problem.dim_aux(), problem.dim_dual());
        AdmmSolver {
            problem,
            state,
            eps_abs,
            eps_rel,
            lambda: 0.0,
            rho_auto: false,
            estimator,
            sigma: None,
            converged: false,
            timing_tracker: TimingTracker::new(),
        }
    }

    pub fn problem(&self) -> &P {
        &self.problem
    }

    pub fn state(&self) -> &AdmmState {
        &self.state
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    pub fn rho(&self) -> f64 {
        self.state.rho
    }

    /// `(eps_abs, eps_rel)` of the stopping rule
    pub fn tolerances(&self) -> (f64, f64) {
        (self.eps_abs, self.eps_rel)
    }

    pub fn rho_auto(&self) -> bool {
        self.rho_auto
    }

    /// Whether the last `solve` met the stopping rule before its cap.
    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn timing_tracker(&self) -> &TimingTracker {
        &self.timing_tracker
    }

    pub fn timing_tracker_mut(&mut self) -> &mut TimingTracker {
        &mut self.timing_tracker
    }

    /// Solution in sparse form, i.e. the auxiliary iterate z.
    pub fn coefficients(&self) -> &SparseVector {
        &self.state.aux_z
    }

    fn tuned_rho(&mut self, lambda: f64) -> f64 {
        let sigma = match self.sigma {
            Some(sigma) => sigma,
            None => {
                let sigma = self
                    .estimator
                    .estimate(&GramOperator::new(self.problem.design()));
                self.sigma = Some(sigma);
                sigma
            }
        };
        let rho = auto_rho(sigma, lambda);
        if rho > 0.0 && rho.is_finite() {
            rho
        } else {
            log::warn!(
                "[AdmmSolver] auto-tuned rho is {} (sigma = {}, lambda = {}); using 1",
                rho,
                sigma,
                lambda
            );
            1.0
        }
    }

    /// Cold start for the first lambda: zeroes all iterates.
    ///
    /// # Arguments
    ///
    /// * `lambda` - Penalty strength passed to the model
    /// * `rho` - ADMM penalty; values <= 0 select auto-tuning, which then
    ///   stays active for every later `init_warm`; NaN and infinite values
    ///   are rejected
    pub fn init(&mut self, lambda: f64, rho: f64) -> Result<(), LassoError> {
        if !rho.is_finite() {
            return Err(LassoError::InvalidConfig(format!("rho must be finite, got {}", rho)));
        }
        let p = &self.problem;
        self.state = AdmmState::zeros(p.dim_main(), p.dim_aux(), p.dim_dual());
        self.lambda = lambda;
        self.rho_auto = rho <= 0.0;
        self.state.rho = if self.rho_auto {
            self.tuned_rho(lambda)
        } else {
            rho
        };
        self.converged = false;
        log::debug!(
            "[AdmmSolver] cold start: lambda = {:e}, rho = {:e} ({})",
            lambda,
            self.state.rho,
            if self.rho_auto { "auto" } else { "fixed" }
        );
        self.problem.set_penalty(lambda, self.state.rho)
    }

    /// Warm start for the next lambda: keeps x, z, y, the extrapolated
    /// iterates and momentum; re-tunes rho only when auto-tuning is active.
    pub fn init_warm(&mut self, lambda: f64) -> Result<(), LassoError> {
        self.lambda = lambda;
        if self.rho_auto {
            self.state.rho = self.tuned_rho(lambda);
        }
        self.state.reset_convergence();
        self.converged = false;
        log::debug!(
            "[AdmmSolver] warm start: lambda = {:e}, rho = {:e}",
            lambda,
            self.state.rho
        );
        self.problem.set_penalty(lambda, self.state.rho)
    }

    /// Runs outer iterations until the stopping rule holds or `max_iter`
    /// iterations have run.
    ///
    /// # Returns
    ///
    /// * `Ok(iterations)` - the number of iterations used; equal to
    ///   `max_iter` when the solve did not converge, and 0 when the model
    ///   certifies the zero solution at the current lambda
    /// * `Err(LassoError)` - only if a subproblem factorization fails
    pub fn solve(&mut self, max_iter: usize) -> Result<usize, LassoError> {
        let mut iterations = 0;
        self.converged = false;

        if let Some(y) = self.problem.zero_solution_dual(self.lambda) {
            self.state.set_zero_solution(y);
            self.state.eps_primal = (self.problem.dim_dual() as f64).sqrt() * self.eps_abs;
            self.state.eps_dual = self.state.dual_y.norm() * self.eps_rel
                + (self.problem.dim_main() as f64).sqrt() * self.eps_abs;
            self.converged = true;
            log::debug!(
                "[AdmmSolver] lambda = {:e} is at or above lambda_zero; zero solution",
                self.lambda
            );
            return Ok(0);
        }

        while iterations < max_iter {
            self.state.old_z = self.state.aux_z.clone();

            let (problem, state) = (&mut self.problem, &mut self.state);
            time_fn(&mut self.timing_tracker, "update_x", || update_x(problem, state))?;
            let ax = time_fn(&mut self.timing_tracker, "update_z", || {
                update_z(problem, state)
            });
            time_fn(&mut self.timing_tracker, "update_y", || {
                update_y(problem, state, &ax)
            });
            let (eps_abs, eps_rel) = (self.eps_abs, self.eps_rel);
            time_fn(&mut self.timing_tracker, "update_residuals", || {
                update_residuals(problem, state, eps_abs, eps_rel)
            });
            let should_stop = time_fn(&mut self.timing_tracker, "check_stopping_criteria", || {
                state.resid_primal < state.eps_primal && state.resid_dual < state.eps_dual
            });

            iterations += 1;
            if should_stop {
                self.converged = true;
                break;
            }
        }

        log::debug!(
            "[AdmmSolver] lambda = {:e}: {} iterations, r = {:.3e} (eps {:.3e}), s = {:.3e} (eps {:.3e}), {} restarts",
            self.lambda,
            iterations,
            self.state.resid_primal,
            self.state.eps_primal,
            self.state.resid_dual,
            self.state.eps_dual,
            self.state.restarts
        );
        Ok(iterations)
    }
}

fn update_x<P: AdmmProblem>(problem: &mut P, state: &mut AdmmState) -> Result<(), LassoError> {
    state.main_x = problem.next_x(state)?;
    Ok(())
}

fn update_z<P: AdmmProblem>(problem: &mut P, state: &mut AdmmState) -> na::DVector<f64> {
    let ax = problem.a_mult(&state.main_x);
    state.aux_z = problem.next_z(&ax, state);
    ax
}

fn update_y<P: AdmmProblem>(problem: &P, state: &mut AdmmState, ax: &na::DVector<f64>) {
    let resid = ax - problem.b_mult(&state.aux_z);
    state.resid_primal = resid.norm();
    let new_y = &state.adj_y + resid * state.rho;
    state.old_y = std::mem::replace(&mut state.dual_y, new_y);
}

fn update_residuals<P: AdmmProblem>(
    problem: &P,
    state: &mut AdmmState,
    eps_abs: f64,
    eps_rel: f64,
) {
    let c_new = state.combined_residual();
    state.update_momentum(c_new);

    let scale = state
        .main_x
        .norm()
        .max(state.aux_z.norm())
        .max(problem.c_norm());
    state.eps_primal = scale * eps_rel + (problem.dim_dual() as f64).sqrt() * eps_abs;
    state.eps_dual = state.dual_y.norm() * eps_rel + (problem.dim_main() as f64).sqrt() * eps_abs;
    state.resid_dual = state.rho * diff_squared_norm(&state.aux_z, &state.old_z).sqrt();
}
