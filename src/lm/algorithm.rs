//! Implementation of the Levenberg-Marquardt algorithm.
//!
//! Damped Gauss-Newton iterations on a [`Problem`]: the gradient is checked
//! with `faer`, the damped normal equations are solved by Cholesky with a QR
//! fallback, and the damping factor shrinks after accepted steps and grows
//! after rejected ones.

use ndarray::{Array1, Array2};
use std::fmt;

use crate::error::{FitError, Result};
use crate::problem::Problem;
use crate::utils::matrix_convert::{ndarray_to_faer, ndarray_vec_to_faer};

use super::config::{DecompositionMethod, LmConfig};

/// Result of the Levenberg-Marquardt optimization.
#[derive(Debug, Clone)]
pub struct LmResult {
    /// Optimized parameter values
    pub params: Array1<f64>,

    /// Residuals at the solution
    pub residuals: Array1<f64>,

    /// Sum of squared residuals
    pub cost: f64,

    /// Number of accepted steps
    pub iterations: usize,

    /// Number of function evaluations
    pub func_evals: usize,

    /// Whether a convergence criterion was met
    pub success: bool,

    /// A message describing the result
    pub message: String,
}

impl fmt::Display for LmResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optimization Result:")?;
        writeln!(f, "  Success: {}", self.success)?;
        writeln!(f, "  Message: {}", self.message)?;
        writeln!(f, "  Cost: {:.6e}", self.cost)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Function evaluations: {}", self.func_evals)?;
        writeln!(f, "  Parameters: {:?}", self.params)?;
        Ok(())
    }
}

/// Status of the iteration.
enum IterationStatus {
    Continue,
    Converged(String),
}

/// Jacobian provider used inside the iteration.
///
/// Problems differentiated with parameter-specific steps (or in parallel)
/// plug in here instead of relying on [`Problem::jacobian`].
pub trait JacobianSource {
    fn jacobian_at(&self, params: &Array1<f64>) -> Result<Array2<f64>>;
}

impl<P: Problem> JacobianSource for P {
    fn jacobian_at(&self, params: &Array1<f64>) -> Result<Array2<f64>> {
        self.jacobian(params)
    }
}

/// The Levenberg-Marquardt optimizer.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    config: LmConfig,
}

impl LevenbergMarquardt {
    /// Create a new Levenberg-Marquardt optimizer with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new Levenberg-Marquardt optimizer with the given configuration.
    pub fn with_config(config: LmConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Set the tolerance for the relative change in cost.
    pub fn with_ftol(mut self, ftol: f64) -> Self {
        self.config.ftol = ftol;
        self
    }

    /// Set the tolerance for the relative change in parameter values.
    pub fn with_xtol(mut self, xtol: f64) -> Self {
        self.config.xtol = xtol;
        self
    }

    /// Set the tolerance for gradient norm.
    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.config.gtol = gtol;
        self
    }

    /// Set the method used for solving the linear system.
    pub fn with_decomposition_method(mut self, method: DecompositionMethod) -> Self {
        self.config.decomposition_method = method;
        self
    }

    /// Minimize the sum of squared residuals using the problem's own Jacobian.
    pub fn minimize<P: Problem>(&self, problem: &P, initial_params: Array1<f64>) -> Result<LmResult> {
        self.minimize_with(problem, problem, initial_params)
    }

    /// Minimize the sum of squared residuals of `problem`, taking Jacobians
    /// from `jac`.
    ///
    /// Errors from residual evaluation abort the minimization. Running out of
    /// iterations or damping is reported through `success = false`.
    pub fn minimize_with<P, J>(
        &self,
        problem: &P,
        jac: &J,
        initial_params: Array1<f64>,
    ) -> Result<LmResult>
    where
        P: Problem + ?Sized,
        J: JacobianSource + ?Sized,
    {
        let n_params = problem.parameter_count();
        if initial_params.len() != n_params {
            return Err(FitError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                n_params,
                initial_params.len()
            )));
        }

        let mut params = initial_params;
        let mut lambda = self.config.initial_lambda;
        let mut residuals = problem.eval(&params)?;
        let mut cost: f64 = residuals.iter().map(|r| r.powi(2)).sum();
        let mut func_evals = 1;
        let mut iterations = 0;

        if !cost.is_finite() {
            return Err(FitError::FitExecution(
                "residuals are not finite at the starting point".to_string(),
            ));
        }

        let finish = |params: Array1<f64>,
                      residuals: Array1<f64>,
                      cost: f64,
                      iterations: usize,
                      func_evals: usize,
                      success: bool,
                      message: String| LmResult {
            params,
            residuals,
            cost,
            iterations,
            func_evals,
            success,
            message,
        };

        if n_params == 0 {
            return Ok(finish(
                params,
                residuals,
                cost,
                0,
                func_evals,
                true,
                "No free parameters".to_string(),
            ));
        }

        'outer: loop {
            let jacobian = jac.jacobian_at(&params)?;
            func_evals += n_params;

            let j = ndarray_to_faer(&jacobian);
            let r = ndarray_vec_to_faer(&residuals);

            // g = J^T r
            let g = j.transpose() * &r;
            let gradient_norm = g.norm_l2();
            if gradient_norm < self.config.gtol {
                return Ok(finish(
                    params,
                    residuals,
                    cost,
                    iterations,
                    func_evals,
                    true,
                    format!(
                        "Gradient convergence: ||g|| = {:.2e} < {:.2e}",
                        gradient_norm, self.config.gtol
                    ),
                ));
            }

            if iterations >= self.config.max_iterations {
                return Ok(finish(
                    params,
                    residuals,
                    cost,
                    iterations,
                    func_evals,
                    false,
                    format!(
                        "Maximum iterations ({}) reached",
                        self.config.max_iterations
                    ),
                ));
            }

            // Inner loop: raise lambda until a step lowers the cost
            loop {
                let step = self.calculate_step(&jacobian, &residuals, lambda);
                let new_params = &params + &step;
                let new_residuals = problem.eval(&new_params)?;
                func_evals += 1;
                let new_cost: f64 = new_residuals.iter().map(|r| r.powi(2)).sum();

                if new_cost.is_finite() && new_cost < cost {
                    let param_change = step
                        .iter()
                        .zip(new_params.iter())
                        .map(|(dx, x)| dx.abs() / (x.abs() + self.config.xtol))
                        .fold(0.0, f64::max);
                    let cost_change = (cost - new_cost) / cost.max(f64::MIN_POSITIVE);

                    let status = if param_change < self.config.xtol {
                        IterationStatus::Converged(format!(
                            "Parameter convergence: |dx|/|x| = {:.2e} < {:.2e}",
                            param_change, self.config.xtol
                        ))
                    } else if cost_change < self.config.ftol {
                        IterationStatus::Converged(format!(
                            "Cost convergence: |df|/|f| = {:.2e} < {:.2e}",
                            cost_change, self.config.ftol
                        ))
                    } else if new_cost == 0.0 {
                        IterationStatus::Converged("Exact fit: cost is zero".to_string())
                    } else {
                        IterationStatus::Continue
                    };

                    params = new_params;
                    residuals = new_residuals;
                    cost = new_cost;
                    lambda = (lambda * self.config.lambda_down_factor).max(self.config.min_lambda);
                    iterations += 1;
                    log::debug!(
                        "lm iteration {}: cost = {:.6e}, lambda = {:.1e}",
                        iterations,
                        cost,
                        lambda
                    );

                    match status {
                        IterationStatus::Continue => continue 'outer,
                        IterationStatus::Converged(message) => {
                            return Ok(finish(
                                params, residuals, cost, iterations, func_evals, true, message,
                            ))
                        }
                    }
                }

                // Step rejected
                if lambda >= self.config.max_lambda {
                    let (success, message) = if cost_is_stationary(cost, new_cost, self.config.ftol)
                    {
                        (true, "No further decrease possible; assuming a minimum")
                    } else {
                        (false, "Failed to decrease cost, and lambda reached maximum")
                    };
                    return Ok(finish(
                        params,
                        residuals,
                        cost,
                        iterations,
                        func_evals,
                        success,
                        message.to_string(),
                    ));
                }
                lambda = (lambda * self.config.lambda_up_factor).min(self.config.max_lambda);
            }
        }
    }

    /// Calculate the Levenberg-Marquardt step.
    ///
    /// Solves `(J^T J + λ diag(J^T J)) δ = -J^T r`. Columns with a zero
    /// diagonal get `λ` itself as damping.
    fn calculate_step(&self, j: &Array2<f64>, r: &Array1<f64>, lambda: f64) -> Array1<f64> {
        let jt = j.t();
        let mut a = jt.dot(j);
        let jtr = jt.dot(r);
        let n = a.nrows();
        for i in 0..n {
            let d = a[[i, i]];
            a[[i, i]] += lambda * if d > 0.0 { d } else { 1.0 };
        }

        let solution = match self.config.decomposition_method {
            DecompositionMethod::QR => solve_qr(&augment(j, lambda), &augment_rhs(r, n)),
            DecompositionMethod::Cholesky | DecompositionMethod::Auto => {
                match solve_cholesky(&a, &jtr) {
                    Some(x) => x,
                    None => solve_qr(&augment(j, lambda), &augment_rhs(r, n)),
                }
            }
        };
        -solution
    }
}

fn cost_is_stationary(cost: f64, trial: f64, ftol: f64) -> bool {
    trial.is_finite() && (trial - cost).abs() <= ftol.max(1e-12) * cost.max(f64::MIN_POSITIVE)
}

/// Solve `A x = b` for symmetric positive definite `A`; `None` if `A` is not.
fn solve_cholesky(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut l = a.clone();
    for k in 0..n {
        for j in 0..k {
            l[[k, k]] -= l[[k, j]] * l[[k, j]];
        }
        if !(l[[k, k]] > 0.0) {
            return None;
        }
        let lkk = l[[k, k]].sqrt();
        l[[k, k]] = lkk;
        for i in k + 1..n {
            for j in 0..k {
                l[[i, k]] -= l[[i, j]] * l[[k, j]];
            }
            l[[i, k]] /= lkk;
        }
    }

    // Forward substitution (L y = b)
    let mut y = b.clone();
    for i in 0..n {
        for j in 0..i {
            y[i] -= l[[i, j]] * y[j];
        }
        y[i] /= l[[i, i]];
    }

    // Backward substitution (L^T x = y)
    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        x[i] = y[i];
        for j in (i + 1)..n {
            x[i] -= l[[j, i]] * x[j];
        }
        x[i] /= l[[i, i]];
    }
    Some(x)
}

/// Stack `[J; sqrt(λ D)]` so that the damped problem becomes an ordinary
/// least-squares problem for QR.
fn augment(j: &Array2<f64>, lambda: f64) -> Array2<f64> {
    let (m, n) = j.dim();
    let mut out = Array2::zeros((m + n, n));
    out.slice_mut(ndarray::s![..m, ..]).assign(j);
    for i in 0..n {
        let d: f64 = j.column(i).iter().map(|v| v * v).sum();
        out[[m + i, i]] = (lambda * if d > 0.0 { d } else { 1.0 }).sqrt();
    }
    out
}

fn augment_rhs(r: &Array1<f64>, n: usize) -> Array1<f64> {
    let mut out = Array1::zeros(r.len() + n);
    out.slice_mut(ndarray::s![..r.len()]).assign(r);
    out
}

/// Least-squares solution of `A x = b` by modified Gram-Schmidt QR.
/// Dependent columns get a zero component.
fn solve_qr(a: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let (m, n) = a.dim();
    let mut q = a.clone();
    let mut r = Array2::<f64>::zeros((n, n));

    for j in 0..n {
        for k in 0..j {
            let dot: f64 = (0..m).map(|i| q[[i, k]] * q[[i, j]]).sum();
            r[[k, j]] = dot;
            for i in 0..m {
                q[[i, j]] -= dot * q[[i, k]];
            }
        }
        let norm = (0..m).map(|i| q[[i, j]] * q[[i, j]]).sum::<f64>().sqrt();
        if norm > 1e-12 {
            r[[j, j]] = norm;
            for i in 0..m {
                q[[i, j]] /= norm;
            }
        } else {
            r[[j, j]] = 0.0;
            for i in 0..m {
                q[[i, j]] = 0.0;
            }
        }
    }

    let qtb: Array1<f64> = Array1::from_shape_fn(n, |j| (0..m).map(|i| q[[i, j]] * b[i]).sum());
    let mut x = Array1::zeros(n);
    for j in (0..n).rev() {
        if r[[j, j]].abs() < 1e-12 {
            x[j] = 0.0;
            continue;
        }
        x[j] = qtb[j];
        for k in (j + 1)..n {
            x[j] -= r[[j, k]] * x[k];
        }
        x[j] /= r[[j, j]];
    }
    x
}
