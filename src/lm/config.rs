//! Configuration of the bounded Levenberg-Marquardt backend.

use crate::config::FitOptions;
use crate::error::Result;

/// Method for solving the damped normal equations.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DecompositionMethod {
    /// Cholesky decomposition of the damped normal matrix
    Cholesky,

    /// QR decomposition of the Jacobian (slower, tolerates rank deficiency)
    QR,

    /// Cholesky first, QR when the matrix is not positive definite
    #[default]
    Auto,
}

/// Configuration options for the Levenberg-Marquardt algorithm.
#[derive(Debug, Clone, PartialEq)]
pub struct LmConfig {
    /// Maximum number of iterations. Default: 200
    pub max_iterations: usize,

    /// Tolerance for the relative change in cost. Default: 1e-10
    pub ftol: f64,

    /// Tolerance for the relative change in parameter values. Default: 1e-10
    pub xtol: f64,

    /// Tolerance for gradient norm. Default: 1e-10
    pub gtol: f64,

    /// Initial value for the damping parameter. Default: 1e-3
    pub initial_lambda: f64,

    /// Factor by which to increase lambda. Default: 10.0
    pub lambda_up_factor: f64,

    /// Factor by which to decrease lambda. Default: 0.1
    pub lambda_down_factor: f64,

    /// Minimum value for lambda. Default: 1e-12
    pub min_lambda: f64,

    /// Maximum value for lambda. Default: 1e10
    pub max_lambda: f64,

    /// Relative finite-difference step. `None` uses the library default.
    pub epsilon: Option<f64>,

    /// Evaluate Jacobian columns on the rayon thread pool
    pub parallel: bool,

    pub decomposition_method: DecompositionMethod,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 1e-10,
            initial_lambda: 1e-3,
            lambda_up_factor: 10.0,
            lambda_down_factor: 0.1,
            min_lambda: 1e-12,
            max_lambda: 1e10,
            epsilon: None,
            parallel: false,
            decomposition_method: DecompositionMethod::default(),
        }
    }
}

impl LmConfig {
    /// Read `max_iterations`, `ftol`, `xtol`, `gtol`, `initial_lambda`,
    /// `epsilon` and `parallel`, keeping defaults for absent keys.
    pub fn from_options(options: &FitOptions) -> Result<Self> {
        let mut config = Self::default();
        if let Some(n) = options.get_usize("max_iterations")? {
            config.max_iterations = n;
        }
        if let Some(v) = options.get_positive_f64("ftol")? {
            config.ftol = v;
        }
        if let Some(v) = options.get_positive_f64("xtol")? {
            config.xtol = v;
        }
        if let Some(v) = options.get_positive_f64("gtol")? {
            config.gtol = v;
        }
        if let Some(v) = options.get_positive_f64("initial_lambda")? {
            config.initial_lambda = v;
        }
        config.epsilon = options.get_positive_f64("epsilon")?;
        if let Some(parallel) = options.get_bool("parallel")? {
            config.parallel = parallel;
        }
        Ok(config)
    }
}
