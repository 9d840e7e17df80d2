//! Backend over the `levenberg-marquardt` crate (a port of MINPACK's `lmder`).
//!
//! The crate has no notion of parameter limits, so they are ignored here (with
//! one warning per fit). Errors come from `redchi * pinv(JᵀJ)` at the
//! solution.

use super::residual::ResidualProblem;
use super::{reduced_chisqr, Backend, BackendOutcome, ModelFn};
use crate::config::FitOptions;
use crate::dataset::Dataset;
use crate::error::{FitError, Result};
use crate::parameters::Parameter;
use crate::uncertainty::calculate_covariance;
use crate::utils::matrix_convert::{
    nalgebra_vec_to_ndarray, ndarray_to_nalgebra, ndarray_vec_to_nalgebra,
};
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use nalgebra::storage::Owned;
use nalgebra::{DMatrix, DVector, Dyn};
use std::cell::RefCell;

/// Settings of the `minpack` backend.
#[derive(Debug, Clone, PartialEq)]
pub struct MinpackConfig {
    pub ftol: f64,
    pub xtol: f64,
    pub gtol: f64,
    /// Evaluation budget, in multiples of `n_free + 1`
    pub patience: usize,
    pub epsilon: Option<f64>,
}

impl Default for MinpackConfig {
    fn default() -> Self {
        Self {
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 1e-12,
            patience: 100,
            epsilon: None,
        }
    }
}

impl MinpackConfig {
    pub fn from_options(options: &FitOptions) -> Result<Self> {
        let mut config = Self::default();
        if let Some(v) = options.get_positive_f64("ftol")? {
            config.ftol = v;
        }
        if let Some(v) = options.get_positive_f64("xtol")? {
            config.xtol = v;
        }
        if let Some(v) = options.get_positive_f64("gtol")? {
            config.gtol = v;
        }
        if let Some(n) = options.get_usize("patience")? {
            config.patience = n.max(1);
        }
        config.epsilon = options.get_positive_f64("epsilon")?;
        Ok(config)
    }
}

/// Backend registered as `minpack`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinpackBackend;

/// Adapter to the crate's problem trait. The trait cannot report errors, so
/// the first one is kept aside and the evaluation answers `None`.
struct MinpackProblem<'p, 'a> {
    inner: &'p ResidualProblem<'a>,
    params: DVector<f64>,
    error: RefCell<Option<FitError>>,
}

impl MinpackProblem<'_, '_> {
    fn keep<T>(&self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.error.borrow_mut().get_or_insert(err);
                None
            }
        }
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for MinpackProblem<'_, '_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.copy_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let free = nalgebra_vec_to_ndarray(&self.params);
        self.keep(self.inner.residuals(&free))
            .map(|r| ndarray_vec_to_nalgebra(&r))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let free = nalgebra_vec_to_ndarray(&self.params);
        self.keep(self.inner.jacobian_at(&free))
            .map(|j| ndarray_to_nalgebra(&j))
    }
}

impl Backend for MinpackBackend {
    fn name(&self) -> &'static str {
        "minpack"
    }

    fn supports_bounds(&self) -> bool {
        false
    }

    fn do_fit(
        &self,
        data: &Dataset,
        fcn: &ModelFn<'_>,
        params: &mut [&mut Parameter],
        options: &FitOptions,
    ) -> Result<BackendOutcome> {
        let config = MinpackConfig::from_options(options)?;
        let residuals = ResidualProblem::new(data, fcn, params)?.with_epsilon(config.epsilon);

        let bounded: Vec<&str> = residuals
            .free_indices()
            .iter()
            .filter(|&&i| params[i].has_bounds())
            .map(|&i| params[i].name.as_str())
            .collect();
        if !bounded.is_empty() {
            log::warn!(
                "minpack backend ignores parameter limits (set on {})",
                bounded.join(", ")
            );
        }

        let initial = residuals.initial();
        let start = residuals.finite_residuals(&initial)?;
        let n_free = residuals.n_free();

        let (solution, cost, message, success, evaluations) = if n_free == 0 {
            let cost = start.iter().map(|r| r * r).sum::<f64>();
            (initial, cost, "No free parameters".to_string(), true, 1)
        } else {
            let problem = MinpackProblem {
                inner: &residuals,
                params: ndarray_vec_to_nalgebra(&initial),
                error: RefCell::new(None),
            };
            let (problem, report) = LevenbergMarquardt::new()
                .with_ftol(config.ftol)
                .with_xtol(config.xtol)
                .with_gtol(config.gtol)
                .with_patience(config.patience)
                .minimize(problem);

            if let Some(err) = problem.error.into_inner() {
                return Err(err);
            }
            if matches!(
                report.termination,
                TerminationReason::Numerical(_) | TerminationReason::User(_)
            ) {
                return Err(FitError::FitExecution(format!(
                    "minpack terminated: {:?}",
                    report.termination
                )));
            }

            let solution = nalgebra_vec_to_ndarray(&problem.params);
            let r = residuals.finite_residuals(&solution)?;
            let cost = r.iter().map(|v| v * v).sum::<f64>();
            (
                solution,
                cost,
                format!("{:?}", report.termination),
                report.termination.was_successful(),
                report.number_of_evaluations,
            )
        };

        let chisqr = reduced_chisqr(cost, residuals.n_points(), n_free);
        let covar = if n_free > 0 {
            let jac = residuals.jacobian_at(&solution)?;
            Some(calculate_covariance(&jac, chisqr)?)
        } else {
            None
        };
        residuals.write_back(params, &solution, covar.as_ref())?;

        log::info!(
            "minpack fit finished after {} evaluations: chisqr = {:.6e} ({})",
            evaluations,
            chisqr,
            message
        );
        Ok(BackendOutcome {
            success,
            message,
            chisqr,
            iterations: evaluations,
        })
    }
}
