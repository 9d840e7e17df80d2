//! Bounded Levenberg-Marquardt backend.
//!
//! Every bounded parameter is optimized through an unconstrained internal
//! variable (Minuit transform): `sqrt` for one-sided limits, `sin` for
//! two-sided ones. Whatever step the optimizer takes, the external value
//! stays inside `[pmin, pmax]`. Errors are computed from the Jacobian with
//! respect to the external values at the solution.
//!
//! The transform is stationary at a limit, so a parameter whose optimum lies
//! on a limit loses its derivative there. When the internal run fails or ends
//! with a parameter on a limit, the remaining iterations go to a projected
//! search in external values (the `unifit` minimizer) started from that point.

use super::residual::ResidualProblem;
use super::unifit::{self, UnifitConfig};
use super::{reduced_chisqr, Backend, BackendOutcome, ModelFn};
use crate::config::FitOptions;
use crate::dataset::Dataset;
use crate::error::{FitError, Result};
use crate::lm::{LevenbergMarquardt, LmConfig};
use crate::parameters::{Bounds, BoundsTransform, Parameter};
use crate::problem::Problem;
use crate::uncertainty::calculate_covariance;
use crate::utils::finite_difference::{self, step_size, DEFAULT_EPSILON};
use ndarray::{Array1, Array2};

/// Relative distance below which a value counts as sitting on a limit.
const LIMIT_TOLERANCE: f64 = 1e-6;

fn on_limit(value: f64, bounds: &Bounds) -> bool {
    [bounds.min, bounds.max].iter().any(|limit| {
        limit.is_finite() && (value - limit).abs() <= LIMIT_TOLERANCE * limit.abs().max(1.0)
    })
}

/// Backend registered as `bounded`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundedBackend;

/// Residual problem in internal variables.
struct InternalProblem<'p, 'a> {
    inner: &'p ResidualProblem<'a>,
    transforms: Vec<BoundsTransform>,
    epsilon: f64,
    parallel: bool,
}

impl InternalProblem<'_, '_> {
    fn to_external(&self, internal: &Array1<f64>) -> Array1<f64> {
        Array1::from_iter(
            self.transforms
                .iter()
                .zip(internal.iter())
                .map(|(t, &v)| t.to_external(v)),
        )
    }
}

impl Problem for InternalProblem<'_, '_> {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        self.inner.residuals(&self.to_external(params))
    }

    fn parameter_count(&self) -> usize {
        self.transforms.len()
    }

    fn residual_count(&self) -> usize {
        self.inner.n_points()
    }

    fn jacobian(&self, params: &Array1<f64>) -> Result<Array2<f64>>
    where
        Self: Sized,
    {
        let steps: Vec<f64> = params
            .iter()
            .map(|&v| step_size(v, self.epsilon, None))
            .collect();
        if self.parallel {
            finite_difference::jacobian_parallel(self, params, &steps)
        } else {
            finite_difference::jacobian_with_steps(self, params, &steps)
        }
    }
}

impl Backend for BoundedBackend {
    fn name(&self) -> &'static str {
        "bounded"
    }

    fn supports_bounds(&self) -> bool {
        true
    }

    fn do_fit(
        &self,
        data: &Dataset,
        fcn: &ModelFn<'_>,
        params: &mut [&mut Parameter],
        options: &FitOptions,
    ) -> Result<BackendOutcome> {
        let config = LmConfig::from_options(options)?;
        let epsilon = config.epsilon.unwrap_or(DEFAULT_EPSILON);
        let residuals = ResidualProblem::new(data, fcn, params)?.with_epsilon(config.epsilon);

        let bounds = residuals
            .free_indices()
            .iter()
            .map(|&i| params[i].bounds())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let transforms: Vec<BoundsTransform> =
            bounds.iter().map(|&b| BoundsTransform::new(b)).collect();
        let initial = residuals
            .initial()
            .iter()
            .zip(&transforms)
            .zip(residuals.free_names())
            .map(|((&v, t), name)| {
                t.to_internal(v).map_err(|e| {
                    FitError::FitExecution(format!("cannot start '{}' at {}: {}", name, v, e))
                })
            })
            .collect::<Result<Array1<f64>>>()?;

        let problem = InternalProblem {
            inner: &residuals,
            transforms,
            epsilon,
            parallel: config.parallel,
        };
        residuals.finite_residuals(&problem.to_external(&initial))?;

        let defaults = UnifitConfig::default();
        let refine = UnifitConfig {
            max_iterations: config.max_iterations,
            ftol: config.ftol.max(defaults.ftol),
            xtol: config.xtol.max(defaults.xtol),
            initial_lambda: config.initial_lambda,
            max_step: None,
            epsilon: config.epsilon,
        };
        let result = LevenbergMarquardt::with_config(config).minimize(&problem, initial)?;
        let mut external = problem.to_external(&result.params);
        let (mut success, mut message, mut iterations) =
            (result.success, result.message, result.iterations);

        let limited = external.iter().zip(&bounds).any(|(&v, b)| on_limit(v, b));
        let remaining = refine.max_iterations.saturating_sub(iterations);
        if (limited || !success) && remaining > 0 {
            log::debug!(
                "bounded: refining in external values after {} iterations ({})",
                iterations,
                message
            );
            let refine = UnifitConfig {
                max_iterations: remaining,
                ..refine
            };
            let minimum = unifit::minimize(&residuals, &bounds, external, &refine)?;
            external = minimum.params;
            success = minimum.success;
            message = format!("{} (refined in external values)", minimum.message);
            iterations += minimum.iterations;
        }

        let n_free = residuals.n_free();
        let cost: f64 = residuals.residuals(&external)?.iter().map(|r| r * r).sum();
        let chisqr = reduced_chisqr(cost, residuals.n_points(), n_free);
        let covar = if n_free > 0 {
            let jac = residuals.jacobian_at(&external)?;
            Some(calculate_covariance(&jac, chisqr)?)
        } else {
            None
        };
        residuals.write_back(params, &external, covar.as_ref())?;

        log::info!(
            "bounded fit finished after {} iterations: chisqr = {:.6e} ({})",
            iterations,
            chisqr,
            message
        );
        Ok(BackendOutcome {
            success,
            message,
            chisqr,
            iterations,
        })
    }
}
