//! Weighted residuals over the free parameters of a model.

use super::ModelFn;
use crate::dataset::Dataset;
use crate::error::{FitError, Result};
use crate::parameters::expression::Expression;
use crate::parameters::resolver::{self, ParamValues, Prepared};
use crate::parameters::Parameter;
use crate::problem::Problem;
use crate::uncertainty::{calculate_correlation, propagate_error, standard_errors_from_covariance};
use crate::utils::finite_difference::{self, step_size, DEFAULT_EPSILON};
use ndarray::{Array1, Array2};
use std::collections::BTreeMap;

/// Residuals `(fcn(p, x) - y) / dy` as a function of the free parameters.
///
/// The dependency order is resolved once at construction; every evaluation
/// replays it on a copy of the resolved value pool.
pub struct ResidualProblem<'a> {
    data: &'a Dataset,
    fcn: &'a ModelFn<'a>,
    prepared: Prepared,
    deltas: Vec<Option<f64>>,
    epsilon: f64,
}

impl<'a> ResidualProblem<'a> {
    pub fn new(data: &'a Dataset, fcn: &'a ModelFn<'a>, params: &[&mut Parameter]) -> Result<Self> {
        if data.is_empty() {
            return Err(FitError::InvalidInput("cannot fit an empty dataset".to_string()));
        }
        let prepared = resolver::prepare(params.iter().map(|p| &**p), &data.meta)?;
        let deltas = prepared.free_params.iter().map(|&i| params[i].delta).collect();
        Ok(Self {
            data,
            fcn,
            prepared,
            deltas,
            epsilon: DEFAULT_EPSILON,
        })
    }

    /// Relative finite-difference step for parameters without a `delta`.
    pub fn with_epsilon(mut self, epsilon: Option<f64>) -> Self {
        self.epsilon = epsilon.unwrap_or(DEFAULT_EPSILON);
        self
    }

    pub fn data(&self) -> &Dataset {
        self.data
    }

    pub fn n_free(&self) -> usize {
        self.prepared.n_free()
    }

    pub fn n_points(&self) -> usize {
        self.data.len()
    }

    pub fn free_names(&self) -> &[String] {
        &self.prepared.free_names
    }

    /// Positions of the free parameters in the parameter list.
    pub fn free_indices(&self) -> &[usize] {
        &self.prepared.free_params
    }

    /// Free values at the start of the fit.
    pub fn initial(&self) -> Array1<f64> {
        Array1::from(self.prepared.free_values.clone())
    }

    pub fn dependency_order(&self) -> &[(String, Expression)] {
        &self.prepared.dependency_order
    }

    /// Full value pool for a free vector.
    pub fn pool_at(&self, free: &Array1<f64>) -> Result<ParamValues> {
        if free.len() != self.n_free() {
            return Err(FitError::DimensionMismatch(format!(
                "expected {} free values, got {}",
                self.n_free(),
                free.len()
            )));
        }
        let mut pool = self.prepared.pool.clone();
        for (name, value) in self.prepared.free_names.iter().zip(free.iter()) {
            pool.insert(name.clone(), *value);
        }
        resolver::update(&self.prepared.dependency_order, &self.data.meta, &mut pool)?;
        Ok(pool)
    }

    /// Weighted residuals. Non-finite entries are returned as they are.
    pub fn residuals(&self, free: &Array1<f64>) -> Result<Array1<f64>> {
        let pool = self.pool_at(free)?;
        let y = (self.fcn)(&pool, &self.data.x)?;
        if y.len() != self.data.len() {
            return Err(FitError::DimensionMismatch(format!(
                "model returned {} values for {} data points",
                y.len(),
                self.data.len()
            )));
        }
        Ok((&y - &self.data.y) / &self.data.dy)
    }

    /// Residuals that must be finite, e.g. at the starting point.
    pub fn finite_residuals(&self, free: &Array1<f64>) -> Result<Array1<f64>> {
        let r = self.residuals(free)?;
        if r.iter().any(|v| !v.is_finite()) {
            return Err(FitError::FitExecution(
                "model produced non-finite residuals".to_string(),
            ));
        }
        Ok(r)
    }

    /// Forward-difference steps for the free parameters at `free`.
    pub fn steps(&self, free: &Array1<f64>) -> Vec<f64> {
        free.iter()
            .zip(&self.deltas)
            .map(|(&v, &delta)| step_size(v, self.epsilon, delta))
            .collect()
    }

    /// Jacobian of the residuals; a non-finite derivative is an error.
    pub fn jacobian_at(&self, free: &Array1<f64>) -> Result<Array2<f64>> {
        let steps = self.steps(free);
        let jac = finite_difference::jacobian_with_steps(self, free, &steps)?;
        for (j, column) in jac.columns().into_iter().enumerate() {
            if column.iter().any(|v| !v.is_finite()) {
                return Err(FitError::FitExecution(format!(
                    "non-finite derivative with respect to '{}'",
                    self.prepared.free_names[j]
                )));
            }
        }
        Ok(jac)
    }

    /// Store a solution in `params`.
    ///
    /// Everything that can fail is computed before the first parameter is
    /// touched. Free parameters get values, errors and correlations from
    /// `covar`; dependent parameters get their resolved values and errors
    /// propagated through their expressions.
    pub fn write_back(
        &self,
        params: &mut [&mut Parameter],
        free: &Array1<f64>,
        covar: Option<&Array2<f64>>,
    ) -> Result<()> {
        let pool = self.pool_at(free)?;

        let mut dependent_errors = BTreeMap::new();
        if let Some(covar) = covar {
            let steps = self.steps(free);
            for (name, _) in &self.prepared.dependency_order {
                let grad = finite_difference::gradient(
                    |p| {
                        let pool = self.pool_at(p)?;
                        Ok(pool.get(name).copied().unwrap_or(f64::NAN))
                    },
                    free,
                    &steps,
                )?;
                let error = if grad.iter().all(|g| g.is_finite()) {
                    propagate_error(&grad, covar)
                } else {
                    f64::NAN
                };
                dependent_errors.insert(name.as_str(), error);
            }
        }

        let free_set = &self.prepared.free_params;
        let errors = covar.map(standard_errors_from_covariance);
        let correl = covar.map(calculate_correlation);
        for (k, &index) in free_set.iter().enumerate() {
            let param = &mut *params[index];
            param.value = free[k];
            param.error = errors.as_ref().map(|e| e[k]);
            param.correl = match &correl {
                Some(correl) => self
                    .prepared
                    .free_names
                    .iter()
                    .enumerate()
                    .filter(|&(l, _)| l != k)
                    .map(|(l, other)| (other.clone(), correl[[k, l]]))
                    .collect(),
                None => BTreeMap::new(),
            };
        }

        for param in params.iter_mut() {
            if param.is_free() {
                continue;
            }
            if let Some(value) = pool.get(&param.name) {
                param.value = *value;
            }
            param.error = dependent_errors.get(param.name.as_str()).copied();
            param.correl.clear();
        }
        Ok(())
    }
}

impl Problem for ResidualProblem<'_> {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        self.residuals(params)
    }

    fn parameter_count(&self) -> usize {
        self.n_free()
    }

    fn residual_count(&self) -> usize {
        self.data.len()
    }

    fn jacobian(&self, params: &Array1<f64>) -> Result<Array2<f64>>
    where
        Self: Sized,
    {
        self.jacobian_at(params)
    }
}
