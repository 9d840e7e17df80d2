//! Resolution of dependent parameters.
//!
//! [`prepare`] splits a parameter list into free and dependent parameters and
//! finds an evaluation order for the dependent ones by fixed-point passes.
//! During a fit the order is fixed, so every residual evaluation only calls
//! [`update`] to replay it against the new free values.

use crate::dataset::{lookup_scalar, Metadata};
use crate::error::{FitError, Result};
use crate::parameters::expression::{
    EvaluationContext, ExprResult, Expression, ExpressionError, DATA_ROOT,
};
use crate::parameters::parameter::{Parameter, ParameterError};
use std::collections::HashMap;

/// Parameter name to value
pub type ParamValues = HashMap<String, f64>;

/// Evaluation namespace: parameter values plus the `data` metadata tree.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub pool: &'a ParamValues,
    pub meta: &'a Metadata,
}

impl<'a> Scope<'a> {
    pub fn new(pool: &'a ParamValues, meta: &'a Metadata) -> Self {
        Self { pool, meta }
    }
}

impl EvaluationContext for Scope<'_> {
    fn get_variable(&self, name: &str) -> ExprResult<f64> {
        if name == DATA_ROOT {
            return Err(ExpressionError::NotScalar {
                path: name.to_string(),
            });
        }
        match name.strip_prefix("data.") {
            Some(path) => lookup_scalar(self.meta, path),
            None => self.pool.get_variable(name),
        }
    }
}

/// Outcome of [`prepare`]
#[derive(Debug, Clone)]
pub struct Prepared {
    /// Positions of the free parameters in the input list
    pub free_params: Vec<usize>,
    pub free_names: Vec<String>,
    pub free_values: Vec<f64>,
    /// Dependent parameters in evaluation order
    pub dependency_order: Vec<(String, Expression)>,
    /// Free values plus the resolved dependent values
    pub pool: ParamValues,
}

impl Prepared {
    pub fn n_free(&self) -> usize {
        self.free_names.len()
    }

    /// Write a new free vector into the pool and re-resolve the dependents.
    pub fn evaluate(&mut self, free: &[f64], meta: &Metadata) -> Result<&ParamValues> {
        if free.len() != self.free_names.len() {
            return Err(FitError::DimensionMismatch(format!(
                "expected {} free values, got {}",
                self.free_names.len(),
                free.len()
            )));
        }
        for (name, value) in self.free_names.iter().zip(free) {
            self.pool.insert(name.clone(), *value);
        }
        update(&self.dependency_order, meta, &mut self.pool)?;
        Ok(&self.pool)
    }
}

fn execution_error(name: &str, expr: &Expression, err: ExpressionError) -> FitError {
    FitError::FitExecution(format!(
        "cannot evaluate '{}' for parameter '{}': {}",
        expr, name, err
    ))
}

/// Partition `params` and resolve the dependent parameters.
///
/// Passes are repeated at most `n_dependent + 1` times. An expression that
/// fails only on an unknown parameter name is retried in the next pass; any
/// other failure aborts with [`FitError::FitExecution`]. Whatever is left
/// after the last pass is reported as [`FitError::DependencyResolution`].
pub fn prepare<'p, I>(params: I, meta: &Metadata) -> Result<Prepared>
where
    I: IntoIterator<Item = &'p Parameter>,
{
    let mut prepared = Prepared {
        free_params: Vec::new(),
        free_names: Vec::new(),
        free_values: Vec::new(),
        dependency_order: Vec::new(),
        pool: ParamValues::new(),
    };
    let mut pending = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for (index, param) in params.into_iter().enumerate() {
        if !seen.insert(param.name.as_str()) {
            return Err(ParameterError::NameClash {
                name: param.name.clone(),
            }
            .into());
        }
        match param.expression()? {
            Some(expr) => pending.push((param.name.clone(), expr)),
            None => {
                prepared.free_params.push(index);
                prepared.free_names.push(param.name.clone());
                prepared.free_values.push(param.value);
                prepared.pool.insert(param.name.clone(), param.value);
            }
        }
    }

    let max_passes = pending.len() + 1;
    for _ in 0..max_passes {
        if pending.is_empty() {
            break;
        }
        let mut deferred = Vec::new();
        for (name, expr) in pending {
            let scope = Scope::new(&prepared.pool, meta);
            match expr.evaluate(&scope) {
                Ok(value) => {
                    prepared.pool.insert(name.clone(), value);
                    prepared.dependency_order.push((name, expr));
                }
                Err(ExpressionError::UndefinedVariable { .. }) => deferred.push((name, expr)),
                Err(err) => return Err(execution_error(&name, &expr, err)),
            }
        }
        pending = deferred;
    }

    if !pending.is_empty() {
        let mut unresolved: Vec<String> = pending.into_iter().map(|(name, _)| name).collect();
        unresolved.sort();
        return Err(FitError::DependencyResolution { unresolved });
    }

    Ok(prepared)
}

/// Replay a known dependency order once against the current pool.
pub fn update(
    dependency_order: &[(String, Expression)],
    meta: &Metadata,
    pool: &mut ParamValues,
) -> Result<()> {
    for (name, expr) in dependency_order {
        let value = expr
            .evaluate(&Scope::new(pool, meta))
            .map_err(|err| execution_error(name, expr, err))?;
        pool.insert(name.clone(), value);
    }
    Ok(())
}

/// Values of all parameters, dependents included.
pub fn resolve_values<'p, I>(params: I, meta: &Metadata) -> Result<ParamValues>
where
    I: IntoIterator<Item = &'p Parameter>,
{
    Ok(prepare(params, meta)?.pool)
}
