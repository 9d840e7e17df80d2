//! Finite difference methods for numerical differentiation.
//!
//! All fits in this crate differentiate the model numerically. Steps are
//! relative to the parameter magnitude unless a parameter carries its own
//! `delta` hint.

use crate::error::{FitError, Result};
use crate::problem::Problem;
use ndarray::{Array1, Array2};
use rayon::prelude::*;

/// Default relative step size for finite differences.
pub const DEFAULT_EPSILON: f64 = 1e-8;

/// Forward-difference step for a parameter currently at `value`.
///
/// An explicit `delta` wins; otherwise the step is `eps * |value|`, or `eps`
/// itself for values close to zero.
pub fn step_size(value: f64, eps: f64, delta: Option<f64>) -> f64 {
    match delta {
        Some(d) if d > 0.0 && d.is_finite() => d,
        _ => {
            if value.abs() > eps {
                value.abs() * eps
            } else {
                eps
            }
        }
    }
}

fn check_residuals(residuals: &Array1<f64>, expected: usize) -> Result<()> {
    if residuals.len() != expected {
        return Err(FitError::DimensionMismatch(format!(
            "Expected {} residuals, got {}",
            expected,
            residuals.len()
        )));
    }
    Ok(())
}

/// Compute the Jacobian matrix using forward finite differences.
///
/// The Jacobian is the matrix of partial derivatives of the residuals with
/// respect to the parameters: J[i,j] = ∂residual[i]/∂param[j].
pub fn jacobian(
    problem: &dyn Problem,
    params: &Array1<f64>,
    epsilon: Option<f64>,
) -> Result<Array2<f64>> {
    let eps = epsilon.unwrap_or(DEFAULT_EPSILON);
    let steps: Vec<f64> = params.iter().map(|&p| step_size(p, eps, None)).collect();
    jacobian_with_steps(problem, params, &steps)
}

/// Forward-difference Jacobian with one explicit step per parameter.
pub fn jacobian_with_steps(
    problem: &dyn Problem,
    params: &Array1<f64>,
    steps: &[f64],
) -> Result<Array2<f64>> {
    let n_residuals = problem.residual_count();
    let residuals = problem.eval(params)?;
    check_residuals(&residuals, n_residuals)?;

    let mut jac = Array2::zeros((n_residuals, params.len()));
    for (j, &h) in steps.iter().enumerate().take(params.len()) {
        let mut perturbed = params.clone();
        perturbed[j] += h;
        let shifted = problem.eval(&perturbed)?;
        check_residuals(&shifted, n_residuals)?;

        let column = (&shifted - &residuals) / h;
        jac.column_mut(j).assign(&column);
    }

    Ok(jac)
}

/// Same as [`jacobian_with_steps`], evaluating the columns on the rayon pool.
pub fn jacobian_parallel(
    problem: &(dyn Problem + Sync),
    params: &Array1<f64>,
    steps: &[f64],
) -> Result<Array2<f64>> {
    let n_residuals = problem.residual_count();
    let residuals = problem.eval(params)?;
    check_residuals(&residuals, n_residuals)?;

    let columns: Result<Vec<Array1<f64>>> = steps
        .par_iter()
        .take(params.len())
        .enumerate()
        .map(|(j, &h)| {
            let mut perturbed = params.clone();
            perturbed[j] += h;
            let shifted = problem.eval(&perturbed)?;
            check_residuals(&shifted, n_residuals)?;
            Ok((&shifted - &residuals) / h)
        })
        .collect();

    let mut jac = Array2::zeros((n_residuals, params.len()));
    for (j, column) in columns?.into_iter().enumerate() {
        jac.column_mut(j).assign(&column);
    }
    Ok(jac)
}

/// Forward-difference gradient of a scalar function.
pub fn gradient<F>(f: F, params: &Array1<f64>, steps: &[f64]) -> Result<Array1<f64>>
where
    F: Fn(&Array1<f64>) -> Result<f64>,
{
    let f0 = f(params)?;
    let mut grad = Array1::zeros(params.len());
    for (j, &h) in steps.iter().enumerate().take(params.len()) {
        let mut perturbed = params.clone();
        perturbed[j] += h;
        grad[j] = (f(&perturbed)? - f0) / h;
    }
    Ok(grad)
}
