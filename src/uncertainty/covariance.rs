//! # Covariance Matrix Calculations
//!
//! Covariance, correlation and standard errors of fitted parameters, estimated
//! from the Jacobian of the weighted residuals at the solution:
//!
//! ```text
//! covar = scale * pinv(J^T J)
//! ```
//!
//! where `scale` is the reduced chi-square (`SS / dof`). The pseudo-inverse
//! keeps the estimate finite for rank-deficient problems.

use crate::error::{FitError, Result};
use crate::utils::matrix_convert::{nalgebra_to_ndarray, ndarray_to_nalgebra};
use ndarray::{Array1, Array2};

const RCOND: f64 = 1e-15;

/// Moore-Penrose pseudo-inverse via SVD.
///
/// Singular values below `max(rows, cols) * 1e-15 * s_max` are treated as zero.
pub fn pseudo_inverse(matrix: &Array2<f64>) -> Result<Array2<f64>> {
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(FitError::FitExecution(
            "cannot invert a matrix with non-finite entries".to_string(),
        ));
    }
    let (rows, cols) = matrix.dim();
    if rows == 0 || cols == 0 {
        return Ok(Array2::zeros((cols, rows)));
    }

    let svd = ndarray_to_nalgebra(matrix).svd(true, true);
    let s_max = svd.singular_values.max();
    let eps = RCOND * rows.max(cols) as f64 * s_max;
    let pinv = svd
        .pseudo_inverse(eps)
        .map_err(|e| FitError::FitExecution(format!("pseudo-inverse failed: {}", e)))?;
    Ok(nalgebra_to_ndarray(&pinv))
}

/// Calculate the covariance matrix `scale * pinv(J^T J)`.
pub fn calculate_covariance(jacobian: &Array2<f64>, scale: f64) -> Result<Array2<f64>> {
    let jtj = jacobian.t().dot(jacobian);
    Ok(pseudo_inverse(&jtj)? * scale)
}

/// Calculate correlation matrix from covariance matrix.
///
/// `correl[i,j] = covar[i,j] / sqrt(covar[i,i] * covar[j,j])`; pairs involving a
/// parameter with zero variance get 0.
pub fn calculate_correlation(covar: &Array2<f64>) -> Array2<f64> {
    let n = covar.nrows();
    Array2::from_shape_fn((n, n), |(i, j)| {
        if i == j {
            return 1.0;
        }
        let denom = (covar[[i, i]] * covar[[j, j]]).sqrt();
        if denom > 0.0 {
            covar[[i, j]] / denom
        } else {
            0.0
        }
    })
}

/// Standard errors are the square roots of the diagonal elements.
pub fn standard_errors_from_covariance(covar: &Array2<f64>) -> Array1<f64> {
    covar.diag().mapv(|v| if v > 0.0 { v.sqrt() } else { 0.0 })
}

/// Error of a derived quantity with gradient `grad` w.r.t. the free
/// parameters: `sqrt(g^T C g)`.
pub fn propagate_error(grad: &Array1<f64>, covar: &Array2<f64>) -> f64 {
    let variance = grad.dot(&covar.dot(grad));
    if variance > 0.0 {
        variance.sqrt()
    } else {
        0.0
    }
}
