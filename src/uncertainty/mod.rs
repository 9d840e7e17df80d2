//! # Uncertainty Calculation
//!
//! Parameter errors and correlations of a finished fit. Every backend reduces
//! its result to a covariance matrix over the free parameters; errors of
//! dependent parameters follow from first-order propagation through their
//! expressions.

mod covariance;

pub use covariance::{
    calculate_correlation, calculate_covariance, propagate_error, pseudo_inverse,
    standard_errors_from_covariance,
};
