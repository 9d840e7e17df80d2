//! Levenberg-Marquardt core used by the `bounded` backend.
//!
//! The optimizer works on any [`Problem`](crate::problem::Problem); the bounded
//! backend feeds it residuals expressed in unconstrained internal variables.

pub mod algorithm;
pub mod config;

pub use algorithm::{JacobianSource, LevenbergMarquardt, LmResult};
pub use config::{DecompositionMethod, LmConfig};
