//! # scanfit
//!
//! `scanfit` fits scattering scans (neutron and X-ray spectroscopy data)
//! against composable peak and background models.
//!
//! The library provides:
//! - Named parameters with limits, dependency expressions (`'2 * p1_fwhm'`,
//!   `'data.T / 10'`) and a resolver that evaluates them in a consistent order
//! - A model algebra (`+ - * / **`) over built-in shapes, user functions and
//!   constants, with modifier folding for component plots
//! - Textual model construction through a registry of model classes
//! - Interchangeable optimization backends: `bounded` (default), `minpack`
//!   and `unifit`
//! - Global fits of one model over several datasets with shared parameters
//!
//! ## Basic Usage
//!
//! ```
//! use scanfit::{fit, parse_model, Dataset};
//!
//! let data = Dataset::from_vecs(
//!     vec![1.0, 2.0, 3.0, 4.0, 5.0],
//!     vec![0.5, 1.5, 4.5, 1.5, 0.5],
//!     vec![1.0; 5],
//! )
//! .unwrap();
//! let mut model = parse_model("Background(bkgd=0) + Gauss('p', pos=3, ampl=4, fwhm=2)").unwrap();
//! let result = fit(model.as_mut(), &data).unwrap();
//!
//! assert!(result.success);
//! assert_eq!(result.params.len(), 4);
//! assert_eq!(model.get_components().len(), 1);
//! ```

pub mod backends;
pub mod config;
pub mod dataset;
pub mod error;
pub mod fit;
pub mod global;
pub mod lm;
pub mod model;
pub mod models;
pub mod parameters;
pub mod problem;
pub mod result;
pub mod uncertainty;
pub mod utils;

// Re-exports for convenience
pub use backends::{backend, Backend, BackendRegistry};
pub use config::FitOptions;
pub use dataset::{Dataset, MetaValue, Metadata};
pub use error::{FitError, Result};
pub use fit::{fit, Fitter};
pub use global::GlobalFit;
pub use model::{parse_model, CombinedModel, Model, ModelRegistry};
pub use parameters::{ParamInit, Parameter};
pub use result::{FitResult, GlobalResult};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
