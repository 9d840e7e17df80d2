//! Optimization backends.
//!
//! A backend minimizes the weighted residuals `(fcn(p, x) - y) / dy` of a
//! dataset over the free parameters and writes the best-fit values, errors
//! and correlations back into the parameters. Backends are selected
//! explicitly, by handle or by registry name:
//!
//! - `bounded`: Levenberg-Marquardt over Minuit-transformed variables, so
//!   every parameter stays inside its limits (the default)
//! - `minpack`: the `levenberg-marquardt` crate; limits are ignored
//!   (requires the `lm-compat` feature)
//! - `unifit`: legacy SVD Levenberg-Marquardt with a fixed damping ladder
//!
//! Numerical breakdowns are errors and leave the parameters untouched. Running
//! out of iterations is not an error: the outcome reports `success = false`
//! and the parameters hold the best values found.

pub mod bounded;
#[cfg(feature = "lm-compat")]
pub mod minpack;
pub mod residual;
pub mod unifit;

pub use bounded::BoundedBackend;
#[cfg(feature = "lm-compat")]
pub use minpack::{MinpackBackend, MinpackConfig};
pub use residual::ResidualProblem;
pub use unifit::{UnifitBackend, UnifitConfig};

use crate::config::FitOptions;
use crate::dataset::Dataset;
use crate::error::{FitError, Result};
use crate::parameters::resolver::ParamValues;
use crate::parameters::Parameter;
use ndarray::Array1;
use std::collections::BTreeMap;
use std::fmt;

/// Name of the backend used when none is given.
pub const DEFAULT_BACKEND: &str = "bounded";

/// Model function handed to a backend: value pool and x to y.
pub type ModelFn<'a> = dyn Fn(&ParamValues, &Array1<f64>) -> Result<Array1<f64>> + Sync + 'a;

/// What a backend reports besides the parameters it updated.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendOutcome {
    pub success: bool,
    pub message: String,
    /// Reduced chi-square at the returned parameters
    pub chisqr: f64,
    pub iterations: usize,
}

/// An optimization backend.
pub trait Backend: fmt::Debug + Send + Sync {
    /// Registry name
    fn name(&self) -> &'static str;

    /// Whether parameter limits are honored.
    fn supports_bounds(&self) -> bool;

    /// Fit `params` so that `fcn` matches `data`.
    ///
    /// `params` holds every parameter of the model: free ones are varied,
    /// dependent ones are recomputed from their expressions.
    fn do_fit(
        &self,
        data: &Dataset,
        fcn: &ModelFn<'_>,
        params: &mut [&mut Parameter],
        options: &FitOptions,
    ) -> Result<BackendOutcome>;
}

/// Creates a backend instance.
pub type BackendFactory = fn() -> Box<dyn Backend>;

/// Backends available in this build, by name.
#[derive(Clone)]
pub struct BackendRegistry {
    factories: BTreeMap<&'static str, BackendFactory>,
}

impl BackendRegistry {
    /// A registry with no backends.
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Register `factory` under `name`, replacing any earlier entry.
    pub fn register(&mut self, name: &'static str, factory: BackendFactory) {
        self.factories.insert(name, factory);
    }

    /// Instantiate the backend registered as `name`.
    pub fn get(&self, name: &str) -> Result<Box<dyn Backend>> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| FitError::BackendUnavailable(name.to_string()))
    }

    /// Registered backend names, in sorted order.
    pub fn names(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("bounded", || Box::new(BoundedBackend) as Box<dyn Backend>);
        registry.register("unifit", || Box::new(UnifitBackend) as Box<dyn Backend>);
        #[cfg(feature = "lm-compat")]
        registry.register("minpack", || Box::new(MinpackBackend) as Box<dyn Backend>);
        registry
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

/// Look up a backend of the default registry.
pub fn backend(name: &str) -> Result<Box<dyn Backend>> {
    BackendRegistry::default().get(name)
}

/// Reduced chi-square `cost / max(n - n_free, 1)`.
pub(crate) fn reduced_chisqr(cost: f64, n_points: usize, n_free: usize) -> f64 {
    cost / n_points.saturating_sub(n_free).max(1) as f64
}
