//! Fit driver.
//!
//! [`Fitter`] pairs a backend with its options and runs the full fit
//! sequence on a model: snapshot the starting values, optimize, apply the
//! per-parameter `finalize` transforms, recompute the reduced chi-square and
//! sample the model on a dense grid.
//!
//! ```
//! use scanfit::dataset::Dataset;
//! use scanfit::fit::Fitter;
//! use scanfit::model::parse_model;
//!
//! let data = Dataset::from_vecs(
//!     vec![1.0, 2.0, 3.0, 4.0, 5.0],
//!     vec![0.0, 1.0, 4.0, 1.0, 0.0],
//!     vec![1.0; 5],
//! )
//! .unwrap();
//! let mut model = parse_model("Gauss('p', pos=3, ampl=4, fwhm=2)").unwrap();
//! let result = Fitter::default().fit(model.as_mut(), &data).unwrap();
//! assert!(result.success);
//! assert!((result.get("p_pos").unwrap().value - 3.0).abs() < 1e-2);
//! ```

use crate::backends::{self, reduced_chisqr, Backend, BackendOutcome, DEFAULT_BACKEND};
use crate::config::FitOptions;
use crate::dataset::{Dataset, Metadata};
use crate::error::{FitError, Result};
use crate::model::Model;
use crate::parameters::resolver::ParamValues;
use crate::parameters::Parameter;
use crate::result::FitResult;
use ndarray::Array1;

/// Number of points of the sampled model curve
pub const CURVE_POINTS: usize = 1000;

/// A backend together with the options it is run with.
#[derive(Debug)]
pub struct Fitter {
    backend: Box<dyn Backend>,
    options: FitOptions,
}

impl Default for Fitter {
    fn default() -> Self {
        Self::new(Box::new(backends::BoundedBackend), FitOptions::new())
    }
}

impl Fitter {
    pub fn new(backend: Box<dyn Backend>, options: FitOptions) -> Self {
        Self { backend, options }
    }

    /// Fitter for a backend of the default registry, with empty options.
    pub fn with_backend_name(name: &str) -> Result<Self> {
        Ok(Self::new(backends::backend(name)?, FitOptions::new()))
    }

    pub fn with_options(mut self, options: FitOptions) -> Self {
        self.options = options;
        self
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn options(&self) -> &FitOptions {
        &self.options
    }

    /// Fit `model` to `data`, updating the model's parameters in place.
    ///
    /// Hard failures are returned as errors and leave the parameter values
    /// as they were. A run that ends without convergence is `Ok` with
    /// `success == false`.
    pub fn fit(&self, model: &mut dyn Model, data: &Dataset) -> Result<FitResult> {
        model.snapshot();

        let evaluator = model.box_clone();
        let fcn = move |values: &ParamValues, x: &Array1<f64>| evaluator.eval(values, x);
        let outcome = {
            let mut params = model.params_mut();
            self.backend.do_fit(data, &fcn, &mut params, &self.options)?
        };

        let values = finalize(model, &data.meta)?;
        let n_free = model.params().iter().filter(|p| p.is_free()).count();
        let chisqr = dataset_chisqr(&*model, &values, data, n_free)?;
        let (curve_x, curve_y) = sample_curve(&*model, &values, data)?;

        log::debug!(
            "fit of {} with {}: chisqr = {:.6e}",
            model.description(),
            self.backend.name(),
            chisqr
        );
        Ok(package(
            &*model,
            outcome,
            self.backend.name(),
            chisqr,
            (curve_x, curve_y),
            data.len(),
            n_free,
        ))
    }
}

/// Fit with the default backend and options.
pub fn fit(model: &mut dyn Model, data: &Dataset) -> Result<FitResult> {
    Fitter::with_backend_name(DEFAULT_BACKEND)?.fit(model, data)
}

/// Apply `finalize` to the free parameters, then refresh the dependents.
///
/// Returns the value pool the model is evaluated with afterwards.
pub(crate) fn finalize(model: &mut dyn Model, meta: &Metadata) -> Result<ParamValues> {
    for p in model.params_mut() {
        if p.is_free() {
            p.value = p.finalize.apply(p.value);
        }
    }
    let values = model.param_values(meta)?;
    for p in model.params_mut() {
        if let (false, Some(value)) = (p.is_free(), values.get(&p.name)) {
            p.value = p.finalize.apply(*value);
        }
    }
    Ok(values)
}

/// Reduced chi-square of `model` on `data`; the denominator is at least 1.
pub(crate) fn dataset_chisqr(
    model: &dyn Model,
    values: &ParamValues,
    data: &Dataset,
    n_free: usize,
) -> Result<f64> {
    let y = model.eval(values, &data.x)?;
    if y.len() != data.len() {
        return Err(FitError::DimensionMismatch(format!(
            "model returned {} values for {} data points",
            y.len(),
            data.len()
        )));
    }
    let cost = ((&y - &data.y) / &data.dy).mapv(|r| r * r).sum();
    Ok(reduced_chisqr(cost, data.len(), n_free))
}

/// Model evaluated on [`CURVE_POINTS`] points spanning the data's x range.
pub(crate) fn sample_curve(
    model: &dyn Model,
    values: &ParamValues,
    data: &Dataset,
) -> Result<(Vec<f64>, Vec<f64>)> {
    let Some((lo, hi)) = data.x_range() else {
        return Ok((Vec::new(), Vec::new()));
    };
    let x = Array1::linspace(lo, hi, CURVE_POINTS);
    let y = model.eval(values, &x)?;
    Ok((x.to_vec(), y.to_vec()))
}

pub(crate) fn package(
    model: &dyn Model,
    outcome: BackendOutcome,
    backend: &str,
    chisqr: f64,
    (curve_x, curve_y): (Vec<f64>, Vec<f64>),
    n_points: usize,
    n_free: usize,
) -> FitResult {
    FitResult {
        success: outcome.success,
        message: outcome.message,
        chisqr,
        params: model.params().into_iter().map(Parameter::clone).collect(),
        curve_x,
        curve_y,
        model: model.description(),
        backend: backend.to_string(),
        iterations: outcome.iterations,
        n_points,
        n_free,
    }
}
