//! Global fits: one model, several datasets, one optimization.
//!
//! Parameters marked `overall` exist once and are shared by every dataset.
//! All others are duplicated per dataset as `name__i`. Dependent expressions
//! are rewritten on their syntax tree: per-dataset names get the index suffix
//! and `data.<path>` becomes `data.d<i>.<path>`, pointing into the metadata of
//! the concatenated dataset. Whole identifiers are renamed, so `pos` never
//! touches `pos2`.
//!
//! ```
//! use scanfit::backends::BoundedBackend;
//! use scanfit::config::FitOptions;
//! use scanfit::dataset::Dataset;
//! use scanfit::global::GlobalFit;
//! use scanfit::model::parse_model;
//!
//! let x = vec![0.0, 1.0, 2.0, 3.0];
//! let datasets = vec![
//!     Dataset::from_vecs(x.clone(), vec![1.0, 3.0, 5.0, 7.0], vec![1.0; 4]).unwrap(),
//!     Dataset::from_vecs(x, vec![2.0, 4.0, 6.0, 8.0], vec![1.0; 4]).unwrap(),
//! ];
//! let model = parse_model("StraightLine(slope=overall(1), y0=0)").unwrap();
//! let mut global = GlobalFit::new(model.as_ref(), datasets).unwrap();
//! let result = global.fit(&BoundedBackend, &FitOptions::new()).unwrap();
//! assert!((result.results[0].get("slope").unwrap().value - 2.0).abs() < 1e-4);
//! assert!((result.results[1].get("y0").unwrap().value - 2.0).abs() < 1e-4);
//! ```

use crate::backends::{reduced_chisqr, Backend, BackendOutcome};
use crate::config::FitOptions;
use crate::dataset::Dataset;
use crate::error::{FitError, Result};
use crate::fit::{dataset_chisqr, package, sample_curve};
use crate::model::{check_unique_names, Model};
use crate::parameters::expression::{Expression, DATA_ROOT};
use crate::parameters::resolver::{self, ParamValues};
use crate::parameters::{Parameter, ParameterError};
use crate::result::{FitResult, GlobalResult};
use ndarray::{s, Array1};
use std::collections::{BTreeMap, HashSet};

/// Separator between a parameter name and its dataset index
pub const INDEX_SEPARATOR: &str = "__";

/// Name of the copy of `base` that belongs to dataset `index`.
pub fn indexed_name(base: &str, index: usize) -> String {
    format!("{}{}{}", base, INDEX_SEPARATOR, index)
}

/// Split `name__i` into `(name, i)`.
fn split_indexed(name: &str) -> Option<(&str, usize)> {
    let (base, index) = name.rsplit_once(INDEX_SEPARATOR)?;
    Some((base, index.parse().ok()?))
}

fn definition_error(name: &str, message: String) -> FitError {
    ParameterError::InvalidInitializer {
        name: name.to_string(),
        message,
    }
    .into()
}

/// A model replicated over several datasets.
#[derive(Debug, Clone)]
pub struct GlobalFit {
    model: Box<dyn Model>,
    datasets: Vec<Dataset>,
    combined: Dataset,
    /// Names of the shared parameters
    shared: HashSet<String>,
    /// Aggregate parameter list
    params: Vec<Parameter>,
}

impl GlobalFit {
    /// Build the aggregate parameter list of `model` over `datasets`.
    ///
    /// Fails if an overall parameter depends on per-dataset parameters or on
    /// metadata, or if a per-dataset expression names the copy of another
    /// dataset.
    pub fn new(model: &dyn Model, datasets: Vec<Dataset>) -> Result<Self> {
        if datasets.is_empty() {
            return Err(FitError::InvalidInput(
                "a global fit needs at least one dataset".to_string(),
            ));
        }
        let combined = Dataset::concat(&datasets)?;

        let originals = model.params();
        let shared: HashSet<String> = originals
            .iter()
            .filter(|p| p.overall)
            .map(|p| p.name.clone())
            .collect();
        let local: HashSet<&str> = originals
            .iter()
            .filter(|p| !p.overall)
            .map(|p| p.name.as_str())
            .collect();

        let mut params = Vec::new();
        for param in &originals {
            let expr = param.expression()?;
            if param.overall {
                if let Some(expr) = &expr {
                    check_overall(&param.name, expr, &local)?;
                }
                params.push((*param).clone());
                continue;
            }
            for index in 0..datasets.len() {
                let mut copy = param.renamed(&indexed_name(&param.name, index));
                if let Some(expr) = &expr {
                    let rewritten = localize(&param.name, expr, index, &local)?;
                    copy.set_expr(Some(&rewritten.to_string()))?;
                }
                params.push(copy);
            }
        }
        check_unique_names(&params)?;

        log::debug!(
            "global fit over {} datasets: {} shared and {} per-dataset parameters",
            datasets.len(),
            shared.len(),
            local.len()
        );
        Ok(Self {
            model: model.box_clone(),
            datasets,
            combined,
            shared,
            params,
        })
    }

    /// Aggregate parameters, with values from the last fit.
    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn param_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.params.iter_mut().find(|p| p.name == name)
    }

    pub fn datasets(&self) -> &[Dataset] {
        &self.datasets
    }

    /// The concatenated dataset the optimizer runs on
    pub fn combined(&self) -> &Dataset {
        &self.combined
    }

    /// Pool of dataset `index` under the model's own parameter names.
    fn dataset_pool(&self, values: &ParamValues, index: usize) -> Result<ParamValues> {
        self.model
            .params()
            .iter()
            .map(|p| {
                let source = if self.shared.contains(&p.name) {
                    p.name.clone()
                } else {
                    indexed_name(&p.name, index)
                };
                values
                    .get(&source)
                    .map(|v| (p.name.clone(), *v))
                    .ok_or_else(|| {
                        FitError::FitExecution(format!("no value for parameter '{}'", source))
                    })
            })
            .collect()
    }

    /// Evaluate the model on the concatenated x, dataset by dataset.
    fn evaluate(&self, values: &ParamValues, x: &Array1<f64>) -> Result<Array1<f64>> {
        if x.len() != self.combined.len() {
            return Err(FitError::DimensionMismatch(format!(
                "expected {} x values, got {}",
                self.combined.len(),
                x.len()
            )));
        }
        let mut y = Array1::zeros(x.len());
        let mut start = 0;
        for (index, data) in self.datasets.iter().enumerate() {
            let end = start + data.len();
            let pool = self.dataset_pool(values, index)?;
            let part = self.model.eval(&pool, &x.slice(s![start..end]).to_owned())?;
            if part.len() != data.len() {
                return Err(FitError::DimensionMismatch(format!(
                    "model returned {} values for {} data points",
                    part.len(),
                    data.len()
                )));
            }
            y.slice_mut(s![start..end]).assign(&part);
            start = end;
        }
        Ok(y)
    }

    /// Weighted residuals of all datasets at the current parameter values.
    pub fn residuals(&self) -> Result<Array1<f64>> {
        let values = resolver::resolve_values(&self.params, &self.combined.meta)?;
        let y = self.evaluate(&values, &self.combined.x)?;
        Ok((&y - &self.combined.y) / &self.combined.dy)
    }

    /// Restore the values from before the first fit.
    pub fn reset(&mut self) {
        for p in &mut self.params {
            p.reset();
        }
    }

    /// Run one optimization over all datasets and split the result.
    ///
    /// The aggregate parameters keep the fitted values, so a later call
    /// continues from them.
    pub fn fit(&mut self, backend: &dyn Backend, options: &FitOptions) -> Result<GlobalResult> {
        let mut params = self.params.clone();
        for p in &mut params {
            p.snapshot();
        }
        let outcome = {
            let fcn = |values: &ParamValues, x: &Array1<f64>| self.evaluate(values, x);
            let mut refs: Vec<&mut Parameter> = params.iter_mut().collect();
            backend.do_fit(&self.combined, &fcn, &mut refs, options)?
        };
        for p in &mut params {
            if p.is_free() {
                p.value = p.finalize.apply(p.value);
            }
        }
        self.params = params;

        let values = resolver::resolve_values(&self.params, &self.combined.meta)?;
        let n_free = self.params.iter().filter(|p| p.is_free()).count();
        let cost = self.residuals()?.mapv(|r| r * r).sum();
        let chisqr = reduced_chisqr(cost, self.combined.len(), n_free);

        let results = (0..self.datasets.len())
            .map(|index| self.split(&values, index, &outcome, backend.name()))
            .collect::<Result<Vec<_>>>()?;

        log::info!(
            "global fit over {} datasets finished: chisqr = {:.6e} ({})",
            self.datasets.len(),
            chisqr,
            outcome.message
        );
        Ok(GlobalResult {
            success: outcome.success,
            message: outcome.message,
            chisqr,
            backend: backend.name().to_string(),
            iterations: outcome.iterations,
            results,
        })
    }

    /// Result of dataset `index` under the original parameter names.
    fn split(
        &self,
        values: &ParamValues,
        index: usize,
        outcome: &BackendOutcome,
        backend: &str,
    ) -> Result<FitResult> {
        let data = &self.datasets[index];
        let pool = self.dataset_pool(values, index)?;

        let mut model = self.model.box_clone();
        let mut n_free = 0;
        for param in model.params_mut() {
            let source = if self.shared.contains(&param.name) {
                param.name.clone()
            } else {
                indexed_name(&param.name, index)
            };
            let fitted = self.param(&source).ok_or_else(|| {
                FitError::FitExecution(format!("no fitted parameter '{}'", source))
            })?;
            if fitted.is_free() {
                n_free += 1;
            }
            param.value = match pool.get(&param.name) {
                Some(value) if !fitted.is_free() => param.finalize.apply(*value),
                _ => fitted.value,
            };
            param.error = fitted.error;
            param.correl = self.local_correl(&fitted.correl, index);
        }

        let chisqr = dataset_chisqr(model.as_ref(), &pool, data, n_free)?;
        let curve = sample_curve(model.as_ref(), &pool, data)?;
        let outcome = BackendOutcome {
            chisqr,
            ..outcome.clone()
        };
        Ok(package(
            model.as_ref(),
            outcome,
            backend,
            chisqr,
            curve,
            data.len(),
            n_free,
        ))
    }

    /// Correlations with shared and own parameters, under original names.
    fn local_correl(&self, correl: &BTreeMap<String, f64>, index: usize) -> BTreeMap<String, f64> {
        correl
            .iter()
            .filter_map(|(name, c)| {
                if self.shared.contains(name) {
                    return Some((name.clone(), *c));
                }
                match split_indexed(name) {
                    Some((base, i)) if i == index => Some((base.to_string(), *c)),
                    _ => None,
                }
            })
            .collect()
    }
}

/// An overall dependent may only use other overall parameters.
fn check_overall(name: &str, expr: &Expression, local: &HashSet<&str>) -> Result<()> {
    for var in expr.variables() {
        if var == DATA_ROOT || var.starts_with("data.") {
            return Err(definition_error(
                name,
                format!("overall parameter cannot use dataset metadata ('{}')", var),
            ));
        }
        if local.contains(var.as_str()) || split_indexed(&var).is_some_and(|(b, _)| local.contains(b)) {
            return Err(definition_error(
                name,
                format!("overall parameter cannot depend on per-dataset parameter '{}'", var),
            ));
        }
    }
    Ok(())
}

/// Rewrite `expr` of a per-dataset parameter for dataset `index`.
fn localize(name: &str, expr: &Expression, index: usize, local: &HashSet<&str>) -> Result<Expression> {
    for var in expr.variables() {
        if let Some((base, i)) = split_indexed(&var) {
            if i != index && local.contains(base) {
                return Err(definition_error(
                    name,
                    format!("'{}' belongs to dataset {}, not {}", var, i, index),
                ));
            }
        }
    }
    let data_prefix = format!("{}.", DATA_ROOT);
    Ok(expr.rename(&|var: &str| {
        if local.contains(var) {
            Some(indexed_name(var, index))
        } else if var == DATA_ROOT {
            Some(format!("{}.d{}", DATA_ROOT, index))
        } else {
            var.strip_prefix(&data_prefix)
                .map(|path| format!("{}.d{}.{}", DATA_ROOT, index, path))
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::BoundedBackend;
    use crate::model::parse_model;
    use approx::assert_relative_eq;

    fn datasets() -> Vec<Dataset> {
        let x = Array1::<f64>::linspace(-3.0, 3.0, 25);
        let make = |ampl: f64, t: f64| {
            let y = x.mapv(|x| {
                ampl * (-4.0 * 2f64.ln() * (x - 0.2).powi(2) / 1.5f64.powi(2)).exp()
                    + 0.01 * (5.0 * x).sin()
            });
            Dataset::new(x.clone(), y, Array1::from_elem(25, 0.1))
                .unwrap()
                .with_meta("T", t)
        };
        vec![make(2.0, 10.0), make(5.0, 20.0)]
    }

    #[test]
    fn test_parameter_duplication() {
        let model = parse_model("Gauss(pos=overall(0), ampl=1, fwhm='data.T / 10')").unwrap();
        let global = GlobalFit::new(model.as_ref(), datasets()).unwrap();
        let names: Vec<&str> = global.params().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["pos", "ampl__0", "ampl__1", "fwhm__0", "fwhm__1"]
        );
        assert_eq!(global.param("fwhm__1").unwrap().expr.as_deref(), Some("data.d1.T / 10"));
        assert_eq!(global.residuals().unwrap().len(), 50);
    }

    #[test]
    fn test_rewrite_is_identifier_exact() {
        let model = parse_model("Gauss('p', pos=0, ampl='p_pos + 1') + Gauss('p2', pos='p_pos * 2')")
            .unwrap();
        let global = GlobalFit::new(model.as_ref(), datasets()).unwrap();
        assert_eq!(global.param("p_ampl__1").unwrap().expr.as_deref(), Some("p_pos__1 + 1"));
        assert_eq!(global.param("p2_pos__0").unwrap().expr.as_deref(), Some("p_pos__0 * 2"));
    }

    #[test]
    fn test_construction_errors() {
        let model = parse_model("Gauss(pos=0, ampl=overall('pos * 2'))").unwrap();
        let err = GlobalFit::new(model.as_ref(), datasets()).unwrap_err();
        assert!(err.is_construction_error());

        let model = parse_model("Gauss(pos=0, ampl=overall(datapar('T')))").unwrap();
        assert!(GlobalFit::new(model.as_ref(), datasets()).is_err());

        let model = parse_model("Gauss(pos=0, ampl='pos__1')").unwrap();
        let err = GlobalFit::new(model.as_ref(), datasets()).unwrap_err();
        assert!(err.to_string().contains("dataset 1"));

        assert!(matches!(
            GlobalFit::new(model.as_ref(), Vec::new()),
            Err(FitError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_shared_parameters_agree() {
        let model = parse_model("Gauss(pos=overall(0), ampl=1, fwhm=overall(1))").unwrap();
        let mut global = GlobalFit::new(model.as_ref(), datasets()).unwrap();
        let result = global.fit(&BoundedBackend, &FitOptions::new()).unwrap();
        assert!(result.success, "{}", result.message);
        assert_eq!(result.len(), 2);

        let (a, b) = (&result.results[0], &result.results[1]);
        assert_eq!(a.get("pos").unwrap().value, b.get("pos").unwrap().value);
        assert_eq!(a.get("pos").unwrap().error, b.get("pos").unwrap().error);
        assert!(a.get("pos").unwrap().error.unwrap() > 0.0);
        assert_relative_eq!(a.get("pos").unwrap().value, 0.2, epsilon = 1e-2);
        assert_relative_eq!(a.get("ampl").unwrap().value, 2.0, epsilon = 2e-2);
        assert_relative_eq!(b.get("ampl").unwrap().value, 5.0, epsilon = 2e-2);
        assert!(a.get("ampl").unwrap().correl.contains_key("pos"));
        assert_eq!(a.n_points, 25);
        assert_eq!(a.n_free, 3);
        assert_eq!(global.residuals().unwrap().len(), 50);
        assert_eq!(global.param("ampl__1").unwrap().original(), Some(1.0));
    }
}
