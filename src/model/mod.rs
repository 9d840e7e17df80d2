//! Model trait and the composition algebra.
//!
//! A model owns an ordered list of [`Parameter`]s and evaluates a pure function
//! `(parameter values, x) -> y`. Values are passed in as a [`ParamValues`] pool
//! keyed by parameter name, which lets a composed tree evaluate every node
//! against the same pool and lets backends vary the values without touching
//! the model.
//!
//! Models compose with [`add`], [`subtract`], [`multiply`], [`divide`] and
//! [`power`] (or [`CombinedModel::new`]); scalars are wrapped into
//! [`Constant`]s. Composition fails when the two operands share a parameter
//! name.

mod combined;
mod constant;
mod function;
pub mod parse;
pub mod registry;

pub use combined::{add, divide, multiply, power, subtract, CombinedModel, Operator};
pub use constant::Constant;
pub use function::Function;
pub use parse::parse_model;
pub use registry::ModelRegistry;

use crate::dataset::Metadata;
use crate::error::{FitError, Result};
use crate::parameters::resolver::{self, ParamValues};
use crate::parameters::Parameter;
use ndarray::Array1;
use std::collections::BTreeMap;
use std::fmt;

/// Operator precedence used when writing descriptions.
pub(crate) const PREC_SUM: u8 = 1;
pub(crate) const PREC_PRODUCT: u8 = 2;
pub(crate) const PREC_POWER: u8 = 3;
pub(crate) const PREC_ATOM: u8 = 4;

/// Initial guesses derived from pick points: parameter name to value.
pub type Guesses = BTreeMap<String, f64>;

/// A fit model.
pub trait Model: fmt::Debug + Send + Sync {
    /// Model name; used as the parameter prefix of leaf models
    fn name(&self) -> &str;

    /// All parameters of the model (and its operands), in order
    fn params(&self) -> Vec<&Parameter>;

    fn params_mut(&mut self) -> Vec<&mut Parameter>;

    /// Evaluate the model for the given parameter values.
    fn eval(&self, values: &ParamValues, x: &Array1<f64>) -> Result<Array1<f64>>;

    /// Whether the model is folded into sibling components (backgrounds,
    /// constants) instead of being reported on its own.
    fn is_modifier(&self) -> bool {
        false
    }

    /// Names of the points a user clicks to produce initial guesses
    fn pick_points(&self) -> Vec<String> {
        Vec::new()
    }

    /// Map clicked `(x, y)` points, one per pick point, to initial guesses.
    fn convert_pick(&self, points: &[(f64, f64)]) -> Result<Guesses> {
        check_pick_count(self.pick_points().len(), points)?;
        Ok(Guesses::new())
    }

    /// Text the model was constructed from, if any
    fn source(&self) -> Option<&str>;

    fn set_source(&mut self, source: Option<String>);

    /// Description rebuilt from the model structure.
    fn build_description(&self) -> String;

    /// Precedence of the description, for parenthesizing inside operators.
    fn precedence(&self) -> u8 {
        PREC_ATOM
    }

    fn box_clone(&self) -> Box<dyn Model>;

    fn as_combined(&self) -> Option<&CombinedModel> {
        None
    }

    /// Sub-models to report individually, with modifiers folded in.
    fn get_components(&self) -> Vec<Box<dyn Model>> {
        vec![self.box_clone()]
    }

    /// The stored construction text, or a rebuilt description.
    fn description(&self) -> String {
        match self.source() {
            Some(source) => source.to_string(),
            None => self.build_description(),
        }
    }

    fn param_names(&self) -> Vec<String> {
        self.params().iter().map(|p| p.name.clone()).collect()
    }

    fn param(&self, name: &str) -> Option<&Parameter> {
        self.params().into_iter().find(|p| p.name == name)
    }

    fn param_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.params_mut().into_iter().find(|p| p.name == name)
    }

    /// Store the current values as pre-fit values (kept if already stored).
    fn snapshot(&mut self) {
        for p in self.params_mut() {
            p.snapshot();
        }
    }

    /// Restore the pre-fit values of every parameter.
    fn reset(&mut self) {
        for p in self.params_mut() {
            p.reset();
        }
    }

    /// Current values of all parameters, dependents resolved against `meta`.
    fn param_values(&self, meta: &Metadata) -> Result<ParamValues> {
        resolver::resolve_values(self.params(), meta)
    }

    /// Evaluate with the values currently stored in the parameters.
    fn eval_current(&self, x: &Array1<f64>, meta: &Metadata) -> Result<Array1<f64>> {
        let values = self.param_values(meta)?;
        self.eval(&values, x)
    }

    /// Apply guesses to the free parameters they name; other names are ignored.
    fn apply_guesses(&mut self, guesses: &Guesses) {
        for p in self.params_mut() {
            if let (true, Some(value)) = (p.is_free(), guesses.get(&p.name)) {
                p.value = *value;
            }
        }
    }
}

impl Clone for Box<dyn Model> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

impl fmt::Display for dyn Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Anything that can be an operand of model composition.
pub trait IntoModel {
    fn into_model(self) -> Box<dyn Model>;
}

impl<M: Model + 'static> IntoModel for M {
    fn into_model(self) -> Box<dyn Model> {
        Box::new(self)
    }
}

impl IntoModel for Box<dyn Model> {
    fn into_model(self) -> Box<dyn Model> {
        self
    }
}

impl IntoModel for f64 {
    fn into_model(self) -> Box<dyn Model> {
        Box::new(Constant::new(self))
    }
}

pub(crate) fn check_pick_count(expected: usize, points: &[(f64, f64)]) -> Result<()> {
    if points.len() != expected {
        return Err(FitError::InvalidInput(format!(
            "expected {} pick points, got {}",
            expected,
            points.len()
        )));
    }
    Ok(())
}

/// Description of `child` as an operand, parenthesized if needed.
pub(crate) fn operand_description(child: &dyn Model, parens: bool) -> String {
    if parens {
        format!("({})", child.description())
    } else {
        child.description()
    }
}

/// Check that no parameter name occurs twice.
pub(crate) fn check_unique_names<'a, I>(params: I) -> Result<()>
where
    I: IntoIterator<Item = &'a Parameter>,
{
    let mut seen = std::collections::HashSet::new();
    for p in params {
        if !seen.insert(p.name.as_str()) {
            return Err(crate::parameters::ParameterError::NameClash {
                name: p.name.clone(),
            }
            .into());
        }
    }
    Ok(())
}

/// Values of `params` looked up in the pool, in parameter order.
pub(crate) fn lookup_values(params: &[Parameter], values: &ParamValues) -> Result<Vec<f64>> {
    params
        .iter()
        .map(|p| {
            values.get(&p.name).copied().ok_or_else(|| {
                FitError::FitExecution(format!("no value for parameter '{}'", p.name))
            })
        })
        .collect()
}

/// `Class('name', key=init, ...)`, the form accepted by [`parse_model`].
pub(crate) fn call_description(class: &str, name: &str, keys: &[String], params: &[Parameter]) -> String {
    let mut args = Vec::with_capacity(keys.len() + 1);
    if !name.is_empty() {
        args.push(format!("'{}'", name));
    }
    for (key, param) in keys.iter().zip(params) {
        args.push(format!("{}={}", key, param.current_init()));
    }
    format!("{}({})", class, args.join(", "))
}

/// Full parameter name of `key` inside a model called `name`.
pub(crate) fn prefixed(name: &str, key: &str) -> String {
    if name.is_empty() {
        key.to_string()
    } else {
        format!("{}_{}", name, key)
    }
}
