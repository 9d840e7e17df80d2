//! Parameter definition and initializers
//!
//! A [`Parameter`] is either free (varied by the optimizer, optionally between
//! `pmin` and `pmax`) or dependent, in which case its value is computed from the
//! `expr` formula on every model evaluation and it never enters the free vector.

use crate::parameters::bounds::{Bounds, BoundsError};
use crate::parameters::expression::{is_reserved_name, Expression, ExpressionError, DATA_ROOT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Errors raised while defining parameters or composing models
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    #[error("'{name}' is not a valid parameter name")]
    InvalidName { name: String },

    #[error("'{name}' is reserved in the expression namespace")]
    ReservedName { name: String },

    #[error("Parameter name clash: '{name}' is defined more than once")]
    NameClash { name: String },

    #[error("Invalid initializer for parameter '{name}': {message}")]
    InvalidInitializer { name: String, message: String },

    #[error("Invalid expression for parameter '{name}': {source}")]
    InvalidExpression {
        name: String,
        #[source]
        source: ExpressionError,
    },

    #[error("Bounds error for parameter '{name}': {source}")]
    Bounds {
        name: String,
        #[source]
        source: BoundsError,
    },
}

/// Post-fit transform applied to the fitted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Finalize {
    #[default]
    Identity,
    /// Report the absolute value (widths, amplitudes of even shapes)
    Abs,
}

impl Finalize {
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Finalize::Identity => value,
            Finalize::Abs => value.abs(),
        }
    }
}

/// Initializer for a model parameter.
///
/// Mirrors the forms accepted in textual model descriptions: a number, a bound
/// triple `(value, min, max)`, an expression string, `overall(init)` and
/// `datapar('key')`.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamInit {
    Value(f64),
    Bounded {
        value: f64,
        min: Option<f64>,
        max: Option<f64>,
    },
    Expr(String),
    Overall(Box<ParamInit>),
    DataPar(String),
}

impl ParamInit {
    /// Mark a parameter as shared across all datasets of a global fit.
    pub fn overall(init: impl Into<ParamInit>) -> Self {
        ParamInit::Overall(Box::new(init.into()))
    }

    /// Parameter taken from dataset metadata, i.e. the expression `data.<key>`.
    pub fn datapar(key: impl Into<String>) -> Self {
        ParamInit::DataPar(key.into())
    }

    pub fn bounded(value: f64, min: Option<f64>, max: Option<f64>) -> Self {
        ParamInit::Bounded { value, min, max }
    }
}

impl From<f64> for ParamInit {
    fn from(value: f64) -> Self {
        ParamInit::Value(value)
    }
}

impl From<&str> for ParamInit {
    fn from(expr: &str) -> Self {
        ParamInit::Expr(expr.to_string())
    }
}

impl From<String> for ParamInit {
    fn from(expr: String) -> Self {
        ParamInit::Expr(expr)
    }
}

impl From<(f64, Option<f64>, Option<f64>)> for ParamInit {
    fn from((value, min, max): (f64, Option<f64>, Option<f64>)) -> Self {
        ParamInit::Bounded { value, min, max }
    }
}

impl From<(f64, f64, f64)> for ParamInit {
    fn from((value, min, max): (f64, f64, f64)) -> Self {
        ParamInit::Bounded {
            value,
            min: Some(min),
            max: Some(max),
        }
    }
}

fn fmt_limit(limit: Option<f64>) -> String {
    match limit {
        Some(v) => format!("{}", v),
        None => "None".to_string(),
    }
}

impl fmt::Display for ParamInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamInit::Value(v) => write!(f, "{}", v),
            ParamInit::Bounded { value, min, max } => {
                write!(f, "({}, {}, {})", value, fmt_limit(*min), fmt_limit(*max))
            }
            ParamInit::Expr(expr) => write!(f, "'{}'", expr),
            ParamInit::Overall(inner) => write!(f, "overall({})", inner),
            ParamInit::DataPar(key) => write!(f, "datapar('{}')", key),
        }
    }
}

/// Check that `name` is a bare identifier outside the reserved namespace.
pub fn validate_name(name: &str) -> Result<(), ParameterError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if !valid {
        return Err(ParameterError::InvalidName {
            name: name.to_string(),
        });
    }
    if is_reserved_name(name) {
        return Err(ParameterError::ReservedName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// A named scalar of a fit model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Unique name within a model tree
    pub name: String,

    /// Current value (initial guess before, best fit after a fit)
    pub value: f64,

    /// Pre-fit value restored by [`Parameter::reset`]
    #[serde(default)]
    original: Option<f64>,

    /// Formula making this parameter dependent
    pub expr: Option<String>,

    pub pmin: Option<f64>,
    pub pmax: Option<f64>,

    /// Shared across datasets in a global fit
    #[serde(default)]
    pub overall: bool,

    /// Step size hint for finite differences
    pub delta: Option<f64>,

    #[serde(default)]
    pub finalize: Finalize,

    /// Standard error, set by a successful fit
    pub error: Option<f64>,

    /// Correlation coefficients with the other free parameters
    #[serde(default)]
    pub correl: BTreeMap<String, f64>,

    /// Initializer the parameter was built from, kept for descriptions
    #[serde(skip)]
    init: Option<ParamInit>,
}

impl Parameter {
    /// Create a free parameter with the given name and value
    ///
    /// # Examples
    ///
    /// ```
    /// use scanfit::parameters::Parameter;
    ///
    /// let p = Parameter::new("ampl", 4.0).unwrap();
    /// assert!(p.is_free());
    /// assert!(Parameter::new("sqrt", 1.0).is_err());
    /// ```
    pub fn new(name: &str, value: f64) -> Result<Self, ParameterError> {
        Self::from_init(name, ParamInit::Value(value))
    }

    /// Create a parameter from an initializer, validating name, limits and
    /// expression syntax.
    pub fn from_init(name: &str, init: impl Into<ParamInit>) -> Result<Self, ParameterError> {
        validate_name(name)?;
        let init = init.into();
        let mut param = Self {
            name: name.to_string(),
            value: 0.0,
            original: None,
            expr: None,
            pmin: None,
            pmax: None,
            overall: false,
            delta: None,
            finalize: Finalize::Identity,
            error: None,
            correl: BTreeMap::new(),
            init: Some(init.clone()),
        };
        param.apply_init(&init)?;
        Ok(param)
    }

    fn apply_init(&mut self, init: &ParamInit) -> Result<(), ParameterError> {
        match init {
            ParamInit::Value(value) => {
                if !value.is_finite() {
                    return Err(self.bad_init("value must be finite"));
                }
                self.value = *value;
            }
            ParamInit::Bounded { value, min, max } => {
                if !value.is_finite() {
                    return Err(self.bad_init("value must be finite"));
                }
                let bounds =
                    Bounds::from_limits(*min, *max).map_err(|source| ParameterError::Bounds {
                        name: self.name.clone(),
                        source,
                    })?;
                self.pmin = *min;
                self.pmax = *max;
                self.value = bounds.clamp(*value);
            }
            ParamInit::Expr(expr) => self.set_expr(Some(expr))?,
            ParamInit::DataPar(key) => {
                if key.is_empty() {
                    return Err(self.bad_init("datapar() needs a metadata key"));
                }
                self.set_expr(Some(&format!("{}.{}", DATA_ROOT, key)))?;
            }
            ParamInit::Overall(inner) => {
                if matches!(**inner, ParamInit::Overall(_)) {
                    return Err(self.bad_init("overall() cannot be nested"));
                }
                self.apply_init(inner)?;
                self.overall = true;
            }
        }
        Ok(())
    }

    fn bad_init(&self, message: &str) -> ParameterError {
        ParameterError::InvalidInitializer {
            name: self.name.clone(),
            message: message.to_string(),
        }
    }

    /// Set or clear the dependency formula. The formula is parsed immediately.
    pub fn set_expr(&mut self, expr: Option<&str>) -> Result<(), ParameterError> {
        match expr {
            Some(text) => {
                Expression::parse(text).map_err(|source| ParameterError::InvalidExpression {
                    name: self.name.clone(),
                    source,
                })?;
                self.expr = Some(text.to_string());
            }
            None => self.expr = None,
        }
        Ok(())
    }

    /// Parsed dependency formula, if any
    pub fn expression(&self) -> Result<Option<Expression>, ParameterError> {
        self.expr
            .as_deref()
            .map(|text| {
                Expression::parse(text).map_err(|source| ParameterError::InvalidExpression {
                    name: self.name.clone(),
                    source,
                })
            })
            .transpose()
    }

    /// Whether the optimizer varies this parameter
    pub fn is_free(&self) -> bool {
        self.expr.is_none()
    }

    pub fn has_bounds(&self) -> bool {
        self.pmin.is_some() || self.pmax.is_some()
    }

    pub fn bounds(&self) -> Result<Bounds, ParameterError> {
        Bounds::from_limits(self.pmin, self.pmax).map_err(|source| ParameterError::Bounds {
            name: self.name.clone(),
            source,
        })
    }

    pub fn with_delta(mut self, delta: f64) -> Self {
        self.delta = Some(delta);
        self
    }

    pub fn with_finalize(mut self, finalize: Finalize) -> Self {
        self.finalize = finalize;
        self
    }

    /// Initializer this parameter was created from, if it is still accurate.
    pub fn init(&self) -> Option<&ParamInit> {
        self.init.as_ref()
    }

    /// Initializer reproducing the current state of the parameter.
    pub fn current_init(&self) -> ParamInit {
        let base = match &self.expr {
            Some(expr) => match expr.strip_prefix("data.") {
                Some(key) if matches!(Expression::parse(expr), Ok(Expression::Variable(_))) => {
                    ParamInit::DataPar(key.to_string())
                }
                _ => ParamInit::Expr(expr.clone()),
            },
            None if self.has_bounds() => ParamInit::Bounded {
                value: self.value,
                min: self.pmin,
                max: self.pmax,
            },
            None => ParamInit::Value(self.value),
        };
        if self.overall {
            ParamInit::Overall(Box::new(base))
        } else {
            base
        }
    }

    /// Remember the current value as the pre-fit value, unless one is stored.
    pub fn snapshot(&mut self) {
        if self.original.is_none() {
            self.original = Some(self.value);
        }
    }

    /// Restore the pre-fit value and clear fit outputs.
    pub fn reset(&mut self) {
        if let Some(original) = self.original.take() {
            self.value = original;
        }
        self.error = None;
        self.correl.clear();
    }

    pub fn original(&self) -> Option<f64> {
        self.original
    }

    /// Copy of this parameter under another name (global fit duplication)
    pub fn renamed(&self, name: &str) -> Self {
        let mut copy = self.clone();
        copy.name = name.to_string();
        copy.init = None;
        copy
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.name, self.value)?;
        if let Some(error) = self.error {
            write!(f, " +/- {}", error)?;
        }
        if let Some(expr) = &self.expr {
            write!(f, " (= {})", expr)?;
        }
        if self.has_bounds() {
            write!(f, " [{}, {}]", fmt_limit(self.pmin), fmt_limit(self.pmax))?;
        }
        if self.overall {
            write!(f, " overall")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_names() {
        assert!(Parameter::new("p1_pos", 1.0).is_ok());
        assert!(Parameter::new("_x", 1.0).is_ok());
        assert!(matches!(
            Parameter::new("1abc", 1.0),
            Err(ParameterError::InvalidName { .. })
        ));
        assert!(matches!(
            Parameter::new("a.b", 1.0),
            Err(ParameterError::InvalidName { .. })
        ));
        assert!(matches!(
            Parameter::new("data", 1.0),
            Err(ParameterError::ReservedName { .. })
        ));
        assert!(matches!(
            Parameter::new("pi", 1.0),
            Err(ParameterError::ReservedName { .. })
        ));
    }

    #[test]
    fn test_initializers() {
        let p = Parameter::from_init("a", (5.0, Some(0.0), Some(2.0))).unwrap();
        assert_eq!(p.value, 2.0);
        assert_eq!(p.pmax, Some(2.0));
        assert!(p.is_free());

        let p = Parameter::from_init("a", "2 * b").unwrap();
        assert!(!p.is_free());
        assert_eq!(p.expr.as_deref(), Some("2 * b"));

        let p = Parameter::from_init("t", ParamInit::datapar("T")).unwrap();
        assert_eq!(p.expr.as_deref(), Some("data.T"));

        let p = Parameter::from_init("s", ParamInit::overall(1.5)).unwrap();
        assert!(p.overall);
        assert_eq!(p.value, 1.5);

        assert!(matches!(
            Parameter::from_init("a", "2 *"),
            Err(ParameterError::InvalidExpression { .. })
        ));
        assert!(matches!(
            Parameter::from_init("a", (1.0, Some(3.0), Some(2.0))),
            Err(ParameterError::Bounds { .. })
        ));
        assert!(Parameter::from_init("a", ParamInit::overall(ParamInit::overall(1.0))).is_err());
    }

    #[test]
    fn test_current_init() {
        let mut p = Parameter::from_init("t", ParamInit::datapar("T")).unwrap();
        assert_eq!(p.current_init(), ParamInit::DataPar("T".to_string()));

        p.set_expr(None).unwrap();
        p.value = 3.0;
        p.overall = true;
        assert_eq!(p.current_init().to_string(), "overall(3)");

        let p = Parameter::from_init("b", (1.0, None, Some(2.0))).unwrap();
        assert_eq!(p.current_init().to_string(), "(1, None, 2)");
    }

    #[test]
    fn test_snapshot_reset() {
        let mut p = Parameter::new("a", 1.0).unwrap();
        p.snapshot();
        p.value = 7.0;
        p.snapshot();
        p.error = Some(0.1);
        p.reset();
        assert_eq!(p.value, 1.0);
        assert_eq!(p.error, None);
    }

    #[test]
    fn test_finalize() {
        assert_eq!(Finalize::Abs.apply(-2.0), 2.0);
        assert_eq!(Finalize::Identity.apply(-2.0), -2.0);
    }

    #[test]
    fn test_serialization() {
        let p = Parameter::from_init("w", (1.0, Some(0.0), None))
            .unwrap()
            .with_finalize(Finalize::Abs);
        let json = serde_json::to_string(&p).unwrap();
        let back: Parameter = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "w");
        assert_eq!(back.pmin, Some(0.0));
        assert_eq!(back.finalize, Finalize::Abs);
    }
}
