//! Fit options passed through to the selected backend.
//!
//! Options are an open key/value dictionary. Each backend reads the keys it
//! understands (iteration caps, tolerances, step hints) and ignores the rest.

use crate::error::{FitError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Open dictionary of backend options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FitOptions(Map<String, Value>);

impl FitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse options from a JSON object such as `{"max_iterations": 50}`.
    pub fn from_json(text: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(text)? {
            Value::Object(map) => Ok(Self(map)),
            other => Err(FitError::InvalidInput(format!(
                "fit options must be a JSON object, got {}",
                other
            ))),
        }
    }

    /// Builder-style setter
    ///
    /// ```
    /// use scanfit::config::FitOptions;
    ///
    /// let options = FitOptions::new().with("max_iterations", 20).with("ftol", 1e-6);
    /// assert_eq!(options.get_usize("max_iterations").unwrap(), Some(20));
    /// ```
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    fn invalid(key: &str, message: impl Into<String>) -> FitError {
        FitError::InvalidOption {
            key: key.to_string(),
            message: message.into(),
        }
    }

    /// Read a number; `Ok(None)` if the key is absent.
    pub fn get_f64(&self, key: &str) -> Result<Option<f64>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_f64()
                .map(Some)
                .ok_or_else(|| Self::invalid(key, format!("expected a number, got {}", value))),
        }
    }

    /// Read a strictly positive, finite number.
    pub fn get_positive_f64(&self, key: &str) -> Result<Option<f64>> {
        match self.get_f64(key)? {
            Some(v) if !(v.is_finite() && v > 0.0) => {
                Err(Self::invalid(key, format!("expected a positive number, got {}", v)))
            }
            other => Ok(other),
        }
    }

    /// Read a non-negative integer. Whole floats such as `50.0` are accepted.
    pub fn get_usize(&self, key: &str) -> Result<Option<usize>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => {
                if let Some(n) = value.as_u64() {
                    return Ok(Some(n as usize));
                }
                match value.as_f64() {
                    Some(f) if f >= 0.0 && f.fract() == 0.0 => Ok(Some(f as usize)),
                    _ => Err(Self::invalid(
                        key,
                        format!("expected a non-negative integer, got {}", value),
                    )),
                }
            }
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_bool()
                .map(Some)
                .ok_or_else(|| Self::invalid(key, format!("expected a boolean, got {}", value))),
        }
    }
}

impl From<Map<String, Value>> for FitOptions {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
