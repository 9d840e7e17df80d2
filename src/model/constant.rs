use super::{Model, PREC_ATOM, PREC_SUM};
use crate::error::Result;
use crate::parameters::resolver::ParamValues;
use crate::parameters::Parameter;
use ndarray::Array1;

/// A constant without parameters; scalars in model arithmetic become constants.
#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    value: f64,
    source: Option<String>,
}

impl Constant {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            source: None,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

impl Model for Constant {
    fn name(&self) -> &str {
        ""
    }

    fn params(&self) -> Vec<&Parameter> {
        Vec::new()
    }

    fn params_mut(&mut self) -> Vec<&mut Parameter> {
        Vec::new()
    }

    fn eval(&self, _values: &ParamValues, x: &Array1<f64>) -> Result<Array1<f64>> {
        Ok(Array1::from_elem(x.len(), self.value))
    }

    fn is_modifier(&self) -> bool {
        true
    }

    fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    fn set_source(&mut self, source: Option<String>) {
        self.source = source;
    }

    fn build_description(&self) -> String {
        format!("{}", self.value)
    }

    fn precedence(&self) -> u8 {
        if self.value.is_sign_negative() {
            PREC_SUM
        } else {
            PREC_ATOM
        }
    }

    fn box_clone(&self) -> Box<dyn Model> {
        Box::new(self.clone())
    }
}
