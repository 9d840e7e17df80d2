use super::{call_description, check_unique_names, lookup_values, prefixed, Model};
use crate::error::{FitError, Result};
use crate::parameters::resolver::ParamValues;
use crate::parameters::{ParamInit, Parameter};
use ndarray::Array1;
use std::fmt;
use std::sync::Arc;

/// User function: parameter values (in declaration order) and x to y.
pub type FunctionBody = dyn Fn(&[f64], &Array1<f64>) -> Array1<f64> + Send + Sync;

/// A leaf model defined by a closure over named parameters.
///
/// ```
/// use ndarray::Array1;
/// use scanfit::model::{Function, Model};
///
/// let line = Function::new("bg", &[("a", 1.0.into()), ("b", 0.5.into())], |p, x| {
///     x.mapv(|x| p[0] + p[1] * x)
/// })
/// .unwrap();
/// assert_eq!(line.param_names(), vec!["bg_a", "bg_b"]);
/// ```
#[derive(Clone)]
pub struct Function {
    name: String,
    keys: Vec<String>,
    params: Vec<Parameter>,
    body: Arc<FunctionBody>,
    modifier: bool,
    source: Option<String>,
}

impl Function {
    pub fn new<F>(name: &str, params: &[(&str, ParamInit)], body: F) -> Result<Self>
    where
        F: Fn(&[f64], &Array1<f64>) -> Array1<f64> + Send + Sync + 'static,
    {
        let keys: Vec<String> = params.iter().map(|(key, _)| key.to_string()).collect();
        let params = params
            .iter()
            .map(|(key, init)| Parameter::from_init(&prefixed(name, key), init.clone()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        check_unique_names(&params)?;

        Ok(Self {
            name: name.to_string(),
            keys,
            params,
            body: Arc::new(body),
            modifier: false,
            source: None,
        })
    }

    /// Mark the function as a modifier (e.g. a custom background).
    pub fn as_modifier(mut self) -> Self {
        self.modifier = true;
        self
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("modifier", &self.modifier)
            .finish()
    }
}

impl Model for Function {
    fn name(&self) -> &str {
        &self.name
    }

    fn params(&self) -> Vec<&Parameter> {
        self.params.iter().collect()
    }

    fn params_mut(&mut self) -> Vec<&mut Parameter> {
        self.params.iter_mut().collect()
    }

    fn eval(&self, values: &ParamValues, x: &Array1<f64>) -> Result<Array1<f64>> {
        let p = lookup_values(&self.params, values)?;
        let y = (self.body)(&p, x);
        if y.len() != x.len() {
            return Err(FitError::DimensionMismatch(format!(
                "function '{}' returned {} values for {} points",
                self.name,
                y.len(),
                x.len()
            )));
        }
        Ok(y)
    }

    fn is_modifier(&self) -> bool {
        self.modifier
    }

    fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    fn set_source(&mut self, source: Option<String>) {
        self.source = source;
    }

    fn build_description(&self) -> String {
        call_description("Function", &self.name, &self.keys, &self.params)
    }

    fn box_clone(&self) -> Box<dyn Model> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_function_eval() {
        let f = Function::new("f", &[("a", 2.0.into()), ("b", "f_a * 3".into())], |p, x| {
            x.mapv(|x| p[0] * x + p[1])
        })
        .unwrap();
        assert_eq!(f.param_names(), vec!["f_a", "f_b"]);
        assert!(!f.is_modifier());

        let mut values = ParamValues::new();
        values.insert("f_a".to_string(), 2.0);
        values.insert("f_b".to_string(), 6.0);
        assert_eq!(f.eval(&values, &array![0.0, 1.0]).unwrap(), array![6.0, 8.0]);

        values.remove("f_b");
        assert!(f.eval(&values, &array![0.0]).is_err());
    }

    #[test]
    fn test_function_checks() {
        assert!(Function::new("", &[("x", 1.0.into()), ("x", 2.0.into())], |_, x| x.clone()).is_err());

        let short = Function::new("", &[("a", 1.0.into())], |_, _| array![1.0]).unwrap();
        let mut values = ParamValues::new();
        values.insert("a".to_string(), 1.0);
        assert!(matches!(
            short.eval(&values, &array![1.0, 2.0]),
            Err(FitError::DimensionMismatch(_))
        ));
        assert_eq!(short.description(), "Function(a=1)");
    }
}
