//! Named model constructors for the textual construction surface.

use super::parse::{build, parse_tree};
use super::{Constant, Model};
use crate::error::{FitError, Result};
use crate::models::{
    BackgroundShape, CosineShape, ExpDecayShape, GaussIntShape, GaussShape, LeafModel,
    LorentzIntShape, LorentzShape, PseudoVoigtShape, Shape, SlopingBackgroundShape,
    StraightLineShape,
};
use crate::parameters::{ParamInit, ParameterError};
use std::collections::BTreeMap;
use std::fmt;

/// Builds a model from its name and keyword initializers.
pub type Constructor = fn(&str, &[(&str, ParamInit)]) -> Result<Box<dyn Model>>;

fn leaf<S: Shape>(name: &str, inits: &[(&str, ParamInit)]) -> Result<Box<dyn Model>> {
    Ok(Box::new(LeafModel::<S>::new(name, inits)?))
}

/// `Constant(value=2)`, the long form of a bare number.
fn constant(_name: &str, inits: &[(&str, ParamInit)]) -> Result<Box<dyn Model>> {
    match inits {
        [] => Ok(Box::new(Constant::new(0.0))),
        [("value", ParamInit::Value(v))] => Ok(Box::new(Constant::new(*v))),
        _ => Err(ParameterError::InvalidInitializer {
            name: "value".to_string(),
            message: "Constant takes a single numeric 'value'".to_string(),
        }
        .into()),
    }
}

/// Registry of model constructors by class name.
#[derive(Clone)]
pub struct ModelRegistry {
    constructors: BTreeMap<String, Constructor>,
}

impl ModelRegistry {
    /// A registry without any constructors.
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Register (or replace) a constructor.
    pub fn register(&mut self, class: &str, constructor: Constructor) {
        self.constructors.insert(class.to_string(), constructor);
    }

    /// Register a leaf shape under its class name.
    pub fn register_shape<S: Shape>(&mut self) {
        self.register(S::CLASS, leaf::<S>);
    }

    /// Whether a constructor is registered for `class`.
    pub fn contains(&self, class: &str) -> bool {
        self.constructors.contains_key(class)
    }

    /// Registered class names, in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(|k| k.as_str())
    }

    /// Construct `class` with the given name and initializers.
    pub fn create(
        &self,
        class: &str,
        name: &str,
        args: &[(String, ParamInit)],
    ) -> Result<Box<dyn Model>> {
        let constructor = self
            .constructors
            .get(class)
            .ok_or_else(|| FitError::UnknownModel(class.to_string()))?;
        let args: Vec<(&str, ParamInit)> = args
            .iter()
            .map(|(key, init)| (key.as_str(), init.clone()))
            .collect();
        constructor(name, &args)
    }

    /// Build a model from text; the model keeps `text` as its description.
    pub fn parse(&self, text: &str) -> Result<Box<dyn Model>> {
        let tree = parse_tree(text)?;
        let mut model = build(&tree, self)?;
        model.set_source(Some(text.to_string()));
        log::debug!("built model with {} parameters from '{}'", model.params().len(), text);
        Ok(model)
    }
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.names()).finish()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register_shape::<GaussShape>();
        registry.register_shape::<GaussIntShape>();
        registry.register_shape::<LorentzShape>();
        registry.register_shape::<LorentzIntShape>();
        registry.register_shape::<PseudoVoigtShape>();
        registry.register_shape::<BackgroundShape>();
        registry.register_shape::<SlopingBackgroundShape>();
        registry.register_shape::<StraightLineShape>();
        registry.register_shape::<ExpDecayShape>();
        registry.register_shape::<CosineShape>();
        registry.register("Constant", constant);
        registry
    }
}
