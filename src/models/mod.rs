//! Built-in leaf models for scattering scans.
//!
//! Every shape is a [`LeafModel`] over a zero-sized [`Shape`] marker that fixes
//! the parameter keys, their defaults, the evaluation formula and the pick-point
//! protocol. Parameters are named `name_key` (or just `key` for an unnamed
//! model).
//!
//! ```
//! use scanfit::model::Model;
//! use scanfit::models::{background, gauss};
//!
//! let model = scanfit::model::add(gauss("p", 3.0, 4.0, 2.0).unwrap(), background("", 0.5).unwrap())
//!     .unwrap();
//! assert_eq!(model.param_names(), vec!["p_pos", "p_ampl", "p_fwhm", "bkgd"]);
//! assert_eq!(model.get_components().len(), 1);
//! ```

mod background;
mod exponential;
mod peak;
mod periodic;

pub use background::{BackgroundShape, SlopingBackgroundShape, StraightLineShape};
pub use exponential::ExpDecayShape;
pub use peak::{GaussIntShape, GaussShape, LorentzIntShape, LorentzShape, PseudoVoigtShape};
pub use periodic::CosineShape;

use crate::error::Result;
use crate::model::{call_description, check_pick_count, lookup_values, prefixed, Guesses, Model};
use crate::parameters::resolver::ParamValues;
use crate::parameters::{Finalize, ParamInit, Parameter, ParameterError};
use ndarray::Array1;
use std::fmt;
use std::marker::PhantomData;

/// Static description of a leaf model shape.
pub trait Shape: 'static {
    /// Constructor name in model text, e.g. `Gauss`
    const CLASS: &'static str;

    /// Parameter keys with their default values, in evaluation order.
    const PARAMS: &'static [(&'static str, f64)];

    const MODIFIER: bool = false;

    const PICK_POINTS: &'static [&'static str] = &[];

    /// Post-fit transformation of the parameter behind `key`.
    fn finalizer(_key: &str) -> Finalize {
        Finalize::Identity
    }

    /// Evaluate with parameter values ordered as [`Shape::PARAMS`].
    fn evaluate(p: &[f64], x: &Array1<f64>) -> Array1<f64>;

    /// Guesses from clicked points (one per pick point), keyed by parameter key.
    ///
    /// Non-finite guesses are dropped by the caller.
    fn guess(_points: &[(f64, f64)]) -> Vec<(&'static str, f64)> {
        Vec::new()
    }
}

/// A model of a fixed [`Shape`].
pub struct LeafModel<S: Shape> {
    name: String,
    params: Vec<Parameter>,
    source: Option<String>,
    shape: PhantomData<fn() -> S>,
}

impl<S: Shape> LeafModel<S> {
    /// Build the model; keys not given use the shape defaults.
    pub fn new(name: &str, inits: &[(&str, ParamInit)]) -> Result<Self> {
        for (i, (key, _)) in inits.iter().enumerate() {
            let message = if !S::PARAMS.iter().any(|(k, _)| k == key) {
                format!("{} has no parameter '{}'", S::CLASS, key)
            } else if inits[..i].iter().any(|(k, _)| k == key) {
                format!("parameter '{}' given twice", key)
            } else {
                continue;
            };
            return Err(ParameterError::InvalidInitializer {
                name: prefixed(name, key),
                message,
            }
            .into());
        }

        let params = S::PARAMS
            .iter()
            .map(|(key, default)| {
                let init = inits
                    .iter()
                    .find(|(k, _)| k == key)
                    .map(|(_, init)| init.clone())
                    .unwrap_or(ParamInit::Value(*default));
                Ok(Parameter::from_init(&prefixed(name, key), init)?
                    .with_finalize(S::finalizer(key)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: name.to_string(),
            params,
            source: None,
            shape: PhantomData,
        })
    }

    /// Build the model with default values for every parameter.
    pub fn with_defaults(name: &str) -> Result<Self> {
        Self::new(name, &[])
    }

    fn keys() -> Vec<String> {
        S::PARAMS.iter().map(|(key, _)| key.to_string()).collect()
    }
}

impl<S: Shape> Clone for LeafModel<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            params: self.params.clone(),
            source: self.source.clone(),
            shape: PhantomData,
        }
    }
}

impl<S: Shape> fmt::Debug for LeafModel<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(S::CLASS)
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

impl<S: Shape> Model for LeafModel<S> {
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
        Ok(S::evaluate(&p, x))
    }

    fn is_modifier(&self) -> bool {
        S::MODIFIER
    }

    fn pick_points(&self) -> Vec<String> {
        S::PICK_POINTS.iter().map(|s| s.to_string()).collect()
    }

    fn convert_pick(&self, points: &[(f64, f64)]) -> Result<Guesses> {
        check_pick_count(S::PICK_POINTS.len(), points)?;
        Ok(S::guess(points)
            .into_iter()
            .filter(|(_, value)| value.is_finite())
            .map(|(key, value)| (prefixed(&self.name, key), value))
            .collect())
    }

    fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    fn set_source(&mut self, source: Option<String>) {
        self.source = source;
    }

    fn build_description(&self) -> String {
        call_description(S::CLASS, &self.name, &Self::keys(), &self.params)
    }

    fn box_clone(&self) -> Box<dyn Model> {
        Box::new(self.clone())
    }
}

pub type Gauss = LeafModel<GaussShape>;
pub type GaussInt = LeafModel<GaussIntShape>;
pub type Lorentz = LeafModel<LorentzShape>;
pub type LorentzInt = LeafModel<LorentzIntShape>;
pub type PseudoVoigt = LeafModel<PseudoVoigtShape>;
pub type Background = LeafModel<BackgroundShape>;
pub type SlopingBackground = LeafModel<SlopingBackgroundShape>;
pub type StraightLine = LeafModel<StraightLineShape>;
pub type ExpDecay = LeafModel<ExpDecayShape>;
pub type Cosine = LeafModel<CosineShape>;

/// Gaussian peak `abs(ampl) * exp(-4 ln2 (x - pos)² / fwhm²)`.
pub fn gauss(name: &str, pos: f64, ampl: f64, fwhm: f64) -> Result<Gauss> {
    Gauss::new(name, &[("pos", pos.into()), ("ampl", ampl.into()), ("fwhm", fwhm.into())])
}

/// Lorentzian peak with half width `width`.
pub fn lorentz(name: &str, pos: f64, ampl: f64, width: f64) -> Result<Lorentz> {
    Lorentz::new(name, &[("pos", pos.into()), ("ampl", ampl.into()), ("width", width.into())])
}

/// Flat background, a modifier.
pub fn background(name: &str, bkgd: f64) -> Result<Background> {
    Background::new(name, &[("bkgd", bkgd.into())])
}

/// Background `bkgd + slope * x`, a modifier.
pub fn sloping_background(name: &str, bkgd: f64, slope: f64) -> Result<SlopingBackground> {
    SlopingBackground::new(name, &[("bkgd", bkgd.into()), ("slope", slope.into())])
}

/// Straight line `y0 + slope * x`; unlike a background it is a component.
pub fn straight_line(name: &str, slope: f64, y0: f64) -> Result<StraightLine> {
    StraightLine::new(name, &[("slope", slope.into()), ("y0", y0.into())])
}

/// Exponential decay `y0 + ampl * exp(-x / tau)`.
pub fn exp_decay(name: &str, y0: f64, ampl: f64, tau: f64) -> Result<ExpDecay> {
    ExpDecay::new(name, &[("y0", y0.into()), ("ampl", ampl.into()), ("tau", tau.into())])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FitError;
    use ndarray::array;

    #[test]
    fn test_leaf_defaults_and_names() {
        let g = Gauss::with_defaults("p1").unwrap();
        assert_eq!(g.param_names(), vec!["p1_pos", "p1_ampl", "p1_fwhm"]);
        assert_eq!(g.param("p1_fwhm").unwrap().value, 1.0);
        assert_eq!(g.param("p1_ampl").unwrap().finalize, Finalize::Abs);

        let bg = Background::with_defaults("").unwrap();
        assert_eq!(bg.param_names(), vec!["bkgd"]);
        assert!(bg.is_modifier());
        assert!(!g.is_modifier());
    }

    #[test]
    fn test_leaf_rejects_unknown_keys() {
        let err = Gauss::new("p", &[("height", 1.0.into())]).unwrap_err();
        assert!(matches!(
            err,
            FitError::ParameterDefinition(ParameterError::InvalidInitializer { .. })
        ));
        assert!(Gauss::new("p", &[("pos", 1.0.into()), ("pos", 2.0.into())]).is_err());
        assert!(Gauss::new("p", &[("pos", "p_ampl +".into())]).is_err());
    }

    #[test]
    fn test_leaf_description() {
        let g = Gauss::new(
            "a",
            &[
                ("pos", 0.0.into()),
                ("ampl", (1.5, Some(0.0), Some(2.0)).into()),
                ("fwhm", "a_pos + 1".into()),
            ],
        )
        .unwrap();
        assert_eq!(
            g.description(),
            "Gauss('a', pos=0, ampl=(1.5, 0, 2), fwhm='a_pos + 1')"
        );
        assert_eq!(Background::with_defaults("").unwrap().description(), "Background(bkgd=0)");
    }

    #[test]
    fn test_leaf_eval_and_pick() {
        let g = gauss("p", 3.0, 4.0, 2.0).unwrap();
        let y = g
            .eval_current(&array![3.0, 4.0], &Default::default())
            .unwrap();
        assert!((y[0] - 4.0).abs() < 1e-12);
        assert!((y[1] - 2.0).abs() < 1e-12);

        let guesses = g.convert_pick(&[(0.0, 1.0), (3.0, 5.0), (4.0, 3.0)]).unwrap();
        assert_eq!(guesses["p_pos"], 3.0);
        assert_eq!(guesses["p_ampl"], 4.0);
        assert_eq!(guesses["p_fwhm"], 2.0);
        assert!(g.convert_pick(&[(0.0, 1.0)]).is_err());
    }
}
