//! # Parameters
//!
//! Named fit parameters, their limits, the expression language used by
//! dependent parameters and the resolver that evaluates dependents in a
//! consistent order.
//!
//! - [`Parameter`] and [`ParamInit`]: a named scalar and the initializer forms
//!   it can be created from (number, bound triple, expression, `overall`,
//!   `datapar`)
//! - [`Bounds`] and [`BoundsTransform`]: limits and their mapping onto
//!   unconstrained optimizer variables
//! - [`Expression`]: sandboxed formulas such as `2 * p1_fwhm` or `data.T / 10`
//! - [`resolver`]: `prepare` / `update` for dependent parameters
//!
//! ```rust
//! use scanfit::dataset::Metadata;
//! use scanfit::parameters::{resolver, Parameter};
//!
//! let params = vec![
//!     Parameter::from_init("width", 2.0).unwrap(),
//!     Parameter::from_init("half_width", "width / 2").unwrap(),
//! ];
//! let values = resolver::resolve_values(&params, &Metadata::new()).unwrap();
//! assert_eq!(values["half_width"], 1.0);
//! ```

pub mod bounds;
pub mod expression;
pub mod parameter;
pub mod resolver;

pub use bounds::{Bounds, BoundsError, BoundsTransform};
pub use expression::{EvaluationContext, Expression, ExpressionError, SimpleContext};
pub use parameter::{Finalize, ParamInit, Parameter, ParameterError};
pub use resolver::{ParamValues, Prepared, Scope};
