//! Parameter limits and the Minuit-style transformation used by the bounded
//! backend.
//!
//! The bounded backend optimizes an unconstrained *internal* variable per free
//! parameter; [`BoundsTransform`] maps it onto the external value so that every
//! trial point the model sees lies inside `[pmin, pmax]`.

use std::f64::{INFINITY, NEG_INFINITY};
use thiserror::Error;

/// Errors that can occur when working with parameter limits
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoundsError {
    #[error("Invalid bounds: min ({min}) must not exceed max ({max})")]
    InvalidBounds { min: f64, max: f64 },

    #[error("Parameter value {value} is outside bounds: [{min}, {max}]")]
    ValueOutsideBounds { value: f64, min: f64, max: f64 },

    #[error("Infinite parameter value is not allowed")]
    InfiniteValue,
}

/// Lower and upper limit of a parameter; missing limits are infinite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            min: NEG_INFINITY,
            max: INFINITY,
        }
    }
}

impl Bounds {
    /// Create bounds from explicit limits.
    ///
    /// # Examples
    ///
    /// ```
    /// use scanfit::parameters::bounds::Bounds;
    ///
    /// let bounds = Bounds::new(0.0, 10.0).unwrap();
    /// assert_eq!(bounds.min, 0.0);
    /// assert!(Bounds::new(1.0, 0.0).is_err());
    /// ```
    pub fn new(min: f64, max: f64) -> Result<Self, BoundsError> {
        if min > max {
            return Err(BoundsError::InvalidBounds { min, max });
        }
        Ok(Self { min, max })
    }

    /// Create bounds from optional limits (`None` = unbounded on that side).
    pub fn from_limits(pmin: Option<f64>, pmax: Option<f64>) -> Result<Self, BoundsError> {
        Self::new(pmin.unwrap_or(NEG_INFINITY), pmax.unwrap_or(INFINITY))
    }

    /// Bounds without any limit
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn is_within_bounds(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn has_lower_bound(&self) -> bool {
        self.min.is_finite()
    }

    pub fn has_upper_bound(&self) -> bool {
        self.max.is_finite()
    }

    /// Whether at least one side is limited
    pub fn is_bounded(&self) -> bool {
        self.has_lower_bound() || self.has_upper_bound()
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Maps unconstrained internal optimizer variables onto bounded external values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundsTransform {
    bounds: Bounds,
}

impl BoundsTransform {
    pub fn new(bounds: Bounds) -> Self {
        Self { bounds }
    }

    /// Transform an internal value to the external (bounded) value
    pub fn to_external(&self, internal: f64) -> f64 {
        let b = &self.bounds;
        match (b.has_lower_bound(), b.has_upper_bound()) {
            (false, false) => internal,
            (true, false) => b.min - 1.0 + (internal * internal + 1.0).sqrt(),
            (false, true) => b.max + 1.0 - (internal * internal + 1.0).sqrt(),
            (true, true) => b.min + (internal.sin() + 1.0) * (b.max - b.min) / 2.0,
        }
    }

    /// Transform an external value to the internal optimizer value.
    ///
    /// Values outside the limits are clamped first; non-finite values are rejected.
    pub fn to_internal(&self, external: f64) -> Result<f64, BoundsError> {
        if !external.is_finite() {
            return Err(BoundsError::InfiniteValue);
        }

        let b = &self.bounds;
        let value = b.clamp(external);
        let internal = match (b.has_lower_bound(), b.has_upper_bound()) {
            (false, false) => value,
            (true, false) => ((value - b.min + 1.0).powi(2) - 1.0).sqrt(),
            (false, true) => ((b.max - value + 1.0).powi(2) - 1.0).sqrt(),
            (true, true) => {
                if b.max == b.min {
                    0.0
                } else {
                    (2.0 * (value - b.min) / (b.max - b.min) - 1.0)
                        .clamp(-1.0, 1.0)
                        .asin()
                }
            }
        };
        Ok(internal)
    }
}
