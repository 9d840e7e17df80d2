//! Measured scans consumed by the fit engine.
//!
//! A [`Dataset`] holds equal-length `x`, `y` and `dy` arrays plus a metadata
//! tree. Expressions reach the metadata through `data.<key>` paths; nested maps
//! are traversed with further dots (`data.d0.T` in global fits).

use crate::error::{FitError, Result};
use crate::parameters::expression::{ExprResult, ExpressionError};
use ndarray::{Array1, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata of a dataset: string keys to scalars, arrays, text or nested maps.
pub type Metadata = BTreeMap<String, MetaValue>;

/// A metadata entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Number(f64),
    Array(Vec<f64>),
    Text(String),
    Map(Metadata),
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        MetaValue::Number(value)
    }
}

impl From<Vec<f64>> for MetaValue {
    fn from(values: Vec<f64>) -> Self {
        MetaValue::Array(values)
    }
}

impl From<&str> for MetaValue {
    fn from(text: &str) -> Self {
        MetaValue::Text(text.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(text: String) -> Self {
        MetaValue::Text(text)
    }
}

impl From<Metadata> for MetaValue {
    fn from(map: Metadata) -> Self {
        MetaValue::Map(map)
    }
}

/// Look up a dotted path (without the leading `data.`) and require a number.
pub fn lookup_scalar(meta: &Metadata, path: &str) -> ExprResult<f64> {
    let missing = || ExpressionError::UndefinedMetadata {
        path: path.to_string(),
    };

    let mut segments = path.split('.');
    let first = segments.next().ok_or_else(missing)?;
    let mut current = meta.get(first).ok_or_else(missing)?;
    for segment in segments {
        current = match current {
            MetaValue::Map(map) => map.get(segment).ok_or_else(missing)?,
            _ => return Err(missing()),
        };
    }

    match current {
        MetaValue::Number(value) => Ok(*value),
        _ => Err(ExpressionError::NotScalar {
            path: path.to_string(),
        }),
    }
}

/// One measured scan
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub name: Option<String>,
    pub x: Array1<f64>,
    pub y: Array1<f64>,
    pub dy: Array1<f64>,
    pub meta: Metadata,
}

impl Dataset {
    /// Create a dataset; the three arrays must have the same length.
    ///
    /// `dy` is used as a divisor in the residuals, filtering zero uncertainties
    /// is left to the caller.
    pub fn new(x: Array1<f64>, y: Array1<f64>, dy: Array1<f64>) -> Result<Self> {
        if x.len() != y.len() || x.len() != dy.len() {
            return Err(FitError::DimensionMismatch(format!(
                "x, y and dy must have equal lengths (got {}, {}, {})",
                x.len(),
                y.len(),
                dy.len()
            )));
        }
        Ok(Self {
            name: None,
            x,
            y,
            dy,
            meta: Metadata::new(),
        })
    }

    pub fn from_vecs(x: Vec<f64>, y: Vec<f64>, dy: Vec<f64>) -> Result<Self> {
        Self::new(Array1::from(x), Array1::from(y), Array1::from(dy))
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<MetaValue>) -> Self {
        self.meta.insert(key.to_string(), value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Smallest and largest x, `None` for an empty dataset
    pub fn x_range(&self) -> Option<(f64, f64)> {
        if self.x.is_empty() {
            return None;
        }
        let min = self.x.iter().copied().fold(f64::INFINITY, f64::min);
        let max = self.x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some((min, max))
    }

    /// Concatenate several datasets into one.
    ///
    /// The metadata of dataset `i` is stored under the key `d<i>`.
    pub fn concat(datasets: &[Dataset]) -> Result<Dataset> {
        if datasets.is_empty() {
            return Err(FitError::InvalidInput(
                "cannot concatenate an empty list of datasets".to_string(),
            ));
        }

        let xs: Vec<_> = datasets.iter().map(|d| d.x.view()).collect();
        let ys: Vec<_> = datasets.iter().map(|d| d.y.view()).collect();
        let dys: Vec<_> = datasets.iter().map(|d| d.dy.view()).collect();
        fn join(views: &[ndarray::ArrayView1<'_, f64>]) -> Result<Array1<f64>> {
            ndarray::concatenate(Axis(0), views)
                .map_err(|e| FitError::DimensionMismatch(e.to_string()))
        }

        let meta = datasets
            .iter()
            .enumerate()
            .map(|(i, d)| (format!("d{}", i), MetaValue::Map(d.meta.clone())))
            .collect();

        Ok(Dataset {
            name: Some("global".to_string()),
            x: join(&xs)?,
            y: join(&ys)?,
            dy: join(&dys)?,
            meta,
        })
    }
}
