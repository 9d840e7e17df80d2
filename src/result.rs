//! Fit results.

use crate::error::Result;
use crate::parameters::Parameter;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Outcome of fitting one model to one dataset.
///
/// A result with `success == false` is a soft failure: the optimizer ran to
/// completion without meeting its convergence criterion, and `params` hold the
/// best values it found.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitResult {
    pub success: bool,
    pub message: String,
    /// Reduced chi-square `Σ((f - y) / dy)² / (n - n_free)`
    pub chisqr: f64,
    /// Fitted parameters with errors and correlations
    pub params: Vec<Parameter>,
    /// Dense x grid over the data range
    pub curve_x: Vec<f64>,
    /// Model evaluated on `curve_x`
    pub curve_y: Vec<f64>,
    /// Description of the fitted model
    pub model: String,
    pub backend: String,
    pub iterations: usize,
    pub n_points: usize,
    pub n_free: usize,
}

impl FitResult {
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Fitted values by parameter name
    pub fn values(&self) -> BTreeMap<String, f64> {
        self.params
            .iter()
            .map(|p| (p.name.clone(), p.value))
            .collect()
    }

    /// Standard errors of the parameters that have one
    pub fn errors(&self) -> BTreeMap<String, f64> {
        self.params
            .iter()
            .filter_map(|p| p.error.map(|e| (p.name.clone(), e)))
            .collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for FitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Model: {}", self.model)?;
        writeln!(
            f,
            "Backend: {} ({}: {})",
            self.backend,
            if self.success { "converged" } else { "not converged" },
            self.message
        )?;
        writeln!(
            f,
            "Reduced chi-square: {:.6} ({} points, {} free parameters, {} iterations)",
            self.chisqr, self.n_points, self.n_free, self.iterations
        )?;
        for param in &self.params {
            writeln!(f, "  {}", param)?;
        }
        Ok(())
    }
}

/// Outcome of a global fit: one result per dataset from a single optimization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalResult {
    pub success: bool,
    pub message: String,
    /// Reduced chi-square of the aggregate problem
    pub chisqr: f64,
    pub backend: String,
    pub iterations: usize,
    /// Per-dataset results, in dataset order
    pub results: Vec<FitResult>,
}

impl GlobalResult {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FitResult> {
        self.results.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FitResult> {
        self.results.iter()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for GlobalResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Global fit over {} datasets with {}: {} (reduced chi-square {:.6})",
            self.results.len(),
            self.backend,
            self.message,
            self.chisqr
        )?;
        for (i, result) in self.results.iter().enumerate() {
            writeln!(f, "--- dataset {} ---", i)?;
            write!(f, "{}", result)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> FitResult {
        let mut pos = Parameter::new("p_pos", 3.0).unwrap();
        pos.error = Some(0.1);
        let ampl = Parameter::from_init("p_ampl", "2 * p_pos").unwrap();
        FitResult {
            success: true,
            message: "Converged".to_string(),
            chisqr: 0.5,
            params: vec![pos, ampl],
            curve_x: vec![1.0, 2.0],
            curve_y: vec![0.0, 1.0],
            model: "Gauss('p', pos=3)".to_string(),
            backend: "bounded".to_string(),
            iterations: 4,
            n_points: 5,
            n_free: 1,
        }
    }

    #[test]
    fn test_accessors() {
        let result = result();
        assert_eq!(result.get("p_pos").unwrap().value, 3.0);
        assert!(result.get("pos").is_none());
        assert_eq!(result.values().len(), 2);
        assert_eq!(result.errors().len(), 1);
        assert_eq!(result.errors()["p_pos"], 0.1);
    }

    #[test]
    fn test_report() {
        let text = result().to_string();
        assert!(text.contains("Backend: bounded (converged: Converged)"));
        assert!(text.contains("p_pos = 3 +/- 0.1"));

        let json = result().to_json().unwrap();
        assert!(json.contains("\"chisqr\": 0.5"));
    }
}
