use thiserror::Error;

use crate::parameters::expression::ExpressionError;
use crate::parameters::parameter::ParameterError;

/// Error types for the scanfit library.
#[derive(Error, Debug)]
pub enum FitError {
    /// Invalid parameter name, initializer, or a name clash during composition.
    #[error("Parameter definition error: {0}")]
    ParameterDefinition(#[from] ParameterError),

    /// An expression could not be parsed or evaluated.
    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),

    /// Dependent parameters that could not be resolved (cycles or unknown names).
    #[error("Could not resolve parameter expressions for: {}", unresolved.join(", "))]
    DependencyResolution { unresolved: Vec<String> },

    /// The requested backend is not registered in this build.
    #[error("Fit backend '{0}' is not available")]
    BackendUnavailable(String),

    /// The optimizer failed numerically; the fit was aborted.
    #[error("Fit failed: {0}")]
    FitExecution(String),

    /// A textual model description could not be parsed.
    #[error("Model syntax error: {0}")]
    ModelSyntax(String),

    /// A textual model description named an unregistered model.
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// Error indicating a mismatch in array dimensions.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Invalid input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A fit option has the wrong type or an invalid value.
    #[error("Invalid fit option '{key}': {message}")]
    InvalidOption { key: String, message: String },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FitError {
    /// Whether this error was raised while constructing or composing models.
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            FitError::ParameterDefinition(_)
                | FitError::ModelSyntax(_)
                | FitError::UnknownModel(_)
        )
    }
}

/// Result type alias for scanfit operations.
pub type Result<T> = std::result::Result<T, FitError>;
