//! Error taxonomy for model loading and prediction serving

use std::path::PathBuf;
use thiserror::Error;

/// Failure to resolve or deserialize a model artifact
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("model artifact not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("unsupported model format: {0}")]
    UnsupportedFormat(String),

    #[error("corrupt model artifact {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("tracking service error: {0}")]
    Tracking(String),

    #[error("failed to read model artifact {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ModelLoadError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Corrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// A request that cannot be served as submitted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing required features: {}", .0.join(", "))]
    MissingFeatures(Vec<String>),

    #[error("Non-numeric values for numeric features: {}", .0.join(", "))]
    NonNumericFeatures(Vec<String>),
}

impl ValidationError {
    /// Feature names the error refers to
    pub fn features(&self) -> &[String] {
        match self {
            ValidationError::MissingFeatures(names) | ValidationError::NonNumericFeatures(names) => {
                names
            }
        }
    }
}

/// Errors surfaced by the prediction request path
#[derive(Debug, Error)]
pub enum ServingError {
    #[error("Model not loaded")]
    ModelUnavailable,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Prediction error: {0}")]
    Prediction(String),

    #[error("Error loading model: {0}")]
    ModelLoad(#[from] ModelLoadError),
}

impl ServingError {
    pub fn prediction(err: impl std::fmt::Display) -> Self {
        Self::Prediction(err.to_string())
    }

    /// Short machine-readable kind, used for logging and error metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ServingError::ModelUnavailable => "model_unavailable",
            ServingError::Validation(_) => "validation",
            ServingError::Prediction(_) => "prediction",
            ServingError::ModelLoad(_) => "model_load",
        }
    }
}

pub type ServingResult<T> = Result<T, ServingError>;
