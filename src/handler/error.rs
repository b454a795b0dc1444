//! Error types for each handler stage
//!
//! Loading, preprocessing and inference each return their own error type so a
//! malformed request can never be mistaken for a broken model.

use std::path::PathBuf;

use thiserror::Error;

/// Failure while bringing a model artifact into memory.
#[derive(Debug, Error)]
pub enum LoadError {
    /// No file in the model directory matched the adapter's pattern
    #[error("no model artifact matching '{pattern}' found in {}", dir.display())]
    ArtifactNotFound { dir: PathBuf, pattern: String },

    /// The artifact exists but the underlying library could not construct it
    #[error("failed to load model artifact {}: {reason}", path.display())]
    LoadFailure { path: PathBuf, reason: String },
}

impl LoadError {
    pub fn not_found(dir: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        Self::ArtifactNotFound {
            dir: dir.into(),
            pattern: pattern.into(),
        }
    }

    pub fn failure(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::LoadFailure {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// The request payload cannot be coerced into the shape the adapter expects.
#[derive(Debug, Error)]
#[error("invalid input data format: {0}")]
pub struct InvalidInputFormat(pub String);

impl InvalidInputFormat {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<serde_json::Error> for InvalidInputFormat {
    fn from(e: serde_json::Error) -> Self {
        Self(format!("payload is not valid JSON: {}", e))
    }
}

/// The model call itself failed, or produced output that cannot be returned.
#[derive(Debug, Error)]
#[error("inference failed: {0}")]
pub struct InferenceFailure(pub String);

impl InferenceFailure {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Failure of a single `predict` call.
#[derive(Debug, Error)]
pub enum PredictError {
    /// `predict` was called before a successful `load`
    #[error("model is not loaded")]
    NotLoaded,

    #[error(transparent)]
    InvalidInput(#[from] InvalidInputFormat),

    #[error(transparent)]
    Inference(#[from] InferenceFailure),
}

impl PredictError {
    /// True when the caller sent a bad payload, as opposed to a server-side fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, PredictError::InvalidInput(_))
    }

    /// Short machine-readable kind, used in HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            PredictError::NotLoaded => "model_not_loaded",
            PredictError::InvalidInput(_) => "invalid_input",
            PredictError::Inference(_) => "inference_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        let invalid: PredictError = InvalidInputFormat::new("bad").into();
        let failed: PredictError = InferenceFailure::new("boom").into();

        assert!(invalid.is_client_error());
        assert!(!failed.is_client_error());
        assert!(!PredictError::NotLoaded.is_client_error());
    }

    #[test]
    fn test_messages_carry_context() {
        let err = LoadError::not_found("/opt/ml/model", "*.joblib");
        assert_eq!(
            err.to_string(),
            "no model artifact matching '*.joblib' found in /opt/ml/model"
        );

        let err: PredictError = InvalidInputFormat::new("expected a list").into();
        assert_eq!(err.to_string(), "invalid input data format: expected a list");
        assert_eq!(err.kind(), "invalid_input");
    }
}
