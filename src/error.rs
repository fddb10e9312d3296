//! Error types for precision hooks and the step pipeline.
//!
//! Failures raised by a model's backward implementation, a direct tensor
//! backward, or an optimizer step travel through the hooks untouched: the
//! hooks only propagate with `?` and never re-wrap.

use thiserror::Error;

/// Result type alias for entrenar-precision operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by precision strategies, optimizers and models.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backward failed: {0}")]
    Backward(String),

    #[error("Optimizer step failed: {0}")]
    OptimizerStep(String),

    #[error("Tensor shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch { expected: Vec<usize>, actual: Vec<usize> },
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
