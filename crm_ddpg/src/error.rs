//! Error taxonomy for the training pipeline.
//!
//! `Configuration` errors are raised before the first rollout step.
//! `InsufficientData` is the only recoverable kind: callers skip the
//! training phase and keep collecting experience.

use thiserror::Error;

/// Errors produced by the training pipeline.
#[derive(Debug, Error)]
pub enum CrmError {
    /// Invalid or contradictory configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The transition store cannot serve the requested batch.
    #[error("insufficient data: requested {requested} samples, store holds {available}")]
    InsufficientData { requested: usize, available: usize },

    /// A transition or tensor did not have the expected layout.
    #[error("shape mismatch in {field}: expected {expected}, got {actual}")]
    ShapeMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// An environment step info payload lacked a required entry.
    #[error("malformed step info for replica {replica}: missing `{key}`")]
    MalformedInfo { replica: usize, key: &'static str },

    /// Tensor data could not be read back from the backend.
    #[error("tensor error: {0}")]
    Tensor(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CrmError {
    /// Shorthand for building a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        CrmError::Configuration(msg.into())
    }

    /// Whether the trainer may continue after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CrmError::InsufficientData { .. })
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CrmError>;
