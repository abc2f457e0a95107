//! Error types for the autoda-core crate.

use thiserror::Error;

/// Top-level error type for trial execution.
#[derive(Debug, Error)]
pub enum AutodaError {
    #[error("Precondition violated: {0}")]
    Precondition(String),

    #[error("Training finished without completing a single epoch")]
    NoEpochsCompleted,

    #[error("Metric '{0}' missing from training history")]
    MissingMetric(String),

    #[error("Epoch call starting at epoch {epoch} made no progress after {attempts} attempt(s)")]
    ZeroProgress { epoch: usize, attempts: usize },

    #[error("Model error: {0}")]
    Model(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Augmentation error: {0}")]
    Augmentation(String),

    #[error("Device busy: {0}")]
    DeviceBusy(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl AutodaError {
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    pub fn augmentation(msg: impl Into<String>) -> Self {
        Self::Augmentation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

impl From<figment::Error> for AutodaError {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AutodaError>;
