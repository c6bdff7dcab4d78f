// src/infra/errors.rs — Error types for Synapse

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SynapseError {
    // Ingestion errors (degrade, never surface to the caller)
    #[error("Malformed event: {reason}")]
    MalformedEvent { reason: String },

    #[error("Insufficient data: need {needed}, got {got}")]
    InsufficientData { needed: usize, got: usize },

    // Model errors (fall back to the frequency table)
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Training failed: {0}")]
    TrainingFailure(String),

    #[error("Prediction timed out after {timeout_ms}ms")]
    PredictionTimeout { timeout_ms: u64 },

    // Infra
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SynapseError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        SynapseError::MalformedEvent {
            reason: reason.into(),
        }
    }

    /// Whether the caller should fall back to the frequency-table predictor.
    pub fn falls_back(&self) -> bool {
        matches!(
            self,
            SynapseError::ModelUnavailable(_) | SynapseError::PredictionTimeout { .. }
        )
    }
}

pub type Result<T, E = SynapseError> = std::result::Result<T, E>;
