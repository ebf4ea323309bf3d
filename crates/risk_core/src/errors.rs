//! Error types for the risk inference engine

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading a model or scoring a region
#[derive(Error, Debug)]
pub enum RiskError {
    /// Model or scaler artifact missing, unreadable or structurally invalid
    #[error("Failed to load model artifact {}: {reason}", path.display())]
    ModelLoad { path: PathBuf, reason: String },

    /// Required input field missing, non-numeric or out of range
    #[error("Invalid value for `{field}`: {reason}")]
    Validation { field: String, reason: String },

    /// Feature vector was built against a different schema than the model's
    #[error("Feature schema mismatch: model expects {expected}, vector has {found}")]
    SchemaMismatch { expected: String, found: String },

    /// Fault during tree traversal or score mapping
    #[error("Inference failed: {0}")]
    Inference(String),

    /// Invalid engine configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed input or output table
    #[error("Table error: {0}")]
    Table(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RiskError {
    pub(crate) fn model_load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ModelLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code, used in batch row error records
    pub fn code(&self) -> &'static str {
        match self {
            Self::ModelLoad { .. } => "MODEL_LOAD_ERROR",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::SchemaMismatch { .. } => "SCHEMA_MISMATCH_ERROR",
            Self::Inference(_) => "INFERENCE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Table(_) => "TABLE_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Whether a batch run may record this error against a single row and continue
    pub fn is_row_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::Inference(_) | Self::SchemaMismatch { .. }
        )
    }
}

/// Result type for risk engine operations
pub type Result<T> = std::result::Result<T, RiskError>;
