use std::path::PathBuf;
use thiserror::Error;

use crate::embedding::EmbeddingError;
use crate::store::StoreError;

/// Main error type for Reelseek
#[derive(Error, Debug)]
pub enum ReelseekError {
    /// The configured text field is not a column of the catalogue
    #[error("Field '{field}' not found in catalogue columns: {available:?}")]
    MissingField {
        field: String,
        available: Vec<String>,
    },

    /// A vector disagrees with the collection schema and was rejected before insertion
    #[error("Dimension mismatch for row {row_id}: expected {expected}, got {actual}")]
    DimensionMismatch {
        row_id: u64,
        expected: usize,
        actual: usize,
    },

    /// Two index configurations resolve to the same collection
    #[error("Duplicate collection name: {0}")]
    DuplicateCollection(String),

    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// CSV read/write errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// Embedding provider errors
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// Vector store errors
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReelseekError {
    /// Whether rerunning the same operation later may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ReelseekError::Embedding(e) => e.is_retryable() || e.is_unavailable(),
            _ => false,
        }
    }

    /// Whether this failure means the collection has not been built yet
    pub fn is_collection_not_found(&self) -> bool {
        matches!(self, ReelseekError::Store(StoreError::CollectionNotFound(_)))
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for Reelseek operations
pub type Result<T> = std::result::Result<T, ReelseekError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_provider_is_transient() {
        let err = ReelseekError::from(EmbeddingError::Unavailable {
            attempts: 2,
            reason: "connection reset".to_string(),
        });
        assert!(err.is_transient());

        let rejected = ReelseekError::from(EmbeddingError::Rejected {
            status: 401,
            message: "bad key".to_string(),
        });
        assert!(!rejected.is_transient());
    }

    #[test]
    fn test_collection_not_found_is_not_transient() {
        let err = ReelseekError::from(StoreError::CollectionNotFound("embedded_field_FLAT_L2".to_string()));
        assert!(err.is_collection_not_found());
        assert!(!err.is_transient());
    }
}
