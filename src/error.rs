//! Error types for the schema registry

use thiserror::Error;

/// Result type for schema operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Schema registry errors
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Schema not found: {name} version {version}")]
    NotFound { name: String, version: String },

    #[error("No mapping registered for schema '{schema}'")]
    MappingNotFound { schema: String },

    #[error("Invalid schema document: {0}")]
    InvalidDocument(String),

    #[error("Invalid mapping rules: {0}")]
    InvalidMapping(String),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Payload too large: {records} records (limit {limit})")]
    PayloadTooLarge { records: usize, limit: usize },

    #[error("Unsupported payload file: {0}")]
    UnsupportedFile(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SchemaError {
    /// Shorthand for a missing `(name, version)` pair.
    pub fn version_not_found(name: impl Into<String>, version: u32) -> Self {
        SchemaError::NotFound {
            name: name.into(),
            version: version.to_string(),
        }
    }

    /// Shorthand for an unregistered schema name.
    pub fn schema_not_found(name: impl Into<String>) -> Self {
        SchemaError::NotFound {
            name: name.into(),
            version: "latest".to_string(),
        }
    }

    /// Whether the store itself failed and the caller cannot make progress.
    ///
    /// Everything else (missing names, malformed documents or payloads) is a
    /// normal outcome the caller can report back.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SchemaError::Storage(_)
                | SchemaError::Sqlite(_)
                | SchemaError::ChecksumMismatch { .. }
                | SchemaError::Config(_)
                | SchemaError::Io(_)
        )
    }

    /// Whether this error reports an absent schema, version or mapping.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SchemaError::NotFound { .. } | SchemaError::MappingNotFound { .. }
        )
    }
}
