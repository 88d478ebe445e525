//! Common error types for Lenda.

use thiserror::Error;

/// Top-level error type for Lenda operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Schema descriptor or configuration file is missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A value could not be coerced to its declared column type.
    #[error("Type error: {table}.{column} cannot hold '{value}'")]
    Type {
        table: String,
        column: String,
        value: String,
    },

    /// Underlying store operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The store was created by a different schema version.
    #[error("Schema version mismatch in '{path}': found {found}, expected {expected}")]
    VersionMismatch {
        path: String,
        found: i64,
        expected: i64,
    },

    /// The store file does not exist yet.
    #[error("Store not initialized: {0}")]
    NotInitialized(String),

    /// Remote request failed.
    #[error("Network error: {0}")]
    Network(String),

    /// Token acquisition or refresh failed.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
