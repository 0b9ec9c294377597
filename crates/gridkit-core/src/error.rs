//! Error types for gridkit

use thiserror::Error;

/// Core error type for store and configuration operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    /// The store refused the operation (access rights, constraint, ...)
    #[error("Rejected by store: {0}")]
    Rejected(String),

    /// The transport failed before the store could answer
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("{0}")]
    Other(String),
}

impl From<toml::de::Error> for GridError {
    fn from(err: toml::de::Error) -> Self {
        GridError::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for GridError {
    fn from(err: serde_json::Error) -> Self {
        GridError::Serialization(err.to_string())
    }
}

/// Result type alias for gridkit operations
pub type Result<T> = std::result::Result<T, GridError>;
