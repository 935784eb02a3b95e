//! Error types for PDP

use thiserror::Error;

/// Result type alias for PDP operations
pub type Result<T> = std::result::Result<T, PdpError>;

/// Main error type for PDP
#[derive(Error, Debug)]
pub enum PdpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Object storage error: {0}")]
    ObjectStore(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}
