//! Error types for ferry-core

use thiserror::Error;

/// Result type alias using ferry-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in ferry-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// The durable store could not be read or written
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Programming/configuration mistake, e.g. an operation kind with no endpoint
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation not found
    #[error("Operation not found: {0}")]
    NotFound(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error means "the store is down, try again later".
    pub const fn is_storage_unavailable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(error: rusqlite::Error) -> Self {
        Self::StorageUnavailable(error.to_string())
    }
}
