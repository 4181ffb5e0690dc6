use std::io;

use ferry_core::config::ConfigError;
use ferry_core::models::UnknownKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] ferry_core::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    UnknownKind(#[from] UnknownKind),
    #[error("{0}")]
    InvalidStatus(String),
    #[error("Invalid operation ID: {0}")]
    InvalidId(String),
    #[error("Payload is not valid JSON: {0}")]
    InvalidPayload(String),
    #[error("Scope cannot be empty")]
    EmptyScope,
    #[error("Sync pass aborted: {0}")]
    SyncAborted(String),
}
