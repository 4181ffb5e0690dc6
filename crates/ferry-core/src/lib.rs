//! ferry-core - Core library for Ferry
//!
//! An offline-first operation queue: mutations are written durably to a local
//! `SQLite` file and replayed against the remote API once connectivity
//! returns, in priority order, with retry backoff and terminal-failure
//! reporting.

pub mod backoff;
pub mod clock;
pub mod config;
pub mod connectivity;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod notify;
pub mod queue;
pub mod sync;
mod util;

pub use config::QueueConfig;
pub use error::{Error, Result};
pub use models::{OperationId, OperationKind, OperationStatus, SyncOperation};
pub use queue::{EnqueueOptions, QueueStatus, SyncQueue};
