//! Durable storage for the operation queue

mod connection;
mod migrations;
mod repository;

pub use connection::Database;
pub use repository::{
    CancelOutcome, OperationStore, PassRecord, RecoveryReport, SqliteOperationStore, StoreStats,
};
