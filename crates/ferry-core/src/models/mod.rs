//! Data models for Ferry

mod kind;
mod operation;

pub use kind::{OperationKind, UnknownKind};
pub use operation::{OperationId, OperationStatus, SyncOperation};
