//! Sync passes and the triggers that start them

mod coordinator;
mod runner;

pub use coordinator::{PassOutcome, PassReport, SyncCoordinator, SyncSettings};
pub use runner::{spawn, BackgroundWake, SyncHandle};
