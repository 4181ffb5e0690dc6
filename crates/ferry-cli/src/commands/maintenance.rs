use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use ferry_core::db::OperationStore;
use ferry_core::{QueueConfig, SyncQueue};

use crate::commands::common::{normalize_scope, open_store, parse_operation_id, plural};
use crate::error::CliError;

pub fn run_cancel(queue: &SyncQueue, scope: &str) -> Result<(), CliError> {
    let scope = normalize_scope(scope)?;
    let outcome = queue.cancel(&scope)?;
    println!("Cancelled {} for {scope}", plural(outcome.removed, "operation"));
    if outcome.deferred > 0 {
        println!(
            "{} in flight will be dropped unless delivered",
            plural(outcome.deferred, "operation")
        );
    }
    Ok(())
}

pub fn run_clear(queue: &SyncQueue) -> Result<(), CliError> {
    let outcome = queue.clear()?;
    println!("Cleared {}", plural(outcome.removed, "pending operation"));
    Ok(())
}

pub fn run_purge(queue: &SyncQueue, older_than_secs: Option<u64>) -> Result<(), CliError> {
    let older_than =
        older_than_secs.map_or_else(|| queue.config().retention(), Duration::from_secs);
    let purged = queue.purge(older_than)?;
    println!("Purged {}", plural(purged, "finished operation"));
    Ok(())
}

/// Works on the store directly: opening a queue would already reconcile
/// with the configured grace period.
pub fn run_recover(
    db_path: &Path,
    config: &QueueConfig,
    older_than_secs: Option<u64>,
) -> Result<(), CliError> {
    let store = open_store(db_path)?;
    let grace = older_than_secs.map_or_else(|| config.in_flight_grace(), Duration::from_secs);
    let now = Utc::now().timestamp_millis();
    let claimed_before = now.saturating_sub(i64::try_from(grace.as_millis()).unwrap_or(i64::MAX));

    let report = store.recover_in_flight(claimed_before, now)?;
    println!(
        "Requeued {}, {} dropped after cancel",
        plural(report.requeued.len(), "operation"),
        report.dropped
    );
    Ok(())
}

pub fn run_retry(queue: &SyncQueue, id: &str) -> Result<(), CliError> {
    let id = parse_operation_id(id)?;
    let retried = queue.retry(&id)?;
    println!("{retried}");
    Ok(())
}

pub fn run_discard(queue: &SyncQueue, id: &str) -> Result<(), CliError> {
    let id = parse_operation_id(id)?;
    queue.discard(&id)?;
    println!("Discarded {id}");
    Ok(())
}
