//! Operation store implementation

use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::{OperationId, OperationKind, OperationStatus, SyncOperation};

use super::Database;

/// Durable, indexed storage for queued operations.
///
/// Every status transition is a single atomic statement guarded by the
/// expected current status, so two callers racing to claim the same row
/// cannot both succeed. Transitions on a row that no longer exists return
/// `Ok(false)` rather than an error.
pub trait OperationStore: Send + Sync {
    /// Upsert an operation by id
    fn put(&self, operation: &SyncOperation) -> Result<()>;

    /// Get an operation by id
    fn get(&self, id: &OperationId) -> Result<Option<SyncOperation>>;

    /// Delete an operation by id, whatever its status
    fn delete(&self, id: &OperationId) -> Result<bool>;

    /// Pending operations eligible at `now_ms`, ordered `priority desc, created_at asc`
    fn list_pending(&self, now_ms: i64, kind: Option<OperationKind>)
        -> Result<Vec<SyncOperation>>;

    /// Operations in queue order, optionally filtered by status
    fn list(&self, status: Option<OperationStatus>, limit: usize) -> Result<Vec<SyncOperation>>;

    /// Claim a pending operation for dispatch and count the attempt
    fn mark_in_flight(&self, id: &OperationId, now_ms: i64) -> Result<bool>;

    /// Record a successful delivery
    fn mark_completed(&self, id: &OperationId, now_ms: i64) -> Result<bool>;

    /// Return an in-flight operation to pending until `next_eligible_at`
    ///
    /// Returns `false` when the row is gone or its cancellation was honored instead.
    fn mark_failed_retry(
        &self,
        id: &OperationId,
        next_eligible_at: i64,
        error: &str,
        now_ms: i64,
    ) -> Result<bool>;

    /// Move an in-flight operation to the terminal failure state
    ///
    /// Returns `false` when the row is gone or its cancellation was honored instead.
    fn mark_permanently_failed(&self, id: &OperationId, error: &str, now_ms: i64) -> Result<bool>;

    /// Count operations, optionally filtered by status
    fn count(&self, status: Option<OperationStatus>) -> Result<usize>;

    /// Per-status counts
    fn stats(&self) -> Result<StoreStats>;

    /// Delete terminal operations last touched before `older_than_ms`
    fn purge_terminal(&self, older_than_ms: i64) -> Result<usize>;

    /// Remove non-terminal operations in `scope` (every scope when `None`)
    ///
    /// Pending rows are deleted now. In-flight rows are flagged and dropped
    /// once their current attempt finishes without success.
    fn cancel(&self, scope: Option<&str>) -> Result<CancelOutcome>;

    /// Return in-flight operations claimed at or before `claimed_before_ms`
    /// to pending and give back the attempt each claim consumed
    fn recover_in_flight(&self, claimed_before_ms: i64, now_ms: i64) -> Result<RecoveryReport>;

    /// Append a finished pass to the history
    fn record_pass(&self, pass: &PassRecord) -> Result<()>;

    /// Finish time of the most recent pass
    fn last_pass_at(&self) -> Result<Option<i64>>;
}

/// Counts by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub pending: usize,
    pub in_flight: usize,
    pub completed: usize,
    pub permanently_failed: usize,
}

impl StoreStats {
    pub const fn total(&self) -> usize {
        self.pending + self.in_flight + self.completed + self.permanently_failed
    }
}

/// Result of a cancellation request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CancelOutcome {
    /// Pending operations deleted immediately
    pub removed: usize,
    /// In-flight operations that will be dropped after their current attempt
    pub deferred: usize,
}

/// Result of startup reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Returned to pending with the interrupted attempt handed back
    pub requeued: Vec<SyncOperation>,
    /// Were cancelled while in flight; deleted
    pub dropped: usize,
}

/// One finished pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassRecord {
    pub started_at: i64,
    pub finished_at: i64,
    pub succeeded: usize,
    pub retried: usize,
    pub failed: usize,
}

const SELECT_COLUMNS: &str = "id, kind, payload, priority, attempts, max_attempts, created_at,
    next_eligible_at, status, scope, updated_at, last_error";

const QUEUE_ORDER: &str = "ORDER BY priority DESC, created_at ASC, seq ASC";

/// `SQLite` implementation of `OperationStore`
pub struct SqliteOperationStore {
    conn: Mutex<Connection>,
}

impl SqliteOperationStore {
    /// Wrap an opened and migrated database
    pub fn new(database: Database) -> Self {
        Self {
            conn: Mutex::new(database.into_connection()),
        }
    }

    /// Open (or create) a store at `path`
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Ok(Self::new(Database::open(path)?))
    }

    /// Open an in-memory store (primarily for tests)
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::StorageUnavailable("queue store lock poisoned".to_string()))
    }

    /// Parse an operation from a row selected with `SELECT_COLUMNS`
    fn parse_operation(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncOperation> {
        let id: String = row.get(0)?;
        let kind: String = row.get(1)?;
        let payload: String = row.get(2)?;
        let status: String = row.get(8)?;

        Ok(SyncOperation {
            id: id.parse().map_err(|error| conversion_error(0, error))?,
            kind: kind.parse().map_err(|error| conversion_error(1, error))?,
            payload: serde_json::from_str(&payload).map_err(|error| conversion_error(2, error))?,
            priority: row.get(3)?,
            attempts: row.get(4)?,
            max_attempts: row.get(5)?,
            created_at: row.get(6)?,
            next_eligible_at: row.get(7)?,
            status: status
                .parse()
                .map_err(|error: String| conversion_error(8, error))?,
            scope: row.get(9)?,
            updated_at: row.get(10)?,
            last_error: row.get(11)?,
        })
    }
}

fn conversion_error(
    column: usize,
    error: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, error.into())
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

impl OperationStore for SqliteOperationStore {
    fn put(&self, operation: &SyncOperation) -> Result<()> {
        // Stored as JSON text so null and scalar payloads keep their type
        let payload = serde_json::to_string(&operation.payload)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sync_operations (
                id, kind, payload, priority, attempts, max_attempts, created_at,
                next_eligible_at, status, scope, updated_at, last_error
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(id) DO UPDATE SET
                kind = excluded.kind,
                payload = excluded.payload,
                priority = excluded.priority,
                attempts = excluded.attempts,
                max_attempts = excluded.max_attempts,
                created_at = excluded.created_at,
                next_eligible_at = excluded.next_eligible_at,
                status = excluded.status,
                scope = excluded.scope,
                updated_at = excluded.updated_at,
                last_error = excluded.last_error",
            params![
                operation.id.as_str(),
                operation.kind.as_str(),
                payload,
                operation.priority,
                operation.attempts,
                operation.max_attempts,
                operation.created_at,
                operation.next_eligible_at,
                operation.status.as_str(),
                operation.scope,
                operation.updated_at,
                operation.last_error,
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &OperationId) -> Result<Option<SyncOperation>> {
        let conn = self.conn()?;
        let operation = conn
            .query_row(
                &format!("SELECT {SELECT_COLUMNS} FROM sync_operations WHERE id = ?"),
                params![id.as_str()],
                Self::parse_operation,
            )
            .optional()?;
        Ok(operation)
    }

    fn delete(&self, id: &OperationId) -> Result<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "DELETE FROM sync_operations WHERE id = ?",
            params![id.as_str()],
        )?;
        Ok(rows > 0)
    }

    fn list_pending(
        &self,
        now_ms: i64,
        kind: Option<OperationKind>,
    ) -> Result<Vec<SyncOperation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS}
             FROM sync_operations
             WHERE status = 'pending'
               AND next_eligible_at <= ?1
               AND (?2 IS NULL OR kind = ?2)
             {QUEUE_ORDER}"
        ))?;

        let operations = stmt
            .query_map(
                params![now_ms, kind.map(OperationKind::as_str)],
                Self::parse_operation,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(operations)
    }

    fn list(&self, status: Option<OperationStatus>, limit: usize) -> Result<Vec<SyncOperation>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS}
             FROM sync_operations
             WHERE (?1 IS NULL OR status = ?1)
             {QUEUE_ORDER}
             LIMIT ?2"
        ))?;

        let operations = stmt
            .query_map(
                params![status.map(OperationStatus::as_str), sql_limit(limit)],
                Self::parse_operation,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(operations)
    }

    fn mark_in_flight(&self, id: &OperationId, now_ms: i64) -> Result<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE sync_operations
             SET status = 'in-flight', attempts = attempts + 1, updated_at = ?1
             WHERE id = ?2 AND status = 'pending'",
            params![now_ms, id.as_str()],
        )?;
        Ok(rows == 1)
    }

    fn mark_completed(&self, id: &OperationId, now_ms: i64) -> Result<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE sync_operations
             SET status = 'completed', last_error = NULL, updated_at = ?1
             WHERE id = ?2 AND status = 'in-flight'",
            params![now_ms, id.as_str()],
        )?;
        Ok(rows == 1)
    }

    fn mark_failed_retry(
        &self,
        id: &OperationId,
        next_eligible_at: i64,
        error: &str,
        now_ms: i64,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        let dropped = tx.execute(
            "DELETE FROM sync_operations
             WHERE id = ? AND status = 'in-flight' AND cancel_requested = 1",
            params![id.as_str()],
        )?;
        if dropped > 0 {
            tx.commit()?;
            tracing::debug!("Dropped cancelled operation {id} after failed attempt");
            return Ok(false);
        }

        let rows = tx.execute(
            "UPDATE sync_operations
             SET status = 'pending', next_eligible_at = ?1, last_error = ?2, updated_at = ?3
             WHERE id = ?4 AND status = 'in-flight'",
            params![next_eligible_at, error, now_ms, id.as_str()],
        )?;
        tx.commit()?;
        Ok(rows == 1)
    }

    fn mark_permanently_failed(&self, id: &OperationId, error: &str, now_ms: i64) -> Result<bool> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        let dropped = tx.execute(
            "DELETE FROM sync_operations
             WHERE id = ? AND status = 'in-flight' AND cancel_requested = 1",
            params![id.as_str()],
        )?;
        if dropped > 0 {
            tx.commit()?;
            tracing::debug!("Dropped cancelled operation {id} after rejected attempt");
            return Ok(false);
        }

        let rows = tx.execute(
            "UPDATE sync_operations
             SET status = 'permanently-failed', last_error = ?1, updated_at = ?2
             WHERE id = ?3 AND status = 'in-flight'",
            params![error, now_ms, id.as_str()],
        )?;
        tx.commit()?;
        Ok(rows == 1)
    }

    fn count(&self, status: Option<OperationStatus>) -> Result<usize> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM sync_operations WHERE (?1 IS NULL OR status = ?1)",
            params![status.map(OperationStatus::as_str)],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn stats(&self) -> Result<StoreStats> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM sync_operations GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, usize>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stats = StoreStats::default();
        for (status, count) in rows {
            match status.parse::<OperationStatus>() {
                Ok(OperationStatus::Pending) => stats.pending = count,
                Ok(OperationStatus::InFlight) => stats.in_flight = count,
                Ok(OperationStatus::Completed) => stats.completed = count,
                Ok(OperationStatus::PermanentlyFailed) => stats.permanently_failed = count,
                Err(error) => tracing::warn!("Ignoring unexpected status row: {error}"),
            }
        }
        Ok(stats)
    }

    fn purge_terminal(&self, older_than_ms: i64) -> Result<usize> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "DELETE FROM sync_operations
             WHERE status IN ('completed', 'permanently-failed') AND updated_at < ?",
            params![older_than_ms],
        )?;
        Ok(rows)
    }

    fn cancel(&self, scope: Option<&str>) -> Result<CancelOutcome> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        let removed = tx.execute(
            "DELETE FROM sync_operations
             WHERE status = 'pending' AND (?1 IS NULL OR scope = ?1)",
            params![scope],
        )?;
        let deferred = tx.execute(
            "UPDATE sync_operations SET cancel_requested = 1
             WHERE status = 'in-flight' AND (?1 IS NULL OR scope = ?1)",
            params![scope],
        )?;

        tx.commit()?;
        Ok(CancelOutcome { removed, deferred })
    }

    fn recover_in_flight(&self, claimed_before_ms: i64, now_ms: i64) -> Result<RecoveryReport> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        let dropped = tx.execute(
            "DELETE FROM sync_operations
             WHERE status = 'in-flight' AND cancel_requested = 1 AND updated_at <= ?",
            params![claimed_before_ms],
        )?;

        let stale = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {SELECT_COLUMNS}
                 FROM sync_operations
                 WHERE status = 'in-flight' AND updated_at <= ?
                 {QUEUE_ORDER}"
            ))?;
            let rows = stmt
                .query_map(params![claimed_before_ms], Self::parse_operation)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        let mut report = RecoveryReport {
            dropped,
            ..RecoveryReport::default()
        };

        // No outcome was recorded for these claims, so the attempt is handed back
        for mut operation in stale {
            tx.execute(
                "UPDATE sync_operations
                 SET status = 'pending', attempts = MAX(attempts - 1, 0),
                     next_eligible_at = ?1, updated_at = ?1
                 WHERE id = ?2",
                params![now_ms, operation.id.as_str()],
            )?;
            operation.status = OperationStatus::Pending;
            operation.attempts = operation.attempts.saturating_sub(1);
            operation.next_eligible_at = now_ms;
            operation.updated_at = now_ms;
            report.requeued.push(operation);
        }

        tx.commit()?;
        Ok(report)
    }

    fn record_pass(&self, pass: &PassRecord) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sync_passes (started_at, finished_at, succeeded, retried, failed)
             VALUES (?, ?, ?, ?, ?)",
            params![
                pass.started_at,
                pass.finished_at,
                pass.succeeded,
                pass.retried,
                pass.failed
            ],
        )?;
        Ok(())
    }

    fn last_pass_at(&self) -> Result<Option<i64>> {
        let conn = self.conn()?;
        let finished_at = conn.query_row("SELECT MAX(finished_at) FROM sync_passes", [], |row| {
            row.get::<_, Option<i64>>(0)
        })?;
        Ok(finished_at)
    }
}
