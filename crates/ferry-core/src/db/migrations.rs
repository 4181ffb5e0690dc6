//! Database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get::<_, i32>(0).map(|value| value != 0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

/// Apply a list of statements atomically.
fn apply(conn: &Connection, statements: &[&str]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    for stmt in statements {
        tx.execute(stmt, [])?;
    }
    tx.commit()?;
    Ok(())
}

/// Migration to version 1: operation queue
fn migrate_v1(conn: &Connection) -> Result<()> {
    apply(
        conn,
        &[
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            )",
            // seq gives a stable FIFO tie-break for operations created in the same millisecond
            "CREATE TABLE IF NOT EXISTS sync_operations (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL,
                priority INTEGER NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                max_attempts INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                next_eligible_at INTEGER NOT NULL,
                status TEXT NOT NULL CHECK (
                    status IN ('pending', 'in-flight', 'completed', 'permanently-failed')
                ),
                scope TEXT,
                updated_at INTEGER NOT NULL,
                last_error TEXT,
                cancel_requested INTEGER NOT NULL DEFAULT 0
            )",
            "CREATE INDEX IF NOT EXISTS idx_sync_operations_ready
                ON sync_operations(status, next_eligible_at)",
            "CREATE INDEX IF NOT EXISTS idx_sync_operations_order
                ON sync_operations(priority DESC, created_at ASC, seq ASC)",
            "CREATE INDEX IF NOT EXISTS idx_sync_operations_kind ON sync_operations(kind)",
            "CREATE INDEX IF NOT EXISTS idx_sync_operations_scope ON sync_operations(scope)",
            "CREATE INDEX IF NOT EXISTS idx_sync_operations_updated
                ON sync_operations(updated_at)",
            "INSERT INTO schema_version (version) VALUES (1)",
        ],
    )?;

    tracing::info!("Migrated queue database to version 1");
    Ok(())
}

/// Migration to version 2: pass history for status reporting
fn migrate_v2(conn: &Connection) -> Result<()> {
    apply(
        conn,
        &[
            "CREATE TABLE IF NOT EXISTS sync_passes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                started_at INTEGER NOT NULL,
                finished_at INTEGER NOT NULL,
                succeeded INTEGER NOT NULL,
                retried INTEGER NOT NULL,
                failed INTEGER NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_sync_passes_finished
                ON sync_passes(finished_at DESC)",
            "INSERT INTO schema_version (version) VALUES (2)",
        ],
    )?;

    tracing::info!("Migrated queue database to version {CURRENT_VERSION}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn test_migrations() {
        let conn = setup();
        run(&conn).unwrap();

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = setup();
        run(&conn).unwrap();
        run(&conn).unwrap(); // Should not fail

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_status_check_constraint() {
        let conn = setup();
        run(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO sync_operations
                (id, kind, payload, priority, max_attempts, created_at, next_eligible_at, status, updated_at)
             VALUES ('x', 'draft-pick', '{}', 1, 5, 0, 0, 'exploded', 0)",
            [],
        );
        assert!(result.is_err());
    }
}
