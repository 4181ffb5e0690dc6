//! Database connection management

use crate::error::Result;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

use super::migrations;

/// How long a writer waits on another process holding the queue file lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database wrapper for the queue's `SQLite` file
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open a database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let database = Self {
            conn: Connection::open(path)?,
        };
        database.configure()?;
        database.migrate()?;
        tracing::debug!("Opened queue database at {}", path.display());
        Ok(database)
    }

    /// Open an in-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        let database = Self {
            conn: Connection::open_in_memory()?,
        };
        database.configure()?;
        database.migrate()?;
        Ok(database)
    }

    /// Configure `SQLite` for crash-safe writes
    fn configure(&self) -> Result<()> {
        // In-memory databases report "memory" and ignore WAL
        self.conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))
            .ok();
        // FULL fsyncs the WAL on every commit so an acknowledged enqueue survives power loss
        self.conn.pragma_update(None, "synchronous", "FULL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        self.conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(())
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        migrations::run(&self.conn)
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Consume the wrapper and hand back the connection
    pub fn into_connection(self) -> Connection {
        self.conn
    }
}
