//! `SQLite` database connection.
//!
//! The database is stored at `~/.offsync/queue.db` and holds the operation
//! queue. The connection sits behind a mutex so one handle can be shared by
//! enqueuers and the sync engine; callers get it only for the duration of a
//! closure, so it is never held across an `.await`.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::Connection;

use crate::error::SyncError;

use super::migrations;

/// Database connection wrapper.
pub struct Database {
    conn: Mutex<Option<Connection>>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("open", &self.is_open())
            .finish()
    }
}

impl Database {
    /// Open the database at a specific path.
    ///
    /// Creates the database file and runs migrations if necessary. The
    /// connection uses WAL journaling with `synchronous = FULL`, so a
    /// committed write is on disk before the call that made it returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub fn open_at(path: &Path) -> Result<Self, SyncError> {
        let conn = Connection::open(path).map_err(|e| {
            SyncError::Database(format!("Failed to open database {}: {e}", path.display()))
        })?;

        // journal_mode answers with a row, so it cannot go through execute_batch
        let _mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| SyncError::Database(format!("Failed to enable WAL: {e}")))?;

        Self::init(conn)
    }

    /// Open an in-memory database (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub fn open_in_memory() -> Result<Self, SyncError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            SyncError::Database(format!("Failed to open in-memory database: {e}"))
        })?;

        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, SyncError> {
        conn.execute_batch("PRAGMA synchronous = FULL; PRAGMA busy_timeout = 5000;")
            .map_err(|e| SyncError::Database(format!("Failed to configure database: {e}")))?;

        migrations::run(&conn)?;

        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Run `f` with exclusive access to the connection.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Closed`] after [`Database::close`], otherwise
    /// whatever `f` returns.
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, SyncError>,
    ) -> Result<T, SyncError> {
        let mut guard = self.conn.lock();
        let conn = guard.as_mut().ok_or(SyncError::Closed)?;
        f(conn)
    }

    /// Get the current schema version.
    ///
    /// # Errors
    ///
    /// Returns an error if the version cannot be read.
    pub fn schema_version(&self) -> Result<i32, SyncError> {
        self.with_conn(|conn| migrations::get_version(conn))
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.conn.lock().is_some()
    }

    /// Release the connection. Later calls fail with [`SyncError::Closed`];
    /// closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if `SQLite` refuses to close the handle.
    pub fn close(&self) -> Result<(), SyncError> {
        let Some(conn) = self.conn.lock().take() else {
            return Ok(());
        };

        conn.close()
            .map_err(|(_, e)| SyncError::Database(format!("Failed to close database: {e}")))
    }
}
