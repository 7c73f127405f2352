//! SQLite-backed record store.
//!
//! The [`RecordStore`] keeps one row per sync id in `checklist_records`.
//! Payloads are stored as JSON text; the store does not inspect them.
//! Writes are last-write-wins.

use std::path::Path;

use parking_lot::Mutex;
use questlog_proto::ids::SyncId;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;

/// Path value that selects an in-memory database.
pub const IN_MEMORY: &str = ":memory:";

/// Errors from the record store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database rejected a statement.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored row does not hold valid JSON.
    #[error("stored record for {sync_id} is not valid JSON: {source}")]
    Corrupt {
        /// Record that failed to decode.
        sync_id: String,
        /// Underlying parse error.
        source: serde_json::Error,
    },

    /// The payload could not be encoded.
    #[error("failed to encode record: {0}")]
    Encode(#[source] serde_json::Error),

    /// A blocking store task panicked or was cancelled.
    #[error("store task failed: {0}")]
    Task(String),
}

/// Persistent map from sync id to JSON document.
///
/// Thread-safe via a [`Mutex`] around the single connection.
pub struct RecordStore {
    conn: Mutex<Connection>,
}

impl RecordStore {
    /// Opens (or creates) the database at `path`. The path `:memory:` opens a
    /// private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if the file cannot be opened or the
    /// schema cannot be created.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = if path.as_os_str() == IN_MEMORY {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens an empty in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if `SQLite` cannot allocate the database.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::open(Path::new(IN_MEMORY))
    }

    fn init_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS checklist_records (
                sync_id TEXT PRIMARY KEY,
                data_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Returns the stored document, or `None` if no record exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure or a corrupt row.
    pub fn get(&self, sync_id: &SyncId) -> Result<Option<Value>, StoreError> {
        let row: Option<String> = self
            .conn
            .lock()
            .query_row(
                "SELECT data_json FROM checklist_records WHERE sync_id = ?1",
                params![sync_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        row.map(|json| {
            serde_json::from_str(&json).map_err(|source| StoreError::Corrupt {
                sync_id: sync_id.to_string(),
                source,
            })
        })
        .transpose()
    }

    /// Inserts or replaces the document for `sync_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database or encoding failure.
    pub fn upsert(&self, sync_id: &SyncId, data: &Value) -> Result<(), StoreError> {
        let json = serde_json::to_string(data).map_err(StoreError::Encode)?;
        let now = chrono::Utc::now().to_rfc3339();
        self.conn.lock().execute(
            "INSERT INTO checklist_records (sync_id, data_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(sync_id) DO UPDATE SET
                data_json = excluded.data_json,
                updated_at = excluded.updated_at",
            params![sync_id.as_str(), json, now],
        )?;
        Ok(())
    }

    /// Removes the record. Returns `false` if there was nothing to remove.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] on database failure.
    pub fn delete(&self, sync_id: &SyncId) -> Result<bool, StoreError> {
        let removed = self.conn.lock().execute(
            "DELETE FROM checklist_records WHERE sync_id = ?1",
            params![sync_id.as_str()],
        )?;
        Ok(removed > 0)
    }

    /// Whether a record exists for `sync_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] on database failure.
    pub fn exists(&self, sync_id: &SyncId) -> Result<bool, StoreError> {
        let found: Option<i64> = self
            .conn
            .lock()
            .query_row(
                "SELECT 1 FROM checklist_records WHERE sync_id = ?1",
                params![sync_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Number of stored records.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] on database failure.
    pub fn count(&self) -> Result<usize, StoreError> {
        let n: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM checklist_records", [], |row| row.get(0))?;
        Ok(usize::try_from(n).unwrap_or_default())
    }
}
