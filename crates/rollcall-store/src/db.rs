//! Database open and schema.

use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS gallery (
    identity      TEXT PRIMARY KEY,
    embedding     TEXT NOT NULL,
    model_version TEXT,
    created_at    TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS attendance (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    identity  TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    event     TEXT NOT NULL CHECK(event IN ('check-in', 'check-out'))
);
CREATE INDEX IF NOT EXISTS idx_attendance_identity ON attendance(identity, id);
";

/// Open (creating if needed) the kiosk database and apply the schema.
pub fn open(path: &Path) -> Result<Connection, StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch(SCHEMA)?;
    tracing::debug!(path = %path.display(), "database opened");
    Ok(conn)
}

/// In-memory database with the same schema, for tests.
pub fn open_in_memory() -> Result<Connection, StoreError> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}
