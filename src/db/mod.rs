pub mod migrations;
pub mod schema;

use crate::cache::KvBackend;
use crate::error::{is_busy, AppError};
use crate::safe_lock;
use log::warn;
use rusqlite::{params, Connection, OptionalExtension, Result};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(std::time::Duration::from_secs(2))?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Durable key-value storage backed by the `kv` table.
pub struct SqliteStore {
    db: Arc<Mutex<Database>>,
    data_version: Mutex<Option<i64>>,
}

impl SqliteStore {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self {
            db,
            data_version: Mutex::new(None),
        }
    }

    fn lock_db(&self) -> MutexGuard<'_, Database> {
        safe_lock(&self.db, "SqliteStore")
    }
}

fn unix_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| i64::try_from(d.as_secs()).ok())
        .unwrap_or(0)
}

fn log_busy(operation: &str, key: &str, e: &rusqlite::Error) {
    if is_busy(e) {
        warn!("SqliteStore: database busy during {operation} of '{key}'");
    }
}

impl KvBackend for SqliteStore {
    fn read(&self, key: &str) -> Result<Option<String>, AppError> {
        let db = self.lock_db();
        db.connection()
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()
            .map_err(|e| {
                log_busy("read", key, &e);
                AppError::from(e)
            })
    }

    fn write(&self, key: &str, value: &str) -> Result<(), AppError> {
        let db = self.lock_db();
        db.connection()
            .execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, unix_secs()],
            )
            .map_err(|e| {
                log_busy("write", key, &e);
                AppError::from(e)
            })?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), AppError> {
        let db = self.lock_db();
        db.connection()
            .execute("DELETE FROM kv WHERE key = ?1", params![key])
            .map_err(|e| {
                log_busy("delete", key, &e);
                AppError::from(e)
            })?;
        Ok(())
    }

    // data_version only moves for commits made through other connections.
    fn changed_externally(&self) -> bool {
        let version: i64 = match self
            .lock_db()
            .connection()
            .query_row("PRAGMA data_version", [], |row| row.get(0))
        {
            Ok(version) => version,
            Err(e) => {
                warn!("SqliteStore: data_version check failed: {e}");
                return false;
            }
        };
        let mut seen = safe_lock(&self.data_version, "SqliteStore data_version");
        let changed = seen.is_some_and(|previous| previous != version);
        *seen = Some(version);
        changed
    }
}
