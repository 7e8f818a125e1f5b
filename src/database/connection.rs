//! SQLite-backed key/value storage for utags-store.
//!
//! Provides the [`Storage`] struct that wraps a `rusqlite::Connection` and
//! automatically runs schema migrations on open. Every persisted value is a
//! string under a single key, matching the whole-blob read-modify-write
//! discipline of the store: there is no partial-field persistence.
//!
//! Change listeners registered here fire after every mutation, including
//! changes reported from other browsing contexts via [`Storage::notify_external`].

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};

use super::migrations;
use crate::types::errors::StorageError;

/// Callback invoked with the changed key after persisted state mutates.
pub type ChangeListener = Box<dyn Fn(&str) + Send + Sync>;

/// Key/value storage wrapper providing SQLite connection management.
///
/// The connection lives behind a `Mutex` so the storage can be shared
/// across threads with `Arc<Storage>`.
pub struct Storage {
    conn: Mutex<Connection>,
    listeners: Mutex<Vec<ChangeListener>>,
}

impl Storage {
    /// Opens (or creates) a SQLite database at the given file path and runs migrations.
    ///
    /// # Errors
    /// Returns [`StorageError`] if the connection cannot be established or
    /// migrations fail.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(db_err)?;
        migrations::run_all(&conn).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
            listeners: Mutex::new(Vec::new()),
        })
    }

    /// Opens an in-memory SQLite database and runs migrations.
    ///
    /// Useful for testing — the database is discarded on drop.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        migrations::run_all(&conn).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
            listeners: Mutex::new(Vec::new()),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::DatabaseError("storage mutex poisoned".to_string()))
    }

    /// Reads the value stored under `key`, if any.
    pub fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT value FROM kv_store WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)
    }

    /// Writes `value` under `key`, replacing any previous value, then
    /// notifies change listeners.
    pub fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let now = now_secs();
        {
            let conn = self.conn()?;
            conn.execute(
                "INSERT OR REPLACE INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)",
                params![key, value, now],
            )
            .map_err(db_err)?;
        }
        self.notify(key);
        Ok(())
    }

    /// Removes `key` if present, then notifies change listeners.
    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        {
            let conn = self.conn()?;
            conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])
                .map_err(db_err)?;
        }
        self.notify(key);
        Ok(())
    }

    /// Registers a listener invoked with the changed key on every mutation.
    pub fn add_change_listener(&self, listener: ChangeListener) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(listener);
        }
    }

    /// Reports a change that originated in another browsing context. The
    /// passive side learns its cache is stale this way; it does not
    /// participate in conflict resolution.
    pub fn notify_external(&self, key: &str) {
        self.notify(key);
    }

    fn notify(&self, key: &str) {
        // Listeners run without the connection lock held so they can read back.
        if let Ok(listeners) = self.listeners.lock() {
            for listener in listeners.iter() {
                listener(key);
            }
        }
    }
}

fn db_err(err: rusqlite::Error) -> StorageError {
    StorageError::DatabaseError(err.to_string())
}

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
