//! SQLite-backed document store for users, confessions, comments, likes and
//! inbox notifications.
//!
//! The store mirrors the limits of the hosted document database it stands in
//! for: batched writes are capped at [`MAX_BATCH_OPS`] operations and "in"
//! membership queries at [`MAX_IN_VALUES`] probe values. Callers chunk
//! themselves; nothing here splits a request.

pub mod batch;
pub mod error;
pub mod migrations;
pub mod models;
pub mod queries;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

pub use batch::WriteOp;
pub use error::{Result, StoreError};
pub use models::{CounterField, InboxEntry, StoredComment, StoredConfession, TokenOwner};

/// Provider ceiling on operations in one batched write.
pub const MAX_BATCH_OPS: usize = 500;

/// Provider ceiling on probe values in one "in" query.
pub const MAX_IN_VALUES: usize = 10;

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;

        migrations::run(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory database, used by tests and local tooling.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.lock()?;
        f(&mut conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }
}
