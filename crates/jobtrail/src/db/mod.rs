//! SQLite persistence. One [`Database`] handle wraps the connection behind
//! a mutex; repos are plain functions over `&Connection` so they compose
//! inside a transaction (`rusqlite::Transaction` derefs to `Connection`).

pub mod application_repo;
pub mod dashboard_repo;
pub mod email_repo;
pub mod error;
pub mod event_repo;
pub mod followup_repo;
mod migrations;
pub mod rule_log_repo;
pub mod sync_state_repo;

pub use error::{DatabaseError, Result};

use std::path::Path;
use std::sync::{Arc, Mutex};

use log::info;
use rusqlite::Connection;

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (creating if needed) the database at `path` and brings the
    /// schema up to date.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        Self::initialize(conn)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::initialize(conn)
    }

    fn initialize(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run_all(&conn)?;
        info!("database ready");
        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` with the connection. For reads and single-statement writes.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        f(&conn)
    }

    /// Runs `f` inside a transaction, committing on `Ok` and rolling back
    /// on `Err`. All writes for one ingested message go through here.
    pub fn with_tx<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}
