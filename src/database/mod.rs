pub mod schema;
pub mod queries;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use anyhow::{anyhow, Context, Result};

/// Local ledger of accounts and publish outcomes.
pub struct Database {
    pub conn: Mutex<Connection>,
}

impl Database {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database {}", db_path.display()))?;

        // WAL so `history` can read while a batch is writing
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        schema::create_tables(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection lock poisoned"))
    }
}
