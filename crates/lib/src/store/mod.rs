//! SQLite persistence for ingested group messages.

pub mod migrations;
pub mod models;
pub mod queries;

pub use models::{MessageRow, NewMessage, QuoteRef};

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;

/// Single connection owned by the ingestion loop; no locking.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;

        migrations::run(&conn)?;

        log::info!("database opened at {}", path.display());
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run(&conn)?;
        Ok(Self { conn })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        f(&self.conn)
    }

    /// Close the connection, surfacing any error from the final flush.
    pub fn close(self) -> Result<()> {
        self.conn
            .close()
            .map_err(|(_, e)| anyhow::anyhow!("closing database: {}", e))
    }
}
