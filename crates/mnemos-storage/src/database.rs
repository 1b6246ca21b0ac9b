// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and migrations.
//!
//! All statements run on tokio-rusqlite's single background thread, which
//! serializes writers. Do NOT open additional connections for writes.

use std::path::Path;

use mnemos_core::MnemosError;
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::migrations::run_migrations;

/// Map a tokio-rusqlite failure into a storage I/O error.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error) -> MnemosError {
    MnemosError::storage_io("sqlite operation failed", e)
}

/// An open, migrated SQLite database.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at `path`, apply PRAGMAs and migrations.
    ///
    /// Parent directories are created as needed.
    pub async fn open(path: &str, wal_mode: bool) -> Result<Self, MnemosError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                MnemosError::storage_io(format!("cannot create {}", parent.display()), e)
            })?;
        }

        let conn = Connection::open(path)
            .await
            .map_err(|e| MnemosError::storage_io(format!("cannot open {path}"), e))?;
        let db = Self { conn };
        db.initialize(wal_mode).await?;
        debug!(path, wal_mode, "memory database opened");
        Ok(db)
    }

    /// Open a private in-memory database. Contents vanish when dropped.
    pub async fn open_in_memory() -> Result<Self, MnemosError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| MnemosError::storage_io("cannot open in-memory database", e))?;
        let db = Self { conn };
        db.initialize(false).await?;
        Ok(db)
    }

    /// The underlying connection handle.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    async fn initialize(&self, wal_mode: bool) -> Result<(), MnemosError> {
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                if wal_mode {
                    conn.pragma_update(None, "journal_mode", "WAL")?;
                }
                conn.pragma_update(None, "synchronous", "NORMAL")?;
                conn.pragma_update(None, "foreign_keys", "ON")?;
                conn.pragma_update(None, "busy_timeout", 5000)?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        self.conn
            .call(|conn| Ok::<_, rusqlite::Error>(run_migrations(conn)))
            .await
            .map_err(map_tr_err)??;
        Ok(())
    }

    /// Checkpoint the WAL so the main database file is self-contained.
    pub async fn checkpoint(&self) -> Result<(), MnemosError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}
