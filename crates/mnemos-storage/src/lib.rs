// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory record stores for Mnemos.
//!
//! Two interchangeable [`MemoryStore`] backends: [`EphemeralMemoryStore`]
//! (per-owner locked maps, process lifetime) and [`SqliteMemoryStore`]
//! (WAL-mode SQLite with embedded migrations and a single-writer connection).

pub mod database;
pub mod ephemeral;
pub mod migrations;
pub mod sqlite;

use std::sync::Arc;

use mnemos_config::{StorageBackend, StorageConfig};
use mnemos_core::{MemoryStore, MnemosError};
use tracing::info;

pub use database::Database;
pub use ephemeral::EphemeralMemoryStore;
pub use sqlite::SqliteMemoryStore;

/// Build the backend selected by `[storage]`.
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn MemoryStore>, MnemosError> {
    let store: Arc<dyn MemoryStore> = match config.backend {
        StorageBackend::Ephemeral => Arc::new(EphemeralMemoryStore::new()),
        StorageBackend::Sqlite => Arc::new(
            SqliteMemoryStore::open(&config.database_path, config.wal_mode).await?,
        ),
    };
    info!(backend = store.name(), "memory store ready");
    Ok(store)
}
