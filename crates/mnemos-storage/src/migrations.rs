// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded database migrations using refinery.
//!
//! SQL files under `migrations/` are compiled into the binary and applied
//! automatically when a [`Database`](crate::Database) is opened.

use mnemos_core::MnemosError;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Run all pending migrations against the given connection.
///
/// Refinery tracks applied migrations in its own `refinery_schema_history` table.
pub fn run_migrations(conn: &mut rusqlite::Connection) -> Result<(), MnemosError> {
    embedded::migrations::runner()
        .run(conn)
        .map_err(|e| MnemosError::storage_io("failed to apply migrations", e))?;
    Ok(())
}
