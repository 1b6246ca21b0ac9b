// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed memory store with embedding BLOBs.
//!
//! Similarity is computed in Rust over the scope's rows; the owner/session
//! filter is part of every SQL statement so other tenants' rows are never read.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{OptionalExtension, Row, Transaction, params};
use tracing::debug;

use mnemos_core::traits::storage::rank_hits;
use mnemos_core::vector::{blob_to_vec, cosine_similarity, vec_to_blob};
use mnemos_core::{
    BatchInsert, MemoryRecord, MemoryStore, Metadata, MnemosError, Scope, ScoredMemory,
    SimilarityQuery,
};

use crate::database::{Database, map_tr_err};

const COLUMNS: &str = "id, owner_id, session_id, content, category, importance, embedding, \
                       metadata, created_at, updated_at";

/// Scope filter shared by listing, search and clear. `?1` is the owner,
/// `?2` the optional session.
const SCOPE_FILTER: &str = "owner_id = ?1 AND (?2 IS NULL OR session_id = ?2)";

/// Persistent memory store over a migrated [`Database`].
pub struct SqliteMemoryStore {
    db: Database,
}

/// A record converted into SQL column values outside the connection thread.
struct RowValues {
    id: String,
    owner_id: String,
    session_id: Option<String>,
    content: String,
    category: String,
    importance: f64,
    embedding: Vec<u8>,
    dimensions: i64,
    metadata: String,
    created_at: String,
    updated_at: String,
}

impl RowValues {
    fn from_record(record: &MemoryRecord) -> Result<Self, MnemosError> {
        if record.embedding.is_empty() {
            return Err(MnemosError::invalid_record(format!(
                "memory `{}` has no embedding",
                record.id
            )));
        }
        let metadata = serde_json::to_string(&record.metadata).map_err(|e| {
            MnemosError::invalid_record(format!("memory `{}` metadata: {e}", record.id))
        })?;
        Ok(Self {
            id: record.id.clone(),
            owner_id: record.owner_id.clone(),
            session_id: record.session_id.clone(),
            content: record.content.clone(),
            category: record.category.clone(),
            importance: mnemos_core::types::clamp_unit(record.importance),
            embedding: vec_to_blob(&record.embedding),
            dimensions: record.embedding.len() as i64,
            metadata,
            created_at: format_ts(&record.created_at),
            updated_at: format_ts(&record.updated_at),
        })
    }
}

/// Why a write inside the connection thread did not happen.
enum Refusal {
    NotFound,
    DuplicateId,
    Dimensions { expected: i64, actual: i64 },
}

impl Refusal {
    fn into_error(self, id: &str) -> MnemosError {
        match self {
            Refusal::NotFound => MnemosError::not_found(id),
            Refusal::DuplicateId => {
                MnemosError::invalid_record(format!("memory `{id}` already exists"))
            }
            Refusal::Dimensions { expected, actual } => MnemosError::invalid_record(format!(
                "memory `{id}` has {actual}-dimensional embedding, owner expects {expected}"
            )),
        }
    }
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<MemoryRecord> {
    let blob: Vec<u8> = row.get(6)?;
    let metadata: String = row.get(7)?;
    let metadata: Metadata = serde_json::from_str(&metadata).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(MemoryRecord {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        session_id: row.get(2)?,
        content: row.get(3)?,
        category: row.get(4)?,
        importance: row.get(5)?,
        embedding: blob_to_vec(&blob),
        metadata,
        created_at: parse_ts(8, row.get(8)?)?,
        updated_at: parse_ts(9, row.get(9)?)?,
    })
}

/// Embedding width already used by the owner, ignoring `except_id`.
fn owner_dimensions(
    tx: &Transaction<'_>,
    owner_id: &str,
    except_id: Option<&str>,
) -> rusqlite::Result<Option<i64>> {
    tx.query_row(
        "SELECT dimensions FROM memories WHERE owner_id = ?1 AND (?2 IS NULL OR id != ?2) LIMIT 1",
        params![owner_id, except_id],
        |row| row.get(0),
    )
    .optional()
}

fn id_exists(tx: &Transaction<'_>, id: &str) -> rusqlite::Result<bool> {
    tx.query_row("SELECT 1 FROM memories WHERE id = ?1", params![id], |_| Ok(()))
        .optional()
        .map(|found| found.is_some())
}

fn insert_row(tx: &Transaction<'_>, v: &RowValues) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT INTO memories (id, owner_id, session_id, content, category, importance, \
         embedding, dimensions, metadata, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            v.id,
            v.owner_id,
            v.session_id,
            v.content,
            v.category,
            v.importance,
            v.embedding,
            v.dimensions,
            v.metadata,
            v.created_at,
            v.updated_at,
        ],
    )?;
    Ok(())
}

impl SqliteMemoryStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open the database at `path` and wrap it in a store.
    pub async fn open(path: &str, wal_mode: bool) -> Result<Self, MnemosError> {
        Ok(Self::new(Database::open(path, wal_mode).await?))
    }

    /// Store over a private in-memory database, for tests and scratch use.
    pub async fn open_in_memory() -> Result<Self, MnemosError> {
        Ok(Self::new(Database::open_in_memory().await?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn scope_rows(
        &self,
        scope: &Scope,
        min_importance: Option<f64>,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryRecord>, MnemosError> {
        let owner_id = scope.owner_id().to_string();
        let session_id = scope.session_id().map(str::to_string);
        let min_importance = min_importance.unwrap_or(0.0);
        let limit = limit.map_or(-1, |l| l as i64);
        self.db
            .connection()
            .call(move |conn| -> Result<Vec<MemoryRecord>, rusqlite::Error> {
                let sql = format!(
                    "SELECT {COLUMNS} FROM memories WHERE {SCOPE_FILTER} AND importance >= ?3 \
                     ORDER BY created_at DESC, id ASC LIMIT ?4"
                );
                let mut stmt = conn.prepare(&sql)?;
                let records = stmt
                    .query_map(
                        params![owner_id, session_id, min_importance, limit],
                        row_to_record,
                    )?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(records)
            })
            .await
            .map_err(map_tr_err)
    }
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn insert(&self, record: MemoryRecord) -> Result<String, MnemosError> {
        let values = RowValues::from_record(&record)?;
        let outcome = self
            .db
            .connection()
            .call(move |conn| -> Result<Option<Refusal>, rusqlite::Error> {
                let tx = conn.transaction()?;
                if id_exists(&tx, &values.id)? {
                    return Ok(Some(Refusal::DuplicateId));
                }
                if let Some(expected) = owner_dimensions(&tx, &values.owner_id, None)?
                    && expected != values.dimensions
                {
                    return Ok(Some(Refusal::Dimensions {
                        expected,
                        actual: values.dimensions,
                    }));
                }
                insert_row(&tx, &values)?;
                tx.commit()?;
                Ok(None)
            })
            .await
            .map_err(map_tr_err)?;

        match outcome {
            Some(refusal) => Err(refusal.into_error(&record.id)),
            None => {
                debug!(memory_id = %record.id, owner_id = %record.owner_id, "memory inserted");
                Ok(record.id)
            }
        }
    }

    async fn insert_batch(&self, records: Vec<MemoryRecord>) -> Result<BatchInsert, MnemosError> {
        let mut result = BatchInsert::default();
        let mut staged = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            match RowValues::from_record(record) {
                Ok(values) => staged.push((index, values)),
                Err(e) => result.rejected.push((index, e)),
            }
        }
        if staged.is_empty() {
            return Ok(result);
        }

        let (inserted, refused) = self
            .db
            .connection()
            .call(move |conn| -> Result<_, rusqlite::Error> {
                let tx = conn.transaction()?;
                let mut dims: HashMap<String, Option<i64>> = HashMap::new();
                let mut inserted = Vec::new();
                let mut refused = Vec::new();
                for (index, values) in staged {
                    if id_exists(&tx, &values.id)? {
                        refused.push((index, values.id, Refusal::DuplicateId));
                        continue;
                    }
                    let expected = match dims.get(&values.owner_id) {
                        Some(d) => *d,
                        None => {
                            let d = owner_dimensions(&tx, &values.owner_id, None)?;
                            dims.insert(values.owner_id.clone(), d);
                            d
                        }
                    };
                    if let Some(expected) = expected
                        && expected != values.dimensions
                    {
                        let actual = values.dimensions;
                        refused.push((index, values.id, Refusal::Dimensions { expected, actual }));
                        continue;
                    }
                    insert_row(&tx, &values)?;
                    dims.insert(values.owner_id.clone(), Some(values.dimensions));
                    inserted.push(values.id);
                }
                tx.commit()?;
                Ok((inserted, refused))
            })
            .await
            .map_err(map_tr_err)?;

        result.inserted = inserted;
        result.rejected.extend(
            refused
                .into_iter()
                .map(|(index, id, refusal)| (index, refusal.into_error(&id))),
        );
        result.rejected.sort_by_key(|(index, _)| *index);
        debug!(
            inserted = result.inserted.len(),
            rejected = result.rejected.len(),
            "memory batch committed"
        );
        Ok(result)
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryRecord>, MnemosError> {
        let id = id.to_string();
        self.db
            .connection()
            .call(move |conn| -> Result<Option<MemoryRecord>, rusqlite::Error> {
                let sql = format!("SELECT {COLUMNS} FROM memories WHERE id = ?1");
                conn.query_row(&sql, params![id], row_to_record).optional()
            })
            .await
            .map_err(map_tr_err)
    }

    async fn update(&self, record: MemoryRecord) -> Result<(), MnemosError> {
        let values = RowValues::from_record(&record)?;
        let outcome = self
            .db
            .connection()
            .call(move |conn| -> Result<Option<Refusal>, rusqlite::Error> {
                let tx = conn.transaction()?;
                let owner: Option<String> = tx
                    .query_row(
                        "SELECT owner_id FROM memories WHERE id = ?1",
                        params![values.id],
                        |row| row.get(0),
                    )
                    .optional()?;
                let Some(owner) = owner else {
                    return Ok(Some(Refusal::NotFound));
                };
                if let Some(expected) = owner_dimensions(&tx, &owner, Some(values.id.as_str()))?
                    && expected != values.dimensions
                {
                    return Ok(Some(Refusal::Dimensions {
                        expected,
                        actual: values.dimensions,
                    }));
                }
                tx.execute(
                    "UPDATE memories SET session_id = ?2, content = ?3, category = ?4, \
                     importance = ?5, embedding = ?6, dimensions = ?7, metadata = ?8, \
                     updated_at = ?9 WHERE id = ?1",
                    params![
                        values.id,
                        values.session_id,
                        values.content,
                        values.category,
                        values.importance,
                        values.embedding,
                        values.dimensions,
                        values.metadata,
                        values.updated_at,
                    ],
                )?;
                tx.commit()?;
                Ok(None)
            })
            .await
            .map_err(map_tr_err)?;

        match outcome {
            Some(refusal) => Err(refusal.into_error(&record.id)),
            None => Ok(()),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), MnemosError> {
        let id = id.to_string();
        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute("DELETE FROM memories WHERE id = ?1", params![id])?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn delete_many(&self, ids: &[String]) -> Result<usize, MnemosError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids = ids.to_vec();
        self.db
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                let tx = conn.transaction()?;
                let mut removed = 0;
                {
                    let mut stmt = tx.prepare("DELETE FROM memories WHERE id = ?1")?;
                    for id in &ids {
                        removed += stmt.execute(params![id])?;
                    }
                }
                tx.commit()?;
                Ok(removed)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn delete_excess(
        &self,
        owner_id: &str,
        ids: &[String],
        keep: usize,
    ) -> Result<Vec<String>, MnemosError> {
        let owner_id = owner_id.to_string();
        let ids = ids.to_vec();
        let removed = self
            .db
            .connection()
            .call(move |conn| -> Result<Vec<String>, rusqlite::Error> {
                let tx = conn.transaction()?;
                let count: usize = tx.query_row(
                    "SELECT COUNT(*) FROM memories WHERE owner_id = ?1",
                    params![owner_id],
                    |row| row.get(0),
                )?;
                let excess = count.saturating_sub(keep);
                let mut removed = Vec::with_capacity(excess);
                {
                    let mut stmt =
                        tx.prepare("DELETE FROM memories WHERE id = ?1 AND owner_id = ?2")?;
                    for id in ids {
                        if removed.len() >= excess {
                            break;
                        }
                        if stmt.execute(params![id, owner_id])? > 0 {
                            removed.push(id);
                        }
                    }
                }
                tx.commit()?;
                Ok(removed)
            })
            .await
            .map_err(map_tr_err)?;
        debug!(removed = removed.len(), "owner trimmed");
        Ok(removed)
    }

    async fn list_by_owner(
        &self,
        scope: &Scope,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryRecord>, MnemosError> {
        self.scope_rows(scope, None, limit).await
    }

    async fn count_by_owner(&self, owner_id: &str) -> Result<usize, MnemosError> {
        let owner_id = owner_id.to_string();
        self.db
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.query_row(
                    "SELECT COUNT(*) FROM memories WHERE owner_id = ?1",
                    params![owner_id],
                    |row| row.get(0),
                )
            })
            .await
            .map_err(map_tr_err)
    }

    async fn search_similar(
        &self,
        query: &SimilarityQuery,
    ) -> Result<Vec<ScoredMemory>, MnemosError> {
        if query.vector.is_empty() || query.limit == 0 {
            return Ok(Vec::new());
        }

        let candidates = self
            .scope_rows(&query.scope(), query.min_importance, None)
            .await?;
        let mut hits: Vec<ScoredMemory> = candidates
            .into_iter()
            .filter(|record| record.embedding.len() == query.vector.len())
            .filter_map(|memory| {
                let similarity = cosine_similarity(&query.vector, &memory.embedding);
                (similarity >= query.min_similarity).then_some(ScoredMemory { memory, similarity })
            })
            .collect();

        rank_hits(&mut hits);
        hits.truncate(query.limit);
        Ok(hits)
    }

    async fn clear(&self, scope: Option<&Scope>) -> Result<usize, MnemosError> {
        let filter = scope.map(|s| (s.owner_id().to_string(), s.session_id().map(str::to_string)));
        self.db
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                match filter {
                    None => conn.execute("DELETE FROM memories", []),
                    Some((owner_id, session_id)) => conn.execute(
                        &format!("DELETE FROM memories WHERE {SCOPE_FILTER}"),
                        params![owner_id, session_id],
                    ),
                }
            })
            .await
            .map_err(map_tr_err)
    }
}
