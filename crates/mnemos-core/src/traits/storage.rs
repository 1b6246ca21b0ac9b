// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage trait implemented by the ephemeral and persistent memory backends.

use async_trait::async_trait;

use crate::error::MnemosError;
use crate::types::{BatchInsert, MemoryRecord, Scope, ScoredMemory, SimilarityQuery};

/// Key-value plus vector store for memory records.
///
/// Every write is atomic at single-record granularity. Search and listing
/// never return records outside the requested owner.
#[async_trait]
pub trait MemoryStore: Send + Sync + 'static {
    /// Backend name, used in logs.
    fn name(&self) -> &str;

    /// Inserts a record that already carries its embedding.
    ///
    /// Fails with `InvalidRecord` if the embedding is empty or its length
    /// differs from the owner's existing records.
    async fn insert(&self, record: MemoryRecord) -> Result<String, MnemosError>;

    /// Inserts every valid record of the batch in one atomic step.
    async fn insert_batch(&self, records: Vec<MemoryRecord>) -> Result<BatchInsert, MnemosError>;

    /// Returns `None` when the id is absent.
    async fn get(&self, id: &str) -> Result<Option<MemoryRecord>, MnemosError>;

    /// Full replace by id. `created_at` and the owner are preserved from the
    /// stored record; fails with `NotFound` if the id does not exist.
    async fn update(&self, record: MemoryRecord) -> Result<(), MnemosError>;

    /// Idempotent delete.
    async fn delete(&self, id: &str) -> Result<(), MnemosError>;

    /// Deletes all given ids atomically, returning how many existed.
    async fn delete_many(&self, ids: &[String]) -> Result<usize, MnemosError>;

    /// Trims the owner down to at most `keep` records in one atomic step.
    ///
    /// The owner's count is read inside the same step, so concurrent deletes
    /// shrink the excess instead of adding to it. Ids are removed in the given
    /// order until the excess is gone; ids that are absent or belong to
    /// another owner are skipped. Returns the ids actually removed.
    async fn delete_excess(
        &self,
        owner_id: &str,
        ids: &[String],
        keep: usize,
    ) -> Result<Vec<String>, MnemosError>;

    /// Records visible in `scope`, newest first.
    async fn list_by_owner(
        &self,
        scope: &Scope,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryRecord>, MnemosError>;

    /// Number of records the owner holds across all sessions.
    async fn count_by_owner(&self, owner_id: &str) -> Result<usize, MnemosError>;

    /// Nearest neighbours of `query.vector` within the query's scope, by
    /// descending similarity, filtered and truncated.
    async fn search_similar(&self, query: &SimilarityQuery)
    -> Result<Vec<ScoredMemory>, MnemosError>;

    /// Scoped wipe; `None` wipes everything. Returns the number removed.
    async fn clear(&self, scope: Option<&Scope>) -> Result<usize, MnemosError>;
}

/// Orders search hits by similarity descending, newest first on ties.
pub fn rank_hits(hits: &mut [ScoredMemory]) {
    hits.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.memory.created_at.cmp(&a.memory.created_at))
            .then_with(|| a.memory.id.cmp(&b.memory.id))
    });
}
