// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-lifetime in-memory store.
//!
//! Records live in per-owner shards, each behind its own `RwLock`, so tenants
//! never contend on a shared lock. A global id index resolves `get`/`delete`
//! to the owning shard. A shard is dropped from the map as soon as it holds
//! no records; it is marked retired under its write lock first, and writers
//! that land on a retired shard fetch a fresh one.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};
use tracing::debug;

use mnemos_core::traits::storage::rank_hits;
use mnemos_core::types::clamp_unit;
use mnemos_core::vector::cosine_similarity;
use mnemos_core::{
    BatchInsert, MemoryRecord, MemoryStore, MnemosError, Scope, ScoredMemory, SimilarityQuery,
};

#[derive(Debug, Default)]
struct OwnerShard {
    records: HashMap<String, MemoryRecord>,
    retired: bool,
}

impl OwnerShard {
    /// Embedding width used by the shard's records, ignoring `except_id`.
    fn dimensions(&self, except_id: Option<&str>) -> Option<usize> {
        self.records
            .values()
            .find(|r| Some(r.id.as_str()) != except_id)
            .map(|r| r.embedding.len())
    }

    fn check_dimensions(
        &self,
        record: &MemoryRecord,
        except_id: Option<&str>,
    ) -> Result<(), MnemosError> {
        match self.dimensions(except_id) {
            Some(expected) if expected != record.embedding.len() => {
                Err(MnemosError::invalid_record(format!(
                    "memory `{}` has {}-dimensional embedding, owner expects {expected}",
                    record.id,
                    record.embedding.len()
                )))
            }
            _ => Ok(()),
        }
    }
}

fn validate(record: &mut MemoryRecord) -> Result<(), MnemosError> {
    if record.embedding.is_empty() {
        return Err(MnemosError::invalid_record(format!(
            "memory `{}` has no embedding",
            record.id
        )));
    }
    record.importance = clamp_unit(record.importance);
    Ok(())
}

/// A shard write guard plus the handle it was taken from.
struct LockedShard {
    shard: Arc<RwLock<OwnerShard>>,
    guard: OwnedRwLockWriteGuard<OwnerShard>,
}

/// In-memory [`MemoryStore`]. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct EphemeralMemoryStore {
    shards: DashMap<String, Arc<RwLock<OwnerShard>>>,
    /// memory id -> owner id
    index: DashMap<String, String>,
}

impl EphemeralMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn shard(&self, owner_id: &str) -> Arc<RwLock<OwnerShard>> {
        if let Some(shard) = self.shards.get(owner_id) {
            return shard.clone();
        }
        self.shards.entry(owner_id.to_string()).or_default().clone()
    }

    fn existing_shard(&self, owner_id: &str) -> Option<Arc<RwLock<OwnerShard>>> {
        self.shards.get(owner_id).map(|s| s.clone())
    }

    fn owner_of(&self, id: &str) -> Option<String> {
        self.index.get(id).map(|o| o.clone())
    }

    /// Write-lock the owner's live shard, creating it if needed.
    async fn lock_live(&self, owner_id: &str) -> LockedShard {
        loop {
            let shard = self.shard(owner_id);
            let guard = shard.clone().write_owned().await;
            if !guard.retired {
                return LockedShard { shard, guard };
            }
        }
    }

    /// Write-lock several shards in owner order so batch writers cannot deadlock.
    async fn lock_owners<'a>(
        &self,
        owners: impl IntoIterator<Item = &'a str>,
    ) -> BTreeMap<String, LockedShard> {
        let mut sorted: Vec<&str> = owners.into_iter().collect();
        sorted.sort_unstable();
        sorted.dedup();
        let mut locked = BTreeMap::new();
        for owner in sorted {
            locked.insert(owner.to_string(), self.lock_live(owner).await);
        }
        locked
    }

    /// Drops the owner's shard from the map once it holds no records.
    fn retire_if_empty(
        &self,
        owner_id: &str,
        shard: &Arc<RwLock<OwnerShard>>,
        guard: &mut OwnerShard,
    ) {
        if guard.records.is_empty() && !guard.retired {
            guard.retired = true;
            self.shards.remove_if(owner_id, |_, s| Arc::ptr_eq(s, shard));
        }
    }
}

#[async_trait]
impl MemoryStore for EphemeralMemoryStore {
    fn name(&self) -> &str {
        "ephemeral"
    }

    async fn insert(&self, mut record: MemoryRecord) -> Result<String, MnemosError> {
        validate(&mut record)?;
        let LockedShard { guard: mut shard, .. } = self.lock_live(&record.owner_id).await;
        if self.index.contains_key(&record.id) {
            return Err(MnemosError::invalid_record(format!(
                "memory `{}` already exists",
                record.id
            )));
        }
        shard.check_dimensions(&record, None)?;

        let id = record.id.clone();
        self.index.insert(id.clone(), record.owner_id.clone());
        shard.records.insert(id.clone(), record);
        debug!(memory_id = %id, "memory inserted");
        Ok(id)
    }

    async fn insert_batch(&self, records: Vec<MemoryRecord>) -> Result<BatchInsert, MnemosError> {
        let mut result = BatchInsert::default();
        let owners: Vec<String> = records.iter().map(|r| r.owner_id.clone()).collect();
        let mut guards = self.lock_owners(owners.iter().map(String::as_str)).await;

        for (index, mut record) in records.into_iter().enumerate() {
            if let Err(e) = validate(&mut record) {
                result.rejected.push((index, e));
                continue;
            }
            if self.index.contains_key(&record.id) {
                let e = MnemosError::invalid_record(format!(
                    "memory `{}` already exists",
                    record.id
                ));
                result.rejected.push((index, e));
                continue;
            }
            let Some(shard) = guards.get_mut(&record.owner_id).map(|l| &mut l.guard) else {
                result
                    .rejected
                    .push((index, MnemosError::Internal("owner shard not locked".into())));
                continue;
            };
            if let Err(e) = shard.check_dimensions(&record, None) {
                result.rejected.push((index, e));
                continue;
            }
            let id = record.id.clone();
            self.index.insert(id.clone(), record.owner_id.clone());
            shard.records.insert(id.clone(), record);
            result.inserted.push(id);
        }

        debug!(
            inserted = result.inserted.len(),
            rejected = result.rejected.len(),
            "memory batch committed"
        );
        Ok(result)
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryRecord>, MnemosError> {
        let Some(owner) = self.owner_of(id) else {
            return Ok(None);
        };
        let Some(shard) = self.existing_shard(&owner) else {
            return Ok(None);
        };
        let shard = shard.read().await;
        Ok(shard.records.get(id).cloned())
    }

    async fn update(&self, mut record: MemoryRecord) -> Result<(), MnemosError> {
        validate(&mut record)?;
        let owner = self
            .owner_of(&record.id)
            .ok_or_else(|| MnemosError::not_found(&record.id))?;
        let shard = self
            .existing_shard(&owner)
            .ok_or_else(|| MnemosError::not_found(&record.id))?;
        let mut shard = shard.write().await;
        shard.check_dimensions(&record, Some(record.id.as_str()))?;

        let stored = shard
            .records
            .get_mut(&record.id)
            .ok_or_else(|| MnemosError::not_found(&record.id))?;
        record.owner_id = stored.owner_id.clone();
        record.created_at = stored.created_at;
        *stored = record;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), MnemosError> {
        let Some(owner) = self.owner_of(id) else {
            return Ok(());
        };
        if let Some(shard) = self.existing_shard(&owner) {
            let mut guard = shard.write().await;
            guard.records.remove(id);
            self.index.remove(id);
            self.retire_if_empty(&owner, &shard, &mut guard);
        }
        Ok(())
    }

    async fn delete_many(&self, ids: &[String]) -> Result<usize, MnemosError> {
        let owned: Vec<(String, String)> = ids
            .iter()
            .filter_map(|id| self.owner_of(id).map(|owner| (id.clone(), owner)))
            .collect();
        let mut guards = self
            .lock_owners(owned.iter().map(|(_, owner)| owner.as_str()))
            .await;

        let mut removed = 0;
        for (id, owner) in &owned {
            if let Some(locked) = guards.get_mut(owner)
                && locked.guard.records.remove(id).is_some()
            {
                self.index.remove(id);
                removed += 1;
            }
        }
        for (owner, locked) in &mut guards {
            self.retire_if_empty(owner, &locked.shard, &mut locked.guard);
        }
        Ok(removed)
    }

    async fn delete_excess(
        &self,
        owner_id: &str,
        ids: &[String],
        keep: usize,
    ) -> Result<Vec<String>, MnemosError> {
        let Some(shard) = self.existing_shard(owner_id) else {
            return Ok(Vec::new());
        };
        let mut guard = shard.write().await;
        let excess = guard.records.len().saturating_sub(keep);
        let mut removed = Vec::with_capacity(excess);
        for id in ids {
            if removed.len() >= excess {
                break;
            }
            if guard.records.remove(id).is_some() {
                self.index.remove(id);
                removed.push(id.clone());
            }
        }
        self.retire_if_empty(owner_id, &shard, &mut guard);
        debug!(owner_id, excess, removed = removed.len(), "owner trimmed");
        Ok(removed)
    }

    async fn list_by_owner(
        &self,
        scope: &Scope,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryRecord>, MnemosError> {
        let Some(shard) = self.existing_shard(scope.owner_id()) else {
            return Ok(Vec::new());
        };
        let shard = shard.read().await;
        let mut records: Vec<MemoryRecord> = shard
            .records
            .values()
            .filter(|r| scope.contains(&r.owner_id, r.session_id.as_deref()))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    async fn count_by_owner(&self, owner_id: &str) -> Result<usize, MnemosError> {
        match self.existing_shard(owner_id) {
            Some(shard) => Ok(shard.read().await.records.len()),
            None => Ok(0),
        }
    }

    async fn search_similar(
        &self,
        query: &SimilarityQuery,
    ) -> Result<Vec<ScoredMemory>, MnemosError> {
        if query.vector.is_empty() || query.limit == 0 {
            return Ok(Vec::new());
        }
        let Some(shard) = self.existing_shard(&query.owner_id) else {
            return Ok(Vec::new());
        };
        let scope = query.scope();
        let min_importance = query.min_importance.unwrap_or(0.0);

        let shard = shard.read().await;
        let mut hits: Vec<ScoredMemory> = shard
            .records
            .values()
            .filter(|r| scope.contains(&r.owner_id, r.session_id.as_deref()))
            .filter(|r| r.importance >= min_importance)
            .filter(|r| r.embedding.len() == query.vector.len())
            .filter_map(|r| {
                let similarity = cosine_similarity(&query.vector, &r.embedding);
                (similarity >= query.min_similarity).then(|| ScoredMemory {
                    memory: r.clone(),
                    similarity,
                })
            })
            .collect();
        drop(shard);

        rank_hits(&mut hits);
        hits.truncate(query.limit);
        Ok(hits)
    }

    async fn clear(&self, scope: Option<&Scope>) -> Result<usize, MnemosError> {
        let targets: Vec<(String, Arc<RwLock<OwnerShard>>)> = match scope {
            Some(scope) => self
                .existing_shard(scope.owner_id())
                .map(|s| (scope.owner_id().to_string(), s))
                .into_iter()
                .collect(),
            None => self
                .shards
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
        };

        let mut removed = 0;
        for (owner, shard) in targets {
            let mut guard = shard.write().await;
            let doomed: Vec<String> = guard
                .records
                .values()
                .filter(|r| scope.is_none_or(|s| s.contains(&r.owner_id, r.session_id.as_deref())))
                .map(|r| r.id.clone())
                .collect();
            for id in doomed {
                guard.records.remove(&id);
                self.index.remove(&id);
                removed += 1;
            }
            self.retire_if_empty(&owner, &shard, &mut guard);
        }
        debug!(removed, scope = ?scope.map(ToString::to_string), "memories cleared");
        Ok(removed)
    }
}
