// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store wrapper that fails chosen operations on demand.

use std::collections::HashSet;
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use mnemos_core::{
    BatchInsert, MemoryRecord, MemoryStore, MnemosError, Scope, ScoredMemory, SimilarityQuery,
};

/// A [`MemoryStore`] operation that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Insert,
    InsertBatch,
    Get,
    Update,
    Delete,
    DeleteMany,
    DeleteExcess,
    List,
    Count,
    Search,
    Clear,
}

/// Delegates to an inner store, failing selected operations with an
/// `IoFailure` storage error.
pub struct FailingStore {
    inner: Arc<dyn MemoryStore>,
    failing: Mutex<HashSet<StoreOp>>,
    insert_markers: Mutex<Vec<String>>,
}

impl FailingStore {
    pub fn new(inner: Arc<dyn MemoryStore>) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashSet::new()),
            insert_markers: Mutex::new(Vec::new()),
        }
    }

    /// Every later call of `op` fails until [`recover`](Self::recover).
    pub fn fail(&self, op: StoreOp) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(op);
        }
    }

    pub fn recover(&self, op: StoreOp) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.remove(&op);
        }
    }

    /// Single inserts of a record whose content contains `marker` fail.
    pub fn fail_insert_containing(&self, marker: &str) {
        if let Ok(mut markers) = self.insert_markers.lock() {
            markers.push(marker.to_string());
        }
    }

    fn check(&self, op: StoreOp) -> Result<(), MnemosError> {
        let failing = self.failing.lock().is_ok_and(|f| f.contains(&op));
        if failing {
            return Err(injected(format!("{op:?}")));
        }
        Ok(())
    }

    fn check_insert(&self, record: &MemoryRecord) -> Result<(), MnemosError> {
        self.check(StoreOp::Insert)?;
        let marked = self.insert_markers.lock().is_ok_and(|markers| {
            markers
                .iter()
                .any(|m| record.content.contains(m.as_str()))
        });
        if marked {
            return Err(injected(format!("insert of `{}`", record.content)));
        }
        Ok(())
    }
}

fn injected(what: String) -> MnemosError {
    MnemosError::storage_io(
        format!("injected failure: {what}"),
        io::Error::other("store unavailable"),
    )
}

#[async_trait]
impl MemoryStore for FailingStore {
    fn name(&self) -> &str {
        "failing"
    }

    async fn insert(&self, record: MemoryRecord) -> Result<String, MnemosError> {
        self.check_insert(&record)?;
        self.inner.insert(record).await
    }

    async fn insert_batch(&self, records: Vec<MemoryRecord>) -> Result<BatchInsert, MnemosError> {
        self.check(StoreOp::InsertBatch)?;
        self.inner.insert_batch(records).await
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryRecord>, MnemosError> {
        self.check(StoreOp::Get)?;
        self.inner.get(id).await
    }

    async fn update(&self, record: MemoryRecord) -> Result<(), MnemosError> {
        self.check(StoreOp::Update)?;
        self.inner.update(record).await
    }

    async fn delete(&self, id: &str) -> Result<(), MnemosError> {
        self.check(StoreOp::Delete)?;
        self.inner.delete(id).await
    }

    async fn delete_many(&self, ids: &[String]) -> Result<usize, MnemosError> {
        self.check(StoreOp::DeleteMany)?;
        self.inner.delete_many(ids).await
    }

    async fn delete_excess(
        &self,
        owner_id: &str,
        ids: &[String],
        keep: usize,
    ) -> Result<Vec<String>, MnemosError> {
        self.check(StoreOp::DeleteExcess)?;
        self.inner.delete_excess(owner_id, ids, keep).await
    }

    async fn list_by_owner(
        &self,
        scope: &Scope,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryRecord>, MnemosError> {
        self.check(StoreOp::List)?;
        self.inner.list_by_owner(scope, limit).await
    }

    async fn count_by_owner(&self, owner_id: &str) -> Result<usize, MnemosError> {
        self.check(StoreOp::Count)?;
        self.inner.count_by_owner(owner_id).await
    }

    async fn search_similar(
        &self,
        query: &SimilarityQuery,
    ) -> Result<Vec<ScoredMemory>, MnemosError> {
        self.check(StoreOp::Search)?;
        self.inner.search_similar(query).await
    }

    async fn clear(&self, scope: Option<&Scope>) -> Result<usize, MnemosError> {
        self.check(StoreOp::Clear)?;
        self.inner.clear(scope).await
    }
}

#[cfg(test)]
mod tests {
    use mnemos_core::StorageErrorKind;
    use mnemos_storage::EphemeralMemoryStore;

    use super::*;

    #[tokio::test]
    async fn fails_only_selected_operations() {
        let store = FailingStore::new(Arc::new(EphemeralMemoryStore::new()));
        let scope = Scope::owner("u1");
        let id = store
            .insert(MemoryRecord::new(&scope, "likes tea", vec![1.0]))
            .await
            .unwrap();

        store.fail(StoreOp::Get);
        let err = store.get(&id).await.unwrap_err();
        assert_eq!(err.storage_kind(), Some(StorageErrorKind::IoFailure));
        assert_eq!(store.count_by_owner("u1").await.unwrap(), 1);

        store.recover(StoreOp::Get);
        assert!(store.get(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn marked_inserts_fail() {
        let store = FailingStore::new(Arc::new(EphemeralMemoryStore::new()));
        store.fail_insert_containing("secret");
        let scope = Scope::owner("u1");
        assert!(
            store
                .insert(MemoryRecord::new(&scope, "a secret fact", vec![1.0]))
                .await
                .is_err()
        );
        assert!(
            store
                .insert(MemoryRecord::new(&scope, "plain fact", vec![1.0]))
                .await
                .is_ok()
        );
    }
}
