// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end memory lifecycle tests over the ephemeral store.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;

use mnemos_config::DomainConfig;
use mnemos_core::{
    BatchInsert, DEFAULT_CATEGORY, MemoryContext, MemoryRecord, MemoryStore, MnemosError, Scope,
    ScoredMemory, SimilarityQuery, StorageErrorKind,
};
use mnemos_memory::summarizer::{SUMMARIZED_FROM_KEY, SUMMARY_CATEGORY};
use mnemos_memory::{Candidate, MemoryManager, MemoryUpdate, ToolRegistry};
use mnemos_storage::EphemeralMemoryStore;
use mnemos_test_utils::{FailingStore, MockEmbedder, MockGenerator, StoreOp};

struct Harness {
    manager: Arc<MemoryManager>,
    store: Arc<EphemeralMemoryStore>,
    embedder: Arc<MockEmbedder>,
}

fn harness(domain: DomainConfig) -> Harness {
    harness_with(domain, MockEmbedder::new(32), None, 0)
}

fn harness_with(
    domain: DomainConfig,
    embedder: MockEmbedder,
    generator: Option<Arc<MockGenerator>>,
    max_retries: u32,
) -> Harness {
    let store = Arc::new(EphemeralMemoryStore::new());
    let embedder = Arc::new(embedder);
    let mut builder = MemoryManager::builder()
        .store(store.clone())
        .embedder(embedder.clone())
        .domain(domain)
        .max_retries(max_retries);
    if let Some(generator) = generator {
        builder = builder.generator(generator);
    }
    Harness {
        manager: Arc::new(builder.build().unwrap()),
        store,
        embedder,
    }
}

fn manager_over(
    store: Arc<dyn MemoryStore>,
    domain: DomainConfig,
    generator: Option<Arc<MockGenerator>>,
) -> MemoryManager {
    let mut builder = MemoryManager::builder()
        .store(store)
        .embedder(Arc::new(MockEmbedder::new(32)))
        .domain(domain)
        .max_retries(0);
    if let Some(generator) = generator {
        builder = builder.generator(generator);
    }
    builder.build().unwrap()
}

fn owner(id: &str) -> MemoryContext {
    MemoryContext::new(Scope::owner(id))
}

fn session(owner_id: &str, session_id: &str) -> MemoryContext {
    MemoryContext::new(Scope::session(owner_id, session_id))
}

fn permissive() -> DomainConfig {
    DomainConfig::builder()
        .min_importance_threshold(0.0)
        .build()
        .unwrap()
}

#[tokio::test]
async fn admission_keeps_highest_importance_within_cap() {
    let domain = DomainConfig::builder()
        .min_importance_threshold(0.5)
        .max_memories_per_interaction(2)
        .build()
        .unwrap();
    let h = harness(domain);
    let ctx = owner("alice");

    let summary = h
        .manager
        .process_interaction(
            [
                Candidate::new("likes dark mode").with_importance(0.8),
                Candidate::new("said hello").with_importance(0.1),
                Candidate::new("prefers concise answers").with_importance(0.6),
            ],
            &ctx,
        )
        .await;

    assert_eq!(summary.admitted_count(), 2);
    assert_eq!(summary.below_threshold, 1);
    assert_eq!(summary.over_cap, 0);
    assert!(summary.is_complete());

    let stored = h.manager.list_memories(&ctx, None).await.memories;
    let mut contents: Vec<&str> = stored.iter().map(|r| r.content.as_str()).collect();
    contents.sort();
    assert_eq!(contents, vec!["likes dark mode", "prefers concise answers"]);
}

#[tokio::test]
async fn cap_drops_lowest_importance_not_last() {
    let domain = DomainConfig::builder()
        .min_importance_threshold(0.0)
        .max_memories_per_interaction(2)
        .build()
        .unwrap();
    let h = harness(domain);
    let ctx = owner("alice");

    let summary = h
        .manager
        .process_interaction(
            [
                Candidate::new("first low fact").with_importance(0.2),
                Candidate::new("second high fact").with_importance(0.9),
                Candidate::new("third mid fact").with_importance(0.5),
            ],
            &ctx,
        )
        .await;

    assert_eq!(summary.admitted_count(), 2);
    assert_eq!(summary.over_cap, 1);
    let stored = h.manager.list_memories(&ctx, None).await.memories;
    assert!(stored.iter().all(|r| r.content != "first low fact"));
}

#[tokio::test]
async fn pruning_removes_lowest_importance() {
    let domain = DomainConfig::builder()
        .min_importance_threshold(0.0)
        .max_memories_per_owner(2)
        .build()
        .unwrap();
    let h = harness(domain);
    let ctx = owner("alice");

    let summary = h
        .manager
        .process_interaction(
            [
                Candidate::new("lives in Lisbon").with_importance(0.9),
                Candidate::new("had soup today").with_importance(0.3),
                Candidate::new("plays the cello").with_importance(0.6),
            ],
            &ctx,
        )
        .await;

    // The record pruned by this same call is no longer reported as admitted.
    assert_eq!(summary.admitted_count(), 2);
    assert_eq!(summary.pruned, 1);
    assert_eq!(h.store.count_by_owner("alice").await.unwrap(), 2);
    for id in &summary.admitted {
        assert!(h.store.get(id).await.unwrap().is_some());
    }

    let mut importances: Vec<f64> = h
        .manager
        .list_memories(&ctx, None)
        .await
        .memories
        .iter()
        .map(|r| r.importance)
        .collect();
    importances.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_eq!(importances, vec![0.6, 0.9]);
}

#[tokio::test]
async fn retrieve_ranks_relevant_memory_first() {
    let embedder = MockEmbedder::new(8)
        .pin("likes dark mode", &[1.0, 0.0, 0.0])
        .pin("owns a bicycle", &[0.0, 1.0, 0.0])
        .pin("which theme should the editor use", &[0.9, 0.2, 0.0]);
    let domain = DomainConfig::builder()
        .min_importance_threshold(0.0)
        .min_similarity(0.0)
        .build()
        .unwrap();
    let h = harness_with(domain, embedder, None, 0);
    let ctx = owner("alice");
    h.manager
        .process_interaction(["likes dark mode", "owns a bicycle"], &ctx)
        .await;

    let retrieval = h
        .manager
        .retrieve("which theme should the editor use", &ctx, 5)
        .await;
    assert!(!retrieval.is_degraded());
    assert_eq!(retrieval.memories.len(), 2);
    assert_eq!(retrieval.memories[0].memory.content, "likes dark mode");
    assert!(retrieval.memories[0].similarity > retrieval.memories[1].similarity);

    let top = h
        .manager
        .retrieve("which theme should the editor use", &ctx, 1)
        .await;
    assert_eq!(top.memories.len(), 1);
    assert!(top.to_prompt_block().contains("- likes dark mode"));
}

#[tokio::test]
async fn retrieve_filters_below_min_similarity() {
    let embedder = MockEmbedder::new(8)
        .pin("likes dark mode", &[1.0, 0.0, 0.0])
        .pin("owns a bicycle", &[0.0, 1.0, 0.0])
        .pin("dark theme", &[1.0, 0.0, 0.0]);
    let h = harness_with(permissive(), embedder, None, 0);
    let ctx = owner("alice");
    h.manager
        .process_interaction(["likes dark mode", "owns a bicycle"], &ctx)
        .await;

    // Orthogonal vectors score exactly 0.5, under the 0.55 default floor.
    let retrieval = h.manager.retrieve("dark theme", &ctx, 5).await;
    assert_eq!(retrieval.memories.len(), 1);
    assert_eq!(retrieval.memories[0].memory.content, "likes dark mode");
}

#[tokio::test]
async fn blank_query_and_zero_limit_return_nothing() {
    let h = harness(permissive());
    let ctx = owner("alice");
    h.manager.add_memory("likes dark mode", &ctx).await.unwrap();
    let calls = h.embedder.calls();

    assert!(h.manager.retrieve("   ", &ctx, 5).await.is_empty());
    assert!(h.manager.retrieve("likes dark mode", &ctx, 0).await.is_empty());
    assert_eq!(h.embedder.calls(), calls);
}

#[tokio::test]
async fn owners_are_isolated() {
    let h = harness(permissive());
    let alice = owner("alice");
    let bob = owner("bob");

    let id = h.manager.add_memory("likes dark mode", &alice).await.unwrap();

    assert!(h.manager.retrieve("likes dark mode", &bob, 5).await.is_empty());
    assert!(h.manager.list_memories(&bob, None).await.memories.is_empty());
    assert!(h.manager.get_memory(&id, &bob).await.unwrap().is_none());

    let err = h
        .manager
        .update_memory(&id, MemoryUpdate::content("hijacked"), &bob)
        .await
        .unwrap_err();
    assert_eq!(err.storage_kind(), Some(StorageErrorKind::NotFound));

    assert!(!h.manager.delete_memory(&id, &bob).await.unwrap());
    assert!(h.manager.get_memory(&id, &alice).await.unwrap().is_some());
}

#[tokio::test]
async fn session_scope_limits_reads() {
    let h = harness(permissive());
    let s1 = session("alice", "s1");
    let s2 = session("alice", "s2");
    let global = owner("alice");

    h.manager.add_memory("likes dark mode", &s1).await.unwrap();

    assert!(h.manager.retrieve("likes dark mode", &s2, 5).await.is_empty());
    assert_eq!(h.manager.retrieve("likes dark mode", &s1, 5).await.memories.len(), 1);
    let seen = h.manager.retrieve("likes dark mode", &global, 5).await;
    assert_eq!(seen.memories.len(), 1);
    assert_eq!(seen.memories[0].memory.session_id.as_deref(), Some("s1"));
}

#[tokio::test]
async fn retrieval_degrades_on_embedding_failure() {
    let h = harness_with(
        permissive(),
        MockEmbedder::new(16).fail_on("broken", false),
        None,
        2,
    );
    let retrieval = h.manager.retrieve("broken query", &owner("alice"), 5).await;
    assert!(retrieval.is_empty());
    assert!(matches!(retrieval.error, Some(MnemosError::Embedding { .. })));
}

#[tokio::test]
async fn retryable_failures_are_retried() {
    let h = harness_with(permissive(), MockEmbedder::new(16), None, 1);
    let ctx = owner("alice");
    h.manager.add_memory("likes dark mode", &ctx).await.unwrap();

    h.embedder.fail_next(1);
    let retrieval = h.manager.retrieve("likes dark mode", &ctx, 5).await;
    assert!(!retrieval.is_degraded());
    assert_eq!(retrieval.memories.len(), 1);
}

#[tokio::test]
async fn retries_are_bounded() {
    let h = harness_with(permissive(), MockEmbedder::new(16), None, 0);
    h.embedder.fail_next(1);
    let retrieval = h.manager.retrieve("anything", &owner("alice"), 5).await;
    assert!(retrieval.is_degraded());
}

#[tokio::test]
async fn cancelled_context_fails_without_retry() {
    let h = harness_with(permissive(), MockEmbedder::new(16), None, 3);
    let ctx = owner("alice");
    ctx.cancel.cancel();

    let summary = h.manager.process_interaction(["likes dark mode"], &ctx).await;
    assert_eq!(summary.admitted_count(), 0);
    assert_eq!(summary.failed_count(), 1);
    assert!(!summary.failed[0].error.is_retryable());
}

#[tokio::test]
async fn blank_candidates_are_rejected() {
    let h = harness(permissive());
    let summary = h
        .manager
        .process_interaction(["", "   ", "likes dark mode"], &owner("alice"))
        .await;
    assert_eq!(summary.blank, 2);
    assert_eq!(summary.admitted_count(), 1);
}

#[tokio::test]
async fn duplicates_are_skipped() {
    let h = harness(permissive());
    let ctx = owner("alice");
    h.manager.add_memory("likes dark mode", &ctx).await.unwrap();

    let summary = h
        .manager
        .process_interaction(["likes dark mode", "owns a bicycle", "owns a bicycle"], &ctx)
        .await;
    assert_eq!(summary.duplicates, 2);
    assert_eq!(summary.admitted_count(), 1);
    assert_eq!(h.store.count_by_owner("alice").await.unwrap(), 2);
}

#[tokio::test]
async fn disallowed_category_falls_back_on_automatic_path() {
    let domain = DomainConfig::builder()
        .min_importance_threshold(0.0)
        .categories(["preference"])
        .build()
        .unwrap();
    let h = harness(domain);
    let ctx = owner("alice");

    h.manager
        .process_interaction(
            [
                Candidate::new("likes dark mode").with_category("preference"),
                Candidate::new("owns a bicycle").with_category("possessions"),
            ],
            &ctx,
        )
        .await;

    let stored = h.manager.list_memories(&ctx, None).await.memories;
    let bicycle = stored.iter().find(|r| r.content == "owns a bicycle").unwrap();
    assert_eq!(bicycle.category, "uncategorized");
    let mode = stored.iter().find(|r| r.content == "likes dark mode").unwrap();
    assert_eq!(mode.category, "preference");
}

#[tokio::test]
async fn manual_add_bypasses_threshold_but_checks_category() {
    let domain = DomainConfig::builder()
        .min_importance_threshold(0.95)
        .categories(["preference"])
        .build()
        .unwrap();
    let h = harness(domain);
    let ctx = owner("alice");

    let id = h.manager.add_memory("ok", &ctx).await.unwrap();
    assert!(h.manager.get_memory(&id, &ctx).await.unwrap().is_some());

    let err = h
        .manager
        .add_memory(Candidate::new("owns a bicycle").with_category("possessions"), &ctx)
        .await
        .unwrap_err();
    assert_eq!(err.storage_kind(), Some(StorageErrorKind::InvalidRecord));

    let err = h.manager.add_memory("  ", &ctx).await.unwrap_err();
    assert_eq!(err.storage_kind(), Some(StorageErrorKind::InvalidRecord));
}

#[tokio::test]
async fn update_reembeds_and_keeps_identity() {
    let h = harness(permissive());
    let ctx = owner("alice");
    let id = h.manager.add_memory("likes tea", &ctx).await.unwrap();
    let before = h.manager.get_memory(&id, &ctx).await.unwrap().unwrap();

    let updated = h
        .manager
        .update_memory(&id, MemoryUpdate::content("likes coffee").with_importance(2.0), &ctx)
        .await
        .unwrap();

    assert_eq!(updated.id, id);
    assert_eq!(updated.content, "likes coffee");
    assert_eq!(updated.embedding, h.embedder.vector_for("likes coffee"));
    assert_eq!(updated.importance, 1.0);
    assert_eq!(updated.created_at, before.created_at);
    assert!(updated.updated_at >= before.updated_at);

    let stored = h.manager.get_memory(&id, &ctx).await.unwrap().unwrap();
    assert_eq!(stored.content, "likes coffee");
}

#[tokio::test]
async fn update_unknown_id_is_not_found() {
    let h = harness(permissive());
    let err = h
        .manager
        .update_memory("missing", MemoryUpdate::content("x"), &owner("alice"))
        .await
        .unwrap_err();
    assert_eq!(err.storage_kind(), Some(StorageErrorKind::NotFound));
}

#[tokio::test]
async fn update_trims_and_checks_category() {
    let domain = DomainConfig::builder()
        .min_importance_threshold(0.0)
        .categories(["preference"])
        .build()
        .unwrap();
    let h = harness(domain);
    let ctx = owner("alice");
    let id = h.manager.add_memory("likes dark mode", &ctx).await.unwrap();

    let updated = h
        .manager
        .update_memory(&id, MemoryUpdate::default().with_category("  preference "), &ctx)
        .await
        .unwrap();
    assert_eq!(updated.category, "preference");

    let updated = h
        .manager
        .update_memory(&id, MemoryUpdate::default().with_category("   "), &ctx)
        .await
        .unwrap();
    assert_eq!(updated.category, DEFAULT_CATEGORY);

    let err = h
        .manager
        .update_memory(&id, MemoryUpdate::default().with_category(" possessions "), &ctx)
        .await
        .unwrap_err();
    assert_eq!(err.storage_kind(), Some(StorageErrorKind::InvalidRecord));
    let stored = h.manager.get_memory(&id, &ctx).await.unwrap().unwrap();
    assert_eq!(stored.category, DEFAULT_CATEGORY);
}

#[tokio::test]
async fn lowered_importance_hides_memory_from_retrieval() {
    let domain = DomainConfig::builder()
        .min_importance_threshold(0.5)
        .build()
        .unwrap();
    let h = harness(domain);
    let ctx = owner("alice");
    let id = h
        .manager
        .add_memory(Candidate::new("likes dark mode").with_importance(0.9), &ctx)
        .await
        .unwrap();
    assert_eq!(h.manager.retrieve("likes dark mode", &ctx, 5).await.memories.len(), 1);

    h.manager
        .update_memory(&id, MemoryUpdate::default().with_importance(0.1), &ctx)
        .await
        .unwrap();

    let retrieval = h.manager.retrieve("likes dark mode", &ctx, 5).await;
    assert!(retrieval.is_empty());
    assert!(!retrieval.is_degraded());
    // Still stored, only hidden from reads.
    assert!(h.manager.get_memory(&id, &ctx).await.unwrap().is_some());
}

#[tokio::test]
async fn delete_is_idempotent() {
    let h = harness(permissive());
    let ctx = owner("alice");
    let id = h.manager.add_memory("likes tea", &ctx).await.unwrap();
    assert!(h.manager.delete_memory(&id, &ctx).await.unwrap());
    assert!(!h.manager.delete_memory(&id, &ctx).await.unwrap());
}

#[tokio::test]
async fn clear_removes_only_the_scope() {
    let h = harness(permissive());
    let s1 = session("alice", "s1");
    let s2 = session("alice", "s2");
    h.manager.add_memory("likes tea", &s1).await.unwrap();
    h.manager.add_memory("owns a bicycle", &s2).await.unwrap();

    assert_eq!(h.manager.clear(&s1).await.unwrap(), 1);
    assert_eq!(h.store.count_by_owner("alice").await.unwrap(), 1);
    assert_eq!(h.manager.clear(&owner("alice")).await.unwrap(), 1);
    assert_eq!(h.store.count_by_owner("alice").await.unwrap(), 0);
}

#[tokio::test]
async fn pruning_consolidates_with_generator() {
    let domain = DomainConfig::builder()
        .min_importance_threshold(0.0)
        .max_memories_per_owner(2)
        .summarize_on_prune(true)
        .build()
        .unwrap();
    let generator = Arc::new(MockGenerator::with_responses(vec![
        "\"Has a dog named Max and walks him daily.\"".to_string(),
    ]));
    let h = harness_with(domain, MockEmbedder::new(32), Some(generator.clone()), 0);
    let ctx = session("alice", "s1");

    let summary = h
        .manager
        .process_interaction(
            [
                Candidate::new("lives in Lisbon").with_importance(0.9),
                Candidate::new("has a dog named Max").with_importance(0.3),
                Candidate::new("walks the dog daily").with_importance(0.4),
            ],
            &ctx,
        )
        .await;

    assert_eq!(summary.pruned, 2);
    assert_eq!(summary.admitted_count(), 1);
    assert_eq!(h.store.count_by_owner("alice").await.unwrap(), 2);
    let prompts = generator.prompts().await;
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("has a dog named Max"));

    let records = h.manager.list_memories(&owner("alice"), None).await.memories;
    let merged = records
        .iter()
        .find(|r| r.category == SUMMARY_CATEGORY)
        .unwrap();
    assert_eq!(merged.content, "Has a dog named Max and walks him daily.");
    assert_eq!(merged.importance, 0.4);
    assert_eq!(merged.session_id, None);
    assert_eq!(merged.metadata[SUMMARIZED_FROM_KEY].as_array().unwrap().len(), 2);
    assert!(records.iter().any(|r| r.content == "lives in Lisbon"));
}

#[tokio::test]
async fn failed_summary_falls_back_to_deletion() {
    let domain = DomainConfig::builder()
        .min_importance_threshold(0.0)
        .max_memories_per_owner(2)
        .summarize_on_prune(true)
        .build()
        .unwrap();
    let generator = Arc::new(MockGenerator::new());
    generator.add_failure("model unavailable").await;
    let h = harness_with(domain, MockEmbedder::new(32), Some(generator), 0);
    let ctx = owner("alice");

    let summary = h
        .manager
        .process_interaction(
            [
                Candidate::new("lives in Lisbon").with_importance(0.9),
                Candidate::new("had soup today").with_importance(0.3),
                Candidate::new("plays the cello").with_importance(0.6),
            ],
            &ctx,
        )
        .await;

    assert_eq!(summary.pruned, 1);
    assert_eq!(summary.admitted_count(), 2);
    assert!(summary.prune_error.is_none());
    let records = h.manager.list_memories(&ctx, None).await.memories;
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.content != "had soup today"));
}

#[tokio::test]
async fn swapped_config_applies_to_next_call() {
    let h = harness(permissive());
    let ctx = owner("alice");

    let strict = DomainConfig::builder()
        .min_importance_threshold(0.99)
        .build()
        .unwrap();
    h.manager.swap_domain_config(strict);
    assert_eq!(h.manager.domain_config().min_importance_threshold(), 0.99);

    let summary = h
        .manager
        .process_interaction([Candidate::new("likes tea").with_importance(0.5)], &ctx)
        .await;
    assert_eq!(summary.admitted_count(), 0);
    assert_eq!(summary.below_threshold, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_interactions_lose_nothing() {
    let mut embedder = MockEmbedder::new(16);
    for i in 0..16 {
        let mut axis = vec![0.0f32; 16];
        axis[i] = 1.0;
        embedder = embedder.pin(&format!("fact number {i} about alice"), &axis);
    }
    let h = harness_with(permissive(), embedder, None, 0);
    let mut handles = Vec::new();
    for i in 0..16 {
        let manager = h.manager.clone();
        handles.push(tokio::spawn(async move {
            let ctx = session("alice", &format!("s{}", i % 4));
            manager
                .process_interaction([format!("fact number {i} about alice")], &ctx)
                .await
        }));
    }
    let mut admitted = 0;
    for handle in handles {
        admitted += handle.await.unwrap().admitted_count();
    }
    assert_eq!(admitted, 16);
    assert_eq!(h.store.count_by_owner("alice").await.unwrap(), 16);
}

#[tokio::test]
async fn tool_registry_drives_manual_operations() {
    let h = harness(permissive());
    let registry = ToolRegistry::with_memory_tools(h.manager.clone());
    let ctx = owner("alice");

    let names: Vec<String> = registry
        .tool_definitions()
        .iter()
        .map(|d| d["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        names,
        vec!["memory_add", "memory_delete", "memory_search", "memory_update"]
    );

    let added = registry
        .invoke("memory_add", &ctx, json!({"content": "likes dark mode"}))
        .await;
    assert!(!added.is_error, "{}", added.content);
    let id = serde_json::from_str::<serde_json::Value>(&added.content).unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let found = registry
        .invoke("memory_search", &ctx, json!({"query": "likes dark mode"}))
        .await;
    assert!(!found.is_error);
    assert!(found.content.contains(&id));

    let updated = registry
        .invoke("memory_update", &ctx, json!({"id": id, "content": "likes light mode"}))
        .await;
    assert!(!updated.is_error, "{}", updated.content);
    assert!(updated.content.contains("likes light mode"));

    let bad = registry.invoke("memory_delete", &ctx, json!({"nope": 1})).await;
    assert!(bad.is_error);

    let deleted = registry
        .invoke("memory_delete", &ctx, json!({"id": id}))
        .await;
    assert_eq!(deleted.content, r#"{"deleted":true}"#);
    assert!(h.store.get(&id).await.unwrap().is_none());
}

/// Removes one record straight from the inner store right before the first
/// owner trim, as a delete from another task would.
struct DeleteBeforeTrim {
    inner: Arc<EphemeralMemoryStore>,
    victim: Mutex<Option<String>>,
}

#[async_trait]
impl MemoryStore for DeleteBeforeTrim {
    fn name(&self) -> &str {
        "delete-before-trim"
    }

    async fn insert(&self, record: MemoryRecord) -> Result<String, MnemosError> {
        self.inner.insert(record).await
    }

    async fn insert_batch(&self, records: Vec<MemoryRecord>) -> Result<BatchInsert, MnemosError> {
        self.inner.insert_batch(records).await
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryRecord>, MnemosError> {
        self.inner.get(id).await
    }

    async fn update(&self, record: MemoryRecord) -> Result<(), MnemosError> {
        self.inner.update(record).await
    }

    async fn delete(&self, id: &str) -> Result<(), MnemosError> {
        self.inner.delete(id).await
    }

    async fn delete_many(&self, ids: &[String]) -> Result<usize, MnemosError> {
        self.inner.delete_many(ids).await
    }

    async fn delete_excess(
        &self,
        owner_id: &str,
        ids: &[String],
        keep: usize,
    ) -> Result<Vec<String>, MnemosError> {
        let victim = self.victim.lock().unwrap().take();
        if let Some(victim) = victim {
            self.inner.delete(&victim).await?;
        }
        self.inner.delete_excess(owner_id, ids, keep).await
    }

    async fn list_by_owner(
        &self,
        scope: &Scope,
        limit: Option<usize>,
    ) -> Result<Vec<MemoryRecord>, MnemosError> {
        self.inner.list_by_owner(scope, limit).await
    }

    async fn count_by_owner(&self, owner_id: &str) -> Result<usize, MnemosError> {
        self.inner.count_by_owner(owner_id).await
    }

    async fn search_similar(
        &self,
        query: &SimilarityQuery,
    ) -> Result<Vec<ScoredMemory>, MnemosError> {
        self.inner.search_similar(query).await
    }

    async fn clear(&self, scope: Option<&Scope>) -> Result<usize, MnemosError> {
        self.inner.clear(scope).await
    }
}

#[tokio::test]
async fn delete_between_count_and_trim_is_not_paid_twice() {
    let domain = DomainConfig::builder()
        .min_importance_threshold(0.0)
        .max_memories_per_owner(2)
        .build()
        .unwrap();
    let inner = Arc::new(EphemeralMemoryStore::new());
    let store = Arc::new(DeleteBeforeTrim {
        inner: inner.clone(),
        victim: Mutex::new(None),
    });
    let manager = manager_over(store.clone(), domain, None);

    let other = session("alice", "s2");
    let lisbon = manager
        .add_memory(Candidate::new("lives in Lisbon").with_importance(0.9), &other)
        .await
        .unwrap();
    manager
        .add_memory(Candidate::new("plays the cello").with_importance(0.8), &other)
        .await
        .unwrap();
    *store.victim.lock().unwrap() = Some(lisbon);

    let summary = manager
        .process_interaction(
            [Candidate::new("had soup today").with_importance(0.1)],
            &session("alice", "s1"),
        )
        .await;

    // The concurrent delete already brought the owner back to the cap.
    assert_eq!(summary.pruned, 0);
    assert_eq!(summary.admitted_count(), 1);
    assert!(summary.is_complete());
    assert_eq!(inner.count_by_owner("alice").await.unwrap(), 2);
    assert!(store.victim.lock().unwrap().is_none());
}

#[tokio::test]
async fn store_failures_degrade_reads() {
    let store = Arc::new(FailingStore::new(Arc::new(EphemeralMemoryStore::new())));
    let manager = manager_over(store.clone(), permissive(), None);
    let ctx = owner("alice");
    manager.add_memory("likes dark mode", &ctx).await.unwrap();

    store.fail(StoreOp::Search);
    store.fail(StoreOp::List);

    let retrieval = manager.retrieve("likes dark mode", &ctx, 5).await;
    assert!(retrieval.is_empty());
    let error = retrieval.error.unwrap();
    assert_eq!(error.storage_kind(), Some(StorageErrorKind::IoFailure));

    let listing = manager.list_memories(&ctx, None).await;
    assert!(listing.memories.is_empty());
    let error = listing.error.unwrap();
    assert_eq!(error.storage_kind(), Some(StorageErrorKind::IoFailure));

    store.recover(StoreOp::Search);
    store.recover(StoreOp::List);
    assert_eq!(manager.retrieve("likes dark mode", &ctx, 5).await.memories.len(), 1);
}

#[tokio::test]
async fn failed_insert_only_drops_its_candidate() {
    let store = Arc::new(FailingStore::new(Arc::new(EphemeralMemoryStore::new())));
    let manager = manager_over(store.clone(), permissive(), None);
    let ctx = owner("alice");
    store.fail(StoreOp::InsertBatch);
    store.fail_insert_containing("cello");

    let summary = manager
        .process_interaction(
            [
                Candidate::new("lives in Lisbon").with_importance(0.9),
                Candidate::new("plays the cello").with_importance(0.6),
            ],
            &ctx,
        )
        .await;

    assert_eq!(summary.admitted_count(), 1);
    assert_eq!(summary.failed_count(), 1);
    assert_eq!(summary.failed[0].content, "plays the cello");
    assert_eq!(
        summary.failed[0].error.storage_kind(),
        Some(StorageErrorKind::IoFailure)
    );
    let stored = manager.list_memories(&ctx, None).await.memories;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].content, "lives in Lisbon");
}

#[tokio::test]
async fn failed_trim_rolls_back_the_summary() {
    let domain = DomainConfig::builder()
        .min_importance_threshold(0.0)
        .max_memories_per_owner(2)
        .summarize_on_prune(true)
        .build()
        .unwrap();
    let generator = Arc::new(MockGenerator::with_responses(vec![
        "Has a dog named Max and walks him daily.".to_string(),
    ]));
    let store = Arc::new(FailingStore::new(Arc::new(EphemeralMemoryStore::new())));
    let manager = manager_over(store.clone(), domain, Some(generator.clone()));
    let ctx = owner("alice");
    store.fail(StoreOp::DeleteExcess);

    let summary = manager
        .process_interaction(
            [
                Candidate::new("lives in Lisbon").with_importance(0.9),
                Candidate::new("has a dog named Max").with_importance(0.3),
                Candidate::new("walks the dog daily").with_importance(0.4),
            ],
            &ctx,
        )
        .await;

    assert_eq!(generator.prompts().await.len(), 1);
    assert_eq!(summary.pruned, 0);
    assert_eq!(summary.admitted_count(), 3);
    let error = summary.prune_error.unwrap();
    assert_eq!(error.storage_kind(), Some(StorageErrorKind::IoFailure));

    let records = manager.list_memories(&ctx, None).await.memories;
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.category != SUMMARY_CATEGORY));
}
