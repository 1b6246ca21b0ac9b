// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The memory manager: admission, retrieval, manual edits and pruning.
//!
//! Composes an [`EmbeddingProvider`], a [`MemoryStore`] and the
//! [`RetentionPolicy`] under one [`DomainConfig`] snapshot per call.
//! Failures while admitting one candidate never cost the others; read
//! failures degrade to empty results with the error attached.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use mnemos_config::{DomainConfig, EmbeddingBackend, MnemosConfig};
use mnemos_core::{
    DEFAULT_CATEGORY, EmbeddingProvider, MemoryContext, MemoryRecord, MemoryStore, Metadata,
    MnemosError, Scope, ScoredMemory, SimilarityQuery, TextGenerator,
};

use crate::candidate::Candidate;
use crate::embedder::OnnxEmbedder;
use crate::http_embedder::HttpEmbedder;
use crate::locks::ScopeLocks;
use crate::metrics;
use crate::model_manager::ModelManager;
use crate::policy::RetentionPolicy;
use crate::summarizer;

/// Base delay before repeating a retryable embedding call; grows linearly.
const RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// A candidate that could not be stored, with the reason.
#[derive(Debug)]
pub struct CandidateFailure {
    pub content: String,
    pub error: MnemosError,
}

/// Outcome of one [`MemoryManager::process_interaction`] call.
#[derive(Debug, Default)]
pub struct InteractionSummary {
    /// Ids of the stored records that are still present, highest importance
    /// first. Records pruned or consolidated by this same call are left out.
    pub admitted: Vec<String>,
    pub blank: usize,
    pub below_threshold: usize,
    /// Accepted candidates dropped by `max_memories_per_interaction`.
    pub over_cap: usize,
    pub duplicates: usize,
    /// Embedding or storage failures, one per affected candidate.
    pub failed: Vec<CandidateFailure>,
    /// Records removed (or consolidated) to honour `max_memories_per_owner`,
    /// including any that were admitted by this call.
    pub pruned: usize,
    pub prune_error: Option<MnemosError>,
}

impl InteractionSummary {
    pub fn admitted_count(&self) -> usize {
        self.admitted.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// True when nothing failed, including pruning.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.prune_error.is_none()
    }
}

/// Ranked memories for a query. `error` is set when the read degraded.
#[derive(Debug, Default)]
pub struct Retrieval {
    pub memories: Vec<ScoredMemory>,
    pub error: Option<MnemosError>,
}

impl Retrieval {
    fn degraded(error: MnemosError) -> Self {
        Self {
            memories: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.memories.is_empty()
    }

    /// Markdown block for splicing into a prompt; empty when nothing matched.
    pub fn to_prompt_block(&self) -> String {
        if self.memories.is_empty() {
            return String::new();
        }
        let mut block = String::from("## Relevant Memories\n");
        for hit in &self.memories {
            block.push_str("- ");
            block.push_str(&hit.memory.content);
            block.push('\n');
        }
        block
    }
}

/// Records visible in a scope. `error` is set when the read degraded.
#[derive(Debug, Default)]
pub struct Listing {
    pub memories: Vec<MemoryRecord>,
    pub error: Option<MnemosError>,
}

/// Edits applied by [`MemoryManager::update_memory`]. Unset fields keep
/// their stored value.
#[derive(Debug, Clone, Default)]
pub struct MemoryUpdate {
    pub content: Option<String>,
    pub category: Option<String>,
    pub importance: Option<f64>,
    pub metadata: Option<Metadata>,
    /// Recompute importance with the retention policy when no explicit
    /// importance is given.
    pub rescore: bool,
}

impl MemoryUpdate {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = Some(importance);
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn rescored(mut self) -> Self {
        self.rescore = true;
        self
    }
}

/// Builder for [`MemoryManager`]. Validation happens in [`build`](Self::build).
#[derive(Default)]
pub struct MemoryManagerBuilder {
    store: Option<Arc<dyn MemoryStore>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    generator: Option<Arc<dyn TextGenerator>>,
    domain: Option<DomainConfig>,
    max_retries: u32,
}

impl MemoryManagerBuilder {
    pub fn store(mut self, store: Arc<dyn MemoryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Text generator used to consolidate pruned records.
    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn domain(mut self, domain: DomainConfig) -> Self {
        self.domain = Some(domain);
        self
    }

    /// Extra attempts for retryable embedding failures.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn build(self) -> Result<MemoryManager, MnemosError> {
        let store = self
            .store
            .ok_or_else(|| MnemosError::Config("memory manager needs a store".into()))?;
        let embedder = self
            .embedder
            .ok_or_else(|| MnemosError::Config("memory manager needs an embedder".into()))?;
        if embedder.dimensions() == 0 {
            return Err(MnemosError::Config(format!(
                "embedder `{}` reports zero dimensions",
                embedder.name()
            )));
        }

        let domain = self.domain.unwrap_or_default();
        if domain.summarize_on_prune() && self.generator.is_none() {
            warn!("summarize_on_prune is set but no text generator is attached; pruning will delete");
        }

        metrics::register_metrics();
        Ok(MemoryManager {
            store,
            embedder,
            generator: self.generator,
            policy: RetentionPolicy,
            domain: ArcSwap::from_pointee(domain),
            locks: ScopeLocks::new(),
            max_retries: self.max_retries,
        })
    }
}

/// Orchestrates the memory lifecycle for many owners concurrently.
pub struct MemoryManager {
    store: Arc<dyn MemoryStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Option<Arc<dyn TextGenerator>>,
    policy: RetentionPolicy,
    domain: ArcSwap<DomainConfig>,
    locks: ScopeLocks,
    max_retries: u32,
}

impl MemoryManager {
    pub fn builder() -> MemoryManagerBuilder {
        MemoryManagerBuilder::default()
    }

    /// Wire up store, embedder and policy from a loaded configuration.
    ///
    /// The ONNX provider downloads its model on first use.
    pub async fn from_config(
        config: &MnemosConfig,
        generator: Option<Arc<dyn TextGenerator>>,
    ) -> Result<Self, MnemosError> {
        let store = mnemos_storage::open_store(&config.storage).await?;
        let embedder: Arc<dyn EmbeddingProvider> = match config.embedding.provider {
            EmbeddingBackend::Onnx => {
                let manager = ModelManager::new(&config.embedding.data_dir);
                let model_path = manager.ensure_model().await?;
                Arc::new(OnnxEmbedder::new(&model_path)?)
            }
            EmbeddingBackend::Http => Arc::new(HttpEmbedder::new(&config.embedding)?),
        };
        if embedder.dimensions() != config.embedding.dimensions {
            return Err(MnemosError::Config(format!(
                "embedding.dimensions is {} but provider `{}` produces {}",
                config.embedding.dimensions,
                embedder.name(),
                embedder.dimensions()
            )));
        }

        let mut builder = Self::builder()
            .store(store)
            .embedder(embedder)
            .domain(config.domain_config()?)
            .max_retries(config.embedding.max_retries);
        if let Some(generator) = generator {
            builder = builder.generator(generator);
        }
        builder.build()
    }

    /// The policy snapshot new calls will use.
    pub fn domain_config(&self) -> Arc<DomainConfig> {
        self.domain.load_full()
    }

    /// Attach a new policy. Calls already running finish on their snapshot.
    pub fn swap_domain_config(&self, domain: DomainConfig) -> Arc<DomainConfig> {
        info!("domain configuration swapped");
        self.domain.swap(Arc::new(domain))
    }

    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    // --- admission ---

    /// Score, cap, embed, deduplicate and store the candidates of one turn.
    ///
    /// Never fails as a whole: per-candidate failures are listed in the
    /// summary. All admitted records become visible together.
    pub async fn process_interaction<C>(
        &self,
        candidates: impl IntoIterator<Item = C>,
        ctx: &MemoryContext,
    ) -> InteractionSummary
    where
        C: Into<Candidate>,
    {
        let candidates: Vec<Candidate> = candidates.into_iter().map(Into::into).collect();
        let mut summary = InteractionSummary::default();
        if candidates.is_empty() {
            return summary;
        }
        let config = self.domain.load_full();

        let mut accepted: Vec<(Candidate, f64)> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if candidate.is_blank() {
                summary.blank += 1;
                continue;
            }
            let importance = self.policy.score(&candidate, &config);
            if self.policy.should_admit(importance, &config) {
                accepted.push((candidate, importance));
            } else {
                debug!(importance, "candidate below importance threshold");
                summary.below_threshold += 1;
            }
        }

        // Highest importance wins the cap; the sort is stable so equal
        // scores keep their input order.
        accepted.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let cap = config.max_memories_per_interaction();
        if accepted.len() > cap {
            summary.over_cap = accepted.len() - cap;
            accepted.truncate(cap);
        }
        metrics::record_rejected("threshold", summary.below_threshold + summary.blank);
        metrics::record_rejected("cap", summary.over_cap);

        if accepted.is_empty() {
            return summary;
        }

        let _scope_guard = self.locks.write(&ctx.scope).await;

        let texts: Vec<String> = accepted.iter().map(|(c, _)| c.content.clone()).collect();
        let embeddings = self.embed_all(&texts, &ctx.cancel).await;

        let mut records = Vec::with_capacity(accepted.len());
        let mut batch_vectors: Vec<Vec<f32>> = Vec::new();
        for ((candidate, importance), embedding) in accepted.into_iter().zip(embeddings) {
            let embedding = match embedding {
                Ok(v) => v,
                Err(error) => {
                    warn!(
                        owner_id = ctx.owner_id(),
                        error = %error,
                        "dropping candidate after embedding failure"
                    );
                    summary.failed.push(CandidateFailure {
                        content: candidate.content,
                        error,
                    });
                    continue;
                }
            };

            if self
                .is_duplicate(&embedding, &batch_vectors, &ctx.scope, &config)
                .await
            {
                debug!(owner_id = ctx.owner_id(), "skipping duplicate candidate");
                summary.duplicates += 1;
                continue;
            }
            batch_vectors.push(embedding.clone());

            let category = self.policy.category_for(candidate.category.as_deref(), &config);
            records.push(
                MemoryRecord::new(&ctx.scope, candidate.content, embedding)
                    .with_category(category)
                    .with_importance(importance)
                    .with_metadata(candidate.metadata),
            );
        }
        metrics::record_rejected("duplicate", summary.duplicates);

        if !records.is_empty() {
            self.insert_all(records, &mut summary).await;
        }
        metrics::record_admitted(summary.admitted.len());

        if !summary.admitted.is_empty() {
            match self
                .enforce_cap(ctx.owner_id(), &config, &ctx.cancel)
                .await
            {
                Ok(removed) => {
                    summary.admitted.retain(|id| !removed.contains(id));
                    summary.pruned = removed.len();
                }
                Err(e) => {
                    warn!(owner_id = ctx.owner_id(), error = %e, "pruning failed");
                    summary.prune_error = Some(e);
                }
            }
        }

        if summary.failed.is_empty() {
            info!(
                owner_id = ctx.owner_id(),
                session_id = ?ctx.session_id(),
                admitted = summary.admitted.len(),
                duplicates = summary.duplicates,
                pruned = summary.pruned,
                "interaction processed"
            );
        } else {
            warn!(
                owner_id = ctx.owner_id(),
                session_id = ?ctx.session_id(),
                admitted = summary.admitted.len(),
                failed = summary.failed.len(),
                "interaction processed with failures"
            );
        }
        summary
    }

    /// Insert as one batch; if the batch itself fails, fall back to one
    /// insert per record so each failure stays attached to its candidate.
    async fn insert_all(&self, records: Vec<MemoryRecord>, summary: &mut InteractionSummary) {
        let contents: Vec<String> = records.iter().map(|r| r.content.clone()).collect();
        match self.store.insert_batch(records.clone()).await {
            Ok(batch) => {
                summary.admitted.extend(batch.inserted);
                for (index, error) in batch.rejected {
                    metrics::record_rejected("invalid", 1);
                    summary.failed.push(CandidateFailure {
                        content: contents.get(index).cloned().unwrap_or_default(),
                        error,
                    });
                }
            }
            Err(batch_error) => {
                warn!(error = %batch_error, "batch insert failed, inserting one by one");
                for record in records {
                    let content = record.content.clone();
                    match self.store.insert(record).await {
                        Ok(id) => summary.admitted.push(id),
                        Err(error) => summary.failed.push(CandidateFailure { content, error }),
                    }
                }
            }
        }
    }

    async fn is_duplicate(
        &self,
        embedding: &[f32],
        earlier: &[Vec<f32>],
        scope: &Scope,
        config: &DomainConfig,
    ) -> bool {
        let threshold = config.duplicate_similarity();
        if earlier
            .iter()
            .any(|v| self.embedder.similarity(embedding, v) >= threshold)
        {
            return true;
        }
        let query = SimilarityQuery::new(scope, embedding.to_vec(), 1, threshold);
        match self.store.search_similar(&query).await {
            Ok(hits) => !hits.is_empty(),
            Err(e) => {
                warn!(error = %e, "duplicate lookup failed, admitting candidate");
                false
            }
        }
    }

    // --- retrieval ---

    /// Memories relevant to `query` in the context's scope, best first.
    ///
    /// Similarity below `min_similarity` and importance below
    /// `min_importance_threshold` are filtered out at read time.
    pub async fn retrieve(&self, query: &str, ctx: &MemoryContext, limit: usize) -> Retrieval {
        let started = Instant::now();
        let config = self.domain.load_full();
        if query.trim().is_empty() || limit == 0 {
            return Retrieval::default();
        }

        let vector = match self.embed_one(query, &ctx.cancel).await {
            Ok(v) => v,
            Err(e) => {
                warn!(owner_id = ctx.owner_id(), error = %e, "retrieval degraded: embedding failed");
                return Retrieval::degraded(e);
            }
        };

        let _scope_guard = self.locks.read(&ctx.scope).await;
        // Ask for every hit above the floor so the recency tie-break below
        // is not pre-empted by the store's own truncation.
        let search = SimilarityQuery::new(&ctx.scope, vector, usize::MAX, config.min_similarity())
            .with_min_importance(config.min_importance_threshold());
        let mut hits = match self.store.search_similar(&search).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(owner_id = ctx.owner_id(), error = %e, "retrieval degraded: search failed");
                return Retrieval::degraded(e);
            }
        };

        hits.retain(|h| {
            h.memory.owner_id == ctx.owner_id()
                && h.memory.importance >= config.min_importance_threshold()
        });
        self.policy.rank(&mut hits, &config);
        hits.truncate(limit);

        metrics::record_retrieval_latency(started.elapsed().as_secs_f64());
        debug!(
            owner_id = ctx.owner_id(),
            session_id = ?ctx.session_id(),
            hits = hits.len(),
            "memories retrieved"
        );
        Retrieval {
            memories: hits,
            error: None,
        }
    }

    /// Records visible in the context's scope, newest first.
    pub async fn list_memories(&self, ctx: &MemoryContext, limit: Option<usize>) -> Listing {
        match self.store.list_by_owner(&ctx.scope, limit).await {
            Ok(memories) => Listing {
                memories,
                error: None,
            },
            Err(e) => {
                warn!(owner_id = ctx.owner_id(), error = %e, "listing degraded");
                Listing {
                    memories: Vec::new(),
                    error: Some(e),
                }
            }
        }
    }

    /// The record with `id`, if it is visible in the context's scope.
    pub async fn get_memory(
        &self,
        id: &str,
        ctx: &MemoryContext,
    ) -> Result<Option<MemoryRecord>, MnemosError> {
        Ok(self
            .store
            .get(id)
            .await?
            .filter(|r| ctx.scope.contains(&r.owner_id, r.session_id.as_deref())))
    }

    // --- manual operations ---

    /// Store a memory directly. Manual adds skip the admission threshold
    /// but still validate the category.
    pub async fn add_memory(
        &self,
        input: impl Into<Candidate>,
        ctx: &MemoryContext,
    ) -> Result<String, MnemosError> {
        let candidate: Candidate = input.into();
        let config = self.domain.load_full();
        if candidate.is_blank() {
            return Err(MnemosError::invalid_record("memory content must not be empty"));
        }
        let category = match candidate.category.as_deref().map(str::trim) {
            None | Some("") => DEFAULT_CATEGORY.to_string(),
            Some(c) if config.allows_category(c) => c.to_string(),
            Some(c) => {
                return Err(MnemosError::invalid_record(format!(
                    "category `{c}` is not in the configured taxonomy"
                )));
            }
        };
        let importance = self.policy.score(&candidate, &config);
        let embedding = self.embed_one(&candidate.content, &ctx.cancel).await?;

        let record = MemoryRecord::new(&ctx.scope, candidate.content, embedding)
            .with_category(category)
            .with_importance(importance)
            .with_metadata(candidate.metadata);

        let id = {
            let _scope_guard = self.locks.write(&ctx.scope).await;
            self.store.insert(record).await?
        };
        metrics::record_admitted(1);
        info!(owner_id = ctx.owner_id(), memory_id = %id, "memory added");

        if let Err(e) = self.enforce_cap(ctx.owner_id(), &config, &ctx.cancel).await {
            warn!(owner_id = ctx.owner_id(), error = %e, "pruning after manual add failed");
        }
        Ok(id)
    }

    /// Apply `update` to a visible record; content changes are re-embedded.
    pub async fn update_memory(
        &self,
        id: &str,
        update: MemoryUpdate,
        ctx: &MemoryContext,
    ) -> Result<MemoryRecord, MnemosError> {
        let config = self.domain.load_full();
        let existing = self
            .get_memory(id, ctx)
            .await?
            .ok_or_else(|| MnemosError::not_found(id))?;

        let _scope_guard = self.locks.write(&existing.scope()).await;
        let _prune_guard = self.locks.prune(ctx.owner_id()).await;
        // Re-read under the lock; a concurrent writer may have changed it.
        let mut record = self
            .get_memory(id, ctx)
            .await?
            .ok_or_else(|| MnemosError::not_found(id))?;

        if let Some(content) = update.content {
            let content = content.trim().to_string();
            if content.is_empty() {
                return Err(MnemosError::invalid_record("memory content must not be empty"));
            }
            if content != record.content {
                record.embedding = self.embed_one(&content, &ctx.cancel).await?;
                record.content = content;
            }
        }
        if let Some(category) = update.category {
            record.category = match category.trim() {
                "" => DEFAULT_CATEGORY.to_string(),
                c if config.allows_category(c) => c.to_string(),
                c => {
                    return Err(MnemosError::invalid_record(format!(
                        "category `{c}` is not in the configured taxonomy"
                    )));
                }
            };
        }
        if let Some(metadata) = update.metadata {
            record.metadata = metadata;
        }
        match update.importance {
            Some(importance) => record.importance = mnemos_core::types::clamp_unit(importance),
            None if update.rescore => {
                let candidate =
                    Candidate::new(record.content.clone()).with_category(record.category.clone());
                record.importance = self.policy.score(&candidate, &config);
            }
            None => {}
        }
        record.updated_at = Utc::now();

        self.store.update(record.clone()).await?;
        debug!(owner_id = ctx.owner_id(), memory_id = %id, "memory updated");
        Ok(record)
    }

    /// Delete a visible record. Returns false when there was nothing to delete.
    pub async fn delete_memory(&self, id: &str, ctx: &MemoryContext) -> Result<bool, MnemosError> {
        let Some(existing) = self.get_memory(id, ctx).await? else {
            return Ok(false);
        };
        let _scope_guard = self.locks.write(&existing.scope()).await;
        let _prune_guard = self.locks.prune(ctx.owner_id()).await;
        self.store.delete(id).await?;
        debug!(owner_id = ctx.owner_id(), memory_id = %id, "memory deleted");
        Ok(true)
    }

    /// Wipe the context's scope. Returns the number of records removed.
    pub async fn clear(&self, ctx: &MemoryContext) -> Result<usize, MnemosError> {
        let removed = {
            let _scope_guard = self.locks.write(&ctx.scope).await;
            let _prune_guard = self.locks.prune(ctx.owner_id()).await;
            self.store.clear(Some(&ctx.scope)).await?
        };
        self.locks.shrink();
        info!(owner_id = ctx.owner_id(), session_id = ?ctx.session_id(), removed, "scope cleared");
        Ok(removed)
    }

    /// Run pruning for the context's owner now. Returns the number removed.
    pub async fn prune(&self, ctx: &MemoryContext) -> Result<usize, MnemosError> {
        let config = self.domain.load_full();
        let removed = self.enforce_cap(ctx.owner_id(), &config, &ctx.cancel).await?;
        self.locks.shrink();
        Ok(removed.len())
    }

    // --- pruning ---

    /// Bring the owner back under `max_memories_per_owner`, returning the ids
    /// removed. The final trim recounts inside the store, so records deleted
    /// since the listing reduce the excess instead of being paid for twice.
    async fn enforce_cap(
        &self,
        owner_id: &str,
        config: &DomainConfig,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, MnemosError> {
        let _prune_guard = self.locks.prune(owner_id).await;
        let cap = config.max_memories_per_owner();
        let count = self.store.count_by_owner(owner_id).await?;
        if count <= cap {
            return Ok(Vec::new());
        }

        let records = self.store.list_by_owner(&Scope::owner(owner_id), None).await?;
        if config.summarize_on_prune()
            && let Some(generator) = &self.generator
        {
            match self
                .consolidate(owner_id, &records, config, generator.as_ref(), cancel)
                .await
            {
                Ok(removed) => {
                    metrics::record_pruned(removed.len());
                    return Ok(removed);
                }
                Err(e) => warn!(owner_id, error = %e, "summarization failed, pruning instead"),
            }
        }

        let order: Vec<String> = self
            .policy
            .pruning_order(&records, config)
            .into_iter()
            .map(|r| r.id.clone())
            .collect();
        let removed = self.store.delete_excess(owner_id, &order, cap).await?;
        metrics::record_pruned(removed.len());
        info!(owner_id, removed = removed.len(), "memories pruned");
        Ok(removed)
    }

    /// Replace the excess plus one record with a single summary record.
    async fn consolidate(
        &self,
        owner_id: &str,
        records: &[MemoryRecord],
        config: &DomainConfig,
        generator: &dyn TextGenerator,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, MnemosError> {
        let picked = self.policy.select_for_consolidation(records, config);
        if picked.len() < 2 {
            return Err(MnemosError::Internal("too few records to consolidate".into()));
        }

        let prompt = summarizer::build_summary_prompt(&picked);
        let response = generator.generate(&prompt).await?;
        let content = summarizer::clean_summary(&response)
            .ok_or_else(|| MnemosError::Internal("generator returned an empty summary".into()))?;
        let embedding = self.embed_one(&content, cancel).await?;

        let ids: Vec<String> = picked.iter().map(|r| r.id.clone()).collect();
        let importance = picked
            .iter()
            .map(|r| r.importance)
            .fold(0.0f64, f64::max);
        let summary = MemoryRecord::new(&Scope::owner(owner_id), content, embedding)
            .with_category(summarizer::SUMMARY_CATEGORY)
            .with_importance(importance)
            .with_metadata(summarizer::summary_metadata(&ids));

        let summary_id = self.store.insert(summary).await?;
        let outcome = self
            .store
            .delete_excess(owner_id, &ids, config.max_memories_per_owner())
            .await
            .and_then(|removed| {
                if removed.is_empty() {
                    Err(MnemosError::Internal("summarized records are already gone".into()))
                } else {
                    Ok(removed)
                }
            });
        match outcome {
            Ok(removed) => {
                info!(
                    owner_id,
                    removed = removed.len(),
                    summary_id = %summary_id,
                    "memories consolidated"
                );
                Ok(removed)
            }
            Err(e) => {
                // Leave the originals rather than both.
                if let Err(undo) = self.store.delete(&summary_id).await {
                    warn!(summary_id = %summary_id, error = %undo, "could not remove orphan summary");
                }
                Err(e)
            }
        }
    }

    // --- embedding with retry ---

    async fn embed_one(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<f32>, MnemosError> {
        let mut attempt = 0;
        let result = loop {
            match self.embedder.embed(text, cancel).await {
                Err(e) if e.is_retryable() && attempt < self.max_retries && !cancel.is_cancelled() => {
                    attempt += 1;
                    warn!(attempt, error = %e, "retrying embedding");
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                other => break other,
            }
        };
        result
            .and_then(|v| self.check_vector(v))
            .inspect_err(|_| metrics::record_embedding_failure(self.embedder.name()))
    }

    /// One result per text; a failed batch falls back to per-text calls.
    async fn embed_all(
        &self,
        texts: &[String],
        cancel: &CancellationToken,
    ) -> Vec<Result<Vec<f32>, MnemosError>> {
        match self.embedder.embed_batch(texts, cancel).await {
            Ok(vectors) if vectors.len() == texts.len() => {
                let mut out = Vec::with_capacity(texts.len());
                for (text, vector) in texts.iter().zip(vectors) {
                    match self.check_vector(vector) {
                        Ok(v) => out.push(Ok(v)),
                        // One bad vector in a batch gets its own second chance.
                        Err(_) => out.push(self.embed_one(text, cancel).await),
                    }
                }
                out
            }
            Ok(_) | Err(_) => {
                debug!("batch embedding failed, embedding one by one");
                let mut out = Vec::with_capacity(texts.len());
                for text in texts {
                    out.push(self.embed_one(text, cancel).await);
                }
                out
            }
        }
    }

    fn check_vector(&self, vector: Vec<f32>) -> Result<Vec<f32>, MnemosError> {
        let expected = self.embedder.dimensions();
        if vector.is_empty() {
            return Err(MnemosError::embedding_fatal("embedding provider returned an empty vector"));
        }
        if vector.len() != expected {
            return Err(MnemosError::Config(format!(
                "embedding provider `{}` returned {} dimensions, expected {expected}",
                self.embedder.name(),
                vector.len()
            )));
        }
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use mnemos_storage::EphemeralMemoryStore;
    use mnemos_test_utils::MockEmbedder;
    use tracing_test::traced_test;

    use super::*;

    fn manager(domain: DomainConfig) -> MemoryManager {
        MemoryManager::builder()
            .store(Arc::new(EphemeralMemoryStore::new()))
            .embedder(Arc::new(MockEmbedder::new(16)))
            .domain(domain)
            .build()
            .unwrap()
    }

    #[test]
    fn builder_requires_store_and_embedder() {
        assert!(matches!(
            MemoryManager::builder().build(),
            Err(MnemosError::Config(_))
        ));
        assert!(matches!(
            MemoryManager::builder()
                .store(Arc::new(EphemeralMemoryStore::new()))
                .build(),
            Err(MnemosError::Config(_))
        ));
    }

    #[test]
    fn zero_dimension_embedder_is_rejected() {
        let err = MemoryManager::builder()
            .store(Arc::new(EphemeralMemoryStore::new()))
            .embedder(Arc::new(MockEmbedder::new(0)))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, MnemosError::Config(_)));
    }

    #[tokio::test]
    async fn empty_interaction_is_a_no_op() {
        let m = manager(DomainConfig::default());
        let ctx = MemoryContext::new(Scope::owner("u1"));
        let summary = m.process_interaction(Vec::<Candidate>::new(), &ctx).await;
        assert_eq!(summary.admitted_count(), 0);
        assert!(summary.is_complete());
    }

    #[tokio::test]
    async fn swap_takes_effect_for_next_call() {
        let m = manager(DomainConfig::default());
        let stricter = DomainConfig::builder()
            .min_importance_threshold(0.95)
            .build()
            .unwrap();
        let old = m.swap_domain_config(stricter);
        assert_eq!(old.min_importance_threshold(), 0.3);

        let ctx = MemoryContext::new(Scope::owner("u1"));
        let summary = m
            .process_interaction([Candidate::new("likes green tea").with_importance(0.8)], &ctx)
            .await;
        assert_eq!(summary.admitted_count(), 0);
        assert_eq!(summary.below_threshold, 1);
    }

    #[test]
    fn prompt_block_lists_contents() {
        let r = MemoryRecord::new(&Scope::owner("u1"), "likes dark mode", vec![1.0]);
        let retrieval = Retrieval {
            memories: vec![ScoredMemory {
                memory: r,
                similarity: 0.9,
            }],
            error: None,
        };
        assert_eq!(
            retrieval.to_prompt_block(),
            "## Relevant Memories\n- likes dark mode\n"
        );
        assert!(Retrieval::default().to_prompt_block().is_empty());
    }

    #[tokio::test]
    async fn prune_releases_idle_scope_locks() {
        let m = manager(DomainConfig::default());
        for session in ["s1", "s2", "s3"] {
            let ctx = MemoryContext::new(Scope::session("u1", session));
            let candidate = Candidate::new(format!("fact from {session}")).with_importance(0.8);
            m.process_interaction([candidate], &ctx).await;
        }
        assert_eq!(m.locks.len(), 3);

        let removed = m.prune(&MemoryContext::new(Scope::owner("u1"))).await.unwrap();
        assert_eq!(removed, 0);
        assert!(m.locks.is_empty());
    }

    #[tokio::test]
    #[traced_test]
    async fn embedding_failure_is_logged_and_reported() {
        let m = MemoryManager::builder()
            .store(Arc::new(EphemeralMemoryStore::new()))
            .embedder(Arc::new(MockEmbedder::new(16).fail_on("boom", false)))
            .build()
            .unwrap();
        let ctx = MemoryContext::new(Scope::owner("u1"));
        let summary = m
            .process_interaction(
                [
                    Candidate::new("likes green tea").with_importance(0.8),
                    Candidate::new("boom goes the fact").with_importance(0.8),
                ],
                &ctx,
            )
            .await;

        assert_eq!(summary.admitted_count(), 1);
        assert_eq!(summary.failed_count(), 1);
        assert_eq!(summary.failed[0].content, "boom goes the fact");
        assert!(logs_contain("dropping candidate after embedding failure"));
        assert!(logs_contain("interaction processed with failures"));
    }
}
