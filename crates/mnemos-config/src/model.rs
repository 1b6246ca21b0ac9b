// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Mnemos configuration.
///
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MnemosConfig {
    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Embedding provider settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Admission, retrieval and pruning policy.
    #[serde(default)]
    pub domain: DomainSection,
}

/// Which memory record store to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// SQLite database that survives restarts.
    Sqlite,
    /// Process-lifetime in-memory maps.
    Ephemeral,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,

    /// Path to the SQLite database file. Ignored by the ephemeral backend.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_backend() -> StorageBackend {
    StorageBackend::Sqlite
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("mnemos").join("mnemos.db"))
        .and_then(|p| p.to_str().map(String::from))
        .unwrap_or_else(|| "mnemos.db".to_string())
}

fn default_wal_mode() -> bool {
    true
}

/// Which embedding provider to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Local ONNX all-MiniLM-L6-v2 inference.
    Onnx,
    /// Remote OpenAI-compatible `/v1/embeddings` endpoint.
    Http,
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: EmbeddingBackend,

    /// Directory where the ONNX model is downloaded and cached.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Base URL of the remote embedding service.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Bearer token for the remote service. `None` sends no auth header.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Remote model name.
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Expected vector length.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Per-request timeout for the remote path.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// How many times the memory manager retries a retryable embedding failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            data_dir: default_data_dir(),
            endpoint: default_endpoint(),
            api_key: None,
            model: default_embedding_model(),
            dimensions: default_dimensions(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_provider() -> EmbeddingBackend {
    EmbeddingBackend::Onnx
}

fn default_data_dir() -> String {
    dirs::data_dir()
        .map(|p| p.join("mnemos"))
        .and_then(|p| p.to_str().map(String::from))
        .unwrap_or_else(|| ".mnemos".to_string())
}

fn default_endpoint() -> String {
    "https://api.openai.com".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_dimensions() -> usize {
    384
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    1
}

/// Raw `[domain]` section as written in TOML.
///
/// Converted into the validated, immutable [`crate::domain::DomainConfig`].
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DomainSection {
    /// Cap on records admitted by one interaction.
    #[serde(default = "default_max_per_interaction")]
    pub max_memories_per_interaction: usize,

    /// Candidates scoring below this are discarded; also applied at read time.
    #[serde(default = "default_min_importance")]
    pub min_importance_threshold: f64,

    /// Soft cap per owner; exceeding it triggers pruning.
    #[serde(default = "default_max_per_owner")]
    pub max_memories_per_owner: usize,

    /// Prefer newer records on similarity ties and keep them when pruning.
    #[serde(default = "default_prioritize_recent")]
    pub prioritize_recent: bool,

    /// Allowed category labels. Empty means unrestricted.
    #[serde(default)]
    pub categories: Vec<String>,

    /// Minimum similarity (0.0-1.0) for retrieval hits.
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,

    /// Candidates at least this similar to an existing record are skipped.
    #[serde(default = "default_duplicate_similarity")]
    pub duplicate_similarity: f64,

    /// Consolidate pruned records into a summary memory.
    #[serde(default)]
    pub summarize_on_prune: bool,
}

impl Default for DomainSection {
    fn default() -> Self {
        Self {
            max_memories_per_interaction: default_max_per_interaction(),
            min_importance_threshold: default_min_importance(),
            max_memories_per_owner: default_max_per_owner(),
            prioritize_recent: default_prioritize_recent(),
            categories: Vec::new(),
            min_similarity: default_min_similarity(),
            duplicate_similarity: default_duplicate_similarity(),
            summarize_on_prune: false,
        }
    }
}

fn default_max_per_interaction() -> usize {
    5
}

fn default_min_importance() -> f64 {
    0.3
}

fn default_max_per_owner() -> usize {
    500
}

fn default_prioritize_recent() -> bool {
    true
}

fn default_min_similarity() -> f64 {
    0.55
}

fn default_duplicate_similarity() -> f64 {
    0.97
}
