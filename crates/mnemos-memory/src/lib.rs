// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory lifecycle for Mnemos.
//!
//! Candidate facts are scored by the [`RetentionPolicy`], embedded, stored,
//! and later retrieved by similarity through the [`MemoryManager`].
//!
//! ## Architecture
//!
//! - **MemoryManager**: admission, retrieval, manual edits, pruning
//! - **RetentionPolicy**: importance scoring and pruning order
//! - **OnnxEmbedder** / **HttpEmbedder**: local and remote embedding providers
//! - **ModelManager**: first-run model download
//! - **FactExtractor**: LLM-based candidate extraction helpers
//! - **ToolRegistry**: manual memory operations as callable tools

pub mod candidate;
pub mod embedder;
pub mod extractor;
pub mod http_embedder;
pub mod locks;
pub mod manager;
pub mod metrics;
pub mod model_manager;
pub mod policy;
pub mod summarizer;
pub mod tools;

pub use candidate::Candidate;
pub use embedder::{EMBEDDING_DIM, OnnxEmbedder};
pub use extractor::{FactExtractor, build_extraction_prompt, parse_candidates};
pub use http_embedder::HttpEmbedder;
pub use locks::ScopeLocks;
pub use manager::{
    CandidateFailure, InteractionSummary, Listing, MemoryManager, MemoryManagerBuilder,
    MemoryUpdate, Retrieval,
};
pub use model_manager::ModelManager;
pub use policy::RetentionPolicy;
pub use tools::{MemoryTool, ToolOutput, ToolRegistry};
