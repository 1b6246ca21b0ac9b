// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Mnemos semantic memory store.
//!
//! This crate provides the error type, memory domain types, vector math and
//! the adapter traits implemented by embedding providers, storage backends
//! and text generators.

pub mod error;
pub mod traits;
pub mod types;
pub mod vector;

// Re-export key items at crate root for ergonomic imports.
pub use error::{MnemosError, StorageErrorKind};
pub use types::{
    BatchInsert, DEFAULT_CATEGORY, MemoryContext, MemoryRecord, Metadata, Scope, ScoredMemory,
    SimilarityQuery,
};

pub use traits::{EmbeddingProvider, MemoryStore, TextGenerator};
