// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Mnemos.
//!
//! Deterministic mock adapters for fast, CI-runnable tests without model
//! downloads or network access.
//!
//! - [`MockEmbedder`] - hashed bag-of-words embeddings with pinned vectors and failure injection
//! - [`MockGenerator`] - text generator answering from a FIFO queue
//! - [`FailingStore`] - store wrapper failing chosen operations on demand

pub mod failing_store;
pub mod mock_embedder;
pub mod mock_generator;

pub use failing_store::{FailingStore, StoreOp};
pub use mock_embedder::MockEmbedder;
pub use mock_generator::MockGenerator;
