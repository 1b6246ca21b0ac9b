// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! All adapters use `#[async_trait]` for dynamic dispatch compatibility and
//! are held as `Arc<dyn Trait>` by the memory manager.

pub mod embedding;
pub mod generation;
pub mod storage;

pub use embedding::EmbeddingProvider;
pub use generation::TextGenerator;
pub use storage::MemoryStore;
