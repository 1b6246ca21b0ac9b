// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text generation boundary used for fact extraction and summarization.

use async_trait::async_trait;

use crate::error::MnemosError;

/// Narrow "generate text from prompt" interface to a language model.
///
/// The memory subsystem treats the model as a black box.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, MnemosError>;
}
