// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding provider trait for vector embedding generation.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::MnemosError;
use crate::vector::cosine_similarity;

/// Turns text into fixed-length vectors and compares them.
///
/// Blank input yields an empty vector rather than an error. Implementations
/// backed by a remote service must honor `cancel`.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync + 'static {
    /// Human-readable provider name, used in logs.
    fn name(&self) -> &str;

    /// Length of every non-empty vector this provider returns.
    fn dimensions(&self) -> usize;

    /// Embeds a single text.
    async fn embed(&self, text: &str, cancel: &CancellationToken)
    -> Result<Vec<f32>, MnemosError>;

    /// Embeds many texts, one vector per input in input order.
    ///
    /// The default runs [`embed`](Self::embed) sequentially.
    async fn embed_batch(
        &self,
        texts: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>, MnemosError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text, cancel).await?);
        }
        Ok(out)
    }

    /// Similarity in [0, 1]; see [`cosine_similarity`].
    fn similarity(&self, a: &[f32], b: &[f32]) -> f64 {
        cosine_similarity(a, b)
    }
}
