// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! ONNX embedding provider for local inference using all-MiniLM-L6-v2.
//!
//! Produces 384-dimensional embeddings on CPU with zero external API calls.
//! Local inference failures are never retryable.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use ndarray::Array2;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::TensorRef;
use tokio_util::sync::CancellationToken;

use mnemos_core::vector::l2_normalize;
use mnemos_core::{EmbeddingProvider, MnemosError};

/// Embedding dimensions for all-MiniLM-L6-v2.
pub const EMBEDDING_DIM: usize = 384;

fn onnx_err(context: &str, e: impl std::fmt::Display) -> MnemosError {
    MnemosError::embedding_fatal(format!("{context}: {e}"))
}

/// ONNX-based embedding provider using all-MiniLM-L6-v2.
///
/// Loads the quantized INT8 model and tokenizer from disk. Inference runs
/// on one CPU thread.
pub struct OnnxEmbedder {
    /// ONNX Runtime session (not Send, wrapped in Mutex for safety).
    session: Mutex<Session>,
    tokenizer: tokenizers::Tokenizer,
}

// Safety: Session is accessed through Mutex which provides synchronization.
// The tokenizer is thread-safe for encoding operations.
unsafe impl Send for OnnxEmbedder {}
unsafe impl Sync for OnnxEmbedder {}

impl OnnxEmbedder {
    /// Load the model at `model_path`; `tokenizer.json` must sit beside it.
    pub fn new(model_path: &Path) -> Result<Self, MnemosError> {
        let model_dir = model_path
            .parent()
            .ok_or_else(|| MnemosError::Config("invalid model path".to_string()))?;

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            MnemosError::Config(format!(
                "failed to load tokenizer from {}: {e}",
                tokenizer_path.display()
            ))
        })?;

        let session = Session::builder()
            .map_err(|e| onnx_err("failed to create ONNX session builder", e))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| onnx_err("failed to set optimization level", e))?
            .with_intra_threads(1)
            .map_err(|e| onnx_err("failed to set thread count", e))?
            .commit_from_file(model_path)
            .map_err(|e| {
                MnemosError::Config(format!(
                    "failed to load ONNX model from {}: {e}",
                    model_path.display()
                ))
            })?;

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }

    /// Embed one text synchronously, returning an L2-normalized vector.
    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>, MnemosError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| onnx_err("tokenization failed", e))?;

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();
        let token_type_ids: Vec<i64> = encoding
            .get_type_ids()
            .iter()
            .map(|&t| t as i64)
            .collect();

        let seq_len = input_ids.len();
        let shape = (1, seq_len);
        let input_ids = Array2::from_shape_vec(shape, input_ids)
            .map_err(|e| onnx_err("input_ids tensor", e))?;
        let mask = Array2::from_shape_vec(shape, attention_mask.clone())
            .map_err(|e| onnx_err("attention_mask tensor", e))?;
        let type_ids = Array2::from_shape_vec(shape, token_type_ids)
            .map_err(|e| onnx_err("token_type_ids tensor", e))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| MnemosError::Internal(format!("ONNX session lock poisoned: {e}")))?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => TensorRef::from_array_view(&input_ids)
                    .map_err(|e| onnx_err("input_ids view", e))?,
                "attention_mask" => TensorRef::from_array_view(&mask)
                    .map_err(|e| onnx_err("attention_mask view", e))?,
                "token_type_ids" => TensorRef::from_array_view(&type_ids)
                    .map_err(|e| onnx_err("token_type_ids view", e))?
            ])
            .map_err(|e| onnx_err("ONNX inference failed", e))?;

        // Output shape: [1, seq_len, hidden]
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| onnx_err("failed to extract output tensor", e))?;
        let hidden_size = shape.last().copied().unwrap_or(0) as usize;

        let pooled = mean_pool_with_attention(data, &attention_mask, seq_len, hidden_size);
        Ok(l2_normalize(&pooled))
    }
}

/// Attention-masked mean over token embeddings laid out row-major.
fn mean_pool_with_attention(
    embeddings: &[f32],
    attention_mask: &[i64],
    seq_len: usize,
    hidden_size: usize,
) -> Vec<f32> {
    let mut sum = vec![0.0f32; hidden_size];
    let mut count = 0.0f32;

    for (token, _) in attention_mask
        .iter()
        .enumerate()
        .take(seq_len)
        .filter(|(_, m)| **m > 0)
    {
        let row = &embeddings[token * hidden_size..(token + 1) * hidden_size];
        for (acc, v) in sum.iter_mut().zip(row) {
            *acc += v;
        }
        count += 1.0;
    }

    if count > 0.0 {
        for val in &mut sum {
            *val /= count;
        }
    }
    sum
}

#[async_trait]
impl EmbeddingProvider for OnnxEmbedder {
    fn name(&self) -> &str {
        "onnx"
    }

    fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }

    async fn embed(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<f32>, MnemosError> {
        if cancel.is_cancelled() {
            return Err(MnemosError::embedding_fatal("embedding cancelled"));
        }
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.embed_text(text)
    }
}
