// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic embedding provider.
//!
//! Each lowercase word is hashed (FNV-1a) into a bucket with a hash-derived
//! sign, then the vector is L2-normalized. Texts sharing words land close
//! together; unrelated texts land near similarity 0.5. Exact texts can be
//! pinned to hand-picked vectors when a test needs a precise similarity.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use mnemos_core::vector::l2_normalize;
use mnemos_core::{EmbeddingProvider, MnemosError};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

fn fnv1a(word: &str) -> u64 {
    word.bytes()
        .fold(FNV_OFFSET, |h, b| (h ^ u64::from(b)).wrapping_mul(FNV_PRIME))
}

/// Mock [`EmbeddingProvider`] with failure injection.
pub struct MockEmbedder {
    dimensions: usize,
    pinned: Mutex<HashMap<String, Vec<f32>>>,
    fail_markers: Mutex<Vec<(String, bool)>>,
    fail_next: AtomicUsize,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            pinned: Mutex::new(HashMap::new()),
            fail_markers: Mutex::new(Vec::new()),
            fail_next: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always return `vector` (normalized, padded or cut to the configured
    /// width) for exactly `text`.
    pub fn pin(self, text: &str, vector: &[f32]) -> Self {
        let mut v = vector.to_vec();
        v.resize(self.dimensions, 0.0);
        if let Ok(mut pinned) = self.pinned.lock() {
            pinned.insert(text.to_string(), l2_normalize(&v));
        }
        self
    }

    /// Fail every text containing `marker`, as a retryable or fatal error.
    pub fn fail_on(self, marker: &str, retryable: bool) -> Self {
        if let Ok(mut markers) = self.fail_markers.lock() {
            markers.push((marker.to_string(), retryable));
        }
        self
    }

    /// Fail the next `n` calls with a retryable error.
    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Number of `embed` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The vector this embedder produces for `text`, without counting a call.
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        if let Some(v) = self.pinned.lock().ok().and_then(|p| p.get(text).cloned()) {
            return v;
        }
        let mut v = vec![0.0f32; self.dimensions];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let h = fnv1a(&word.to_lowercase());
            let bucket = (h % self.dimensions as u64) as usize;
            let sign = if (h >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        l2_normalize(&v)
    }

    fn injected_failure(&self, text: &str) -> Option<MnemosError> {
        let pending = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if pending.is_ok() {
            return Some(MnemosError::embedding_retryable("injected failure"));
        }
        let markers = self.fail_markers.lock().ok()?;
        markers
            .iter()
            .find(|(marker, _)| text.contains(marker.as_str()))
            .map(|(marker, retryable)| {
                let message = format!("injected failure for `{marker}`");
                if *retryable {
                    MnemosError::embedding_retryable(message)
                } else {
                    MnemosError::embedding_fatal(message)
                }
            })
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    fn name(&self) -> &str {
        "mock-embedder"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<f32>, MnemosError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            return Err(MnemosError::embedding_fatal("embedding cancelled"));
        }
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        if let Some(err) = self.injected_failure(text) {
            return Err(err);
        }
        Ok(self.vector_for(text))
    }
}
