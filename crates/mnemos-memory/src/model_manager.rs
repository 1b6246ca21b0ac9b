// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model download manager for first-run ONNX embedding model setup.
//!
//! Downloads all-MiniLM-L6-v2 INT8 quantized model from HuggingFace
//! on first run and caches it in the data directory.

use std::path::{Path, PathBuf};

use mnemos_core::MnemosError;
use tokio::sync::OnceCell;
use tracing::info;

const MODEL_URL: &str = "https://huggingface.co/onnx-community/all-MiniLM-L6-v2-ONNX/resolve/main/onnx/model_quantized.onnx";
const TOKENIZER_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json";

/// Manages ONNX model download and path resolution.
pub struct ModelManager {
    data_dir: PathBuf,
    model_url: String,
    tokenizer_url: String,
    /// Concurrent callers share one download.
    ready: OnceCell<PathBuf>,
}

impl ModelManager {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            model_url: MODEL_URL.to_string(),
            tokenizer_url: TOKENIZER_URL.to_string(),
            ready: OnceCell::new(),
        }
    }

    /// Download from mirrors instead of HuggingFace.
    pub fn with_urls(mut self, model_url: impl Into<String>, tokenizer_url: impl Into<String>) -> Self {
        self.model_url = model_url.into();
        self.tokenizer_url = tokenizer_url.into();
        self
    }

    pub fn model_dir(&self) -> PathBuf {
        self.data_dir.join("models").join("all-MiniLM-L6-v2")
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_dir().join("model.onnx")
    }

    pub fn tokenizer_path(&self) -> PathBuf {
        self.model_dir().join("tokenizer.json")
    }

    /// True if both model and tokenizer files exist.
    pub fn is_model_available(&self) -> bool {
        self.model_path().exists() && self.tokenizer_path().exists()
    }

    /// Ensures the model is on disk, downloading it on first use.
    pub async fn ensure_model(&self) -> Result<PathBuf, MnemosError> {
        self.ready
            .get_or_try_init(|| self.download_missing())
            .await
            .cloned()
    }

    async fn download_missing(&self) -> Result<PathBuf, MnemosError> {
        if self.is_model_available() {
            return Ok(self.model_path());
        }

        info!("embedding model not found, downloading");
        let model_dir = self.model_dir();
        tokio::fs::create_dir_all(&model_dir).await.map_err(|e| {
            MnemosError::Internal(format!("failed to create {}: {e}", model_dir.display()))
        })?;

        let files = [
            ("model.onnx", self.model_url.as_str()),
            ("tokenizer.json", self.tokenizer_url.as_str()),
        ];
        for (filename, url) in files {
            let dest = model_dir.join(filename);
            if dest.exists() {
                continue;
            }
            match download_file(url, &dest).await {
                Ok(size) => info!(file = filename, size, "downloaded"),
                Err(e) => {
                    // Remove the partial file so the next start retries.
                    let _ = tokio::fs::remove_file(&dest).await;
                    return Err(e);
                }
            }
        }

        info!(path = %model_dir.display(), "embedding model ready");
        Ok(self.model_path())
    }
}

async fn download_file(url: &str, dest: &Path) -> Result<usize, MnemosError> {
    let response = reqwest::get(url)
        .await
        .map_err(|e| MnemosError::Internal(format!("failed to download {url}: {e}")))?;

    if !response.status().is_success() {
        return Err(MnemosError::Internal(format!(
            "download failed with status {}: {url}",
            response.status()
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| MnemosError::Internal(format!("failed to read body from {url}: {e}")))?;

    tokio::fs::write(dest, &bytes)
        .await
        .map_err(|e| MnemosError::Internal(format!("failed to write {}: {e}", dest.display())))?;
    Ok(bytes.len())
}
