// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Remote embedding provider for OpenAI-compatible `/v1/embeddings` endpoints.
//!
//! Every request races the caller's cancellation token and a per-request
//! timeout. Timeouts, connection failures, 429 and 5xx responses are
//! reported as retryable; everything else is fatal. Retrying is left to
//! the memory manager.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use mnemos_config::EmbeddingConfig;
use mnemos_core::{EmbeddingProvider, MnemosError};

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

fn transport_error(e: reqwest::Error) -> MnemosError {
    let retryable = e.is_timeout() || e.is_connect();
    MnemosError::Embedding {
        message: format!("embedding request failed: {e}"),
        retryable,
        source: Some(Box::new(e)),
    }
}

fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// HTTP client for a remote embedding service.
#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dimensions: usize,
    timeout: Duration,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, MnemosError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &config.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| MnemosError::Config(format!("invalid API key header value: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| MnemosError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: format!("{}/v1/embeddings", config.endpoint.trim_end_matches('/')),
            model: config.model.clone(),
            dimensions: config.dimensions,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// Embed non-blank `inputs` in one request.
    async fn request(
        &self,
        inputs: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>, MnemosError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(MnemosError::embedding_fatal("embedding cancelled")),
            outcome = tokio::time::timeout(self.timeout, self.send(inputs)) => match outcome {
                Ok(result) => result,
                Err(_) => Err(MnemosError::embedding_retryable(format!(
                    "embedding request timed out after {}s",
                    self.timeout.as_secs()
                ))),
            },
        }
    }

    async fn send(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, MnemosError> {
        let body = EmbeddingsRequest {
            model: &self.model,
            input: inputs,
        };
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        debug!(status = %status, inputs = inputs.len(), "embedding response received");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("embedding service returned {status}: {body}");
            return Err(if is_transient(status) {
                MnemosError::embedding_retryable(message)
            } else {
                MnemosError::embedding_fatal(message)
            });
        }

        let parsed: EmbeddingsResponse = response.json().await.map_err(|e| {
            MnemosError::Embedding {
                message: format!("malformed embedding response: {e}"),
                retryable: false,
                source: Some(Box::new(e)),
            }
        })?;

        let mut data = parsed.data;
        if data.len() != inputs.len() {
            return Err(MnemosError::embedding_fatal(format!(
                "embedding service returned {} vectors for {} inputs",
                data.len(),
                inputs.len()
            )));
        }
        data.sort_by_key(|d| d.index);

        if let Some(bad) = data.iter().find(|d| d.embedding.len() != self.dimensions) {
            return Err(MnemosError::embedding_fatal(format!(
                "embedding service returned {} dimensions, expected {}",
                bad.embedding.len(),
                self.dimensions
            )));
        }
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedder {
    fn name(&self) -> &str {
        "http"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<f32>, MnemosError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let mut vectors = self.request(&[text.to_string()], cancel).await?;
        vectors
            .pop()
            .ok_or_else(|| MnemosError::embedding_fatal("embedding service returned no vectors"))
    }

    /// One request for all non-blank texts; blank texts map to empty vectors.
    async fn embed_batch(
        &self,
        texts: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>, MnemosError> {
        let (positions, inputs): (Vec<usize>, Vec<String>) = texts
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.trim().is_empty())
            .map(|(i, t)| (i, t.clone()))
            .unzip();

        let mut out = vec![Vec::new(); texts.len()];
        if inputs.is_empty() {
            return Ok(out);
        }
        let vectors = self.request(&inputs, cancel).await?;
        for (position, vector) in positions.into_iter().zip(vectors) {
            out[position] = vector;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(endpoint: String, dimensions: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            endpoint,
            api_key: Some("sk-test".into()),
            dimensions,
            timeout_secs: 1,
            ..EmbeddingConfig::default()
        }
    }

    #[tokio::test]
    async fn embeds_with_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"model": "text-embedding-3-small"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"index": 0, "embedding": [0.1, 0.2, 0.3]}]
            })))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(&config(server.uri(), 3)).unwrap();
        let v = embedder
            .embed("likes dark mode", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(v, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn batch_keeps_order_and_skips_blank() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"input": ["a", "b"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"index": 1, "embedding": [0.0, 1.0]},
                    {"index": 0, "embedding": [1.0, 0.0]}
                ]
            })))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(&config(server.uri(), 2)).unwrap();
        let texts = vec!["a".to_string(), " ".to_string(), "b".to_string()];
        let out = embedder
            .embed_batch(&texts, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, vec![vec![1.0, 0.0], vec![], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn rate_limit_is_retryable_bad_request_is_not() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"input": ["busy"]})))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"input": ["bad"]})))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad input"))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(&config(server.uri(), 2)).unwrap();
        let cancel = CancellationToken::new();
        assert!(embedder.embed("busy", &cancel).await.unwrap_err().is_retryable());
        assert!(!embedder.embed("bad", &cancel).await.unwrap_err().is_retryable());
    }

    #[tokio::test]
    async fn timeout_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(3))
                    .set_body_json(json!({"data": []})),
            )
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(&config(server.uri(), 2)).unwrap();
        let err = embedder
            .embed("slow", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_retryable(), "{err}");
    }

    #[tokio::test]
    async fn cancellation_is_not_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(&config(server.uri(), 2)).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = embedder.embed("x", &cancel).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn wrong_dimensions_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"index": 0, "embedding": [1.0, 2.0, 3.0]}]
            })))
            .mount(&server)
            .await;

        let embedder = HttpEmbedder::new(&config(server.uri(), 2)).unwrap();
        let err = embedder
            .embed("x", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }
}
