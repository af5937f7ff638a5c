// SPDX-FileCopyrightText: 2026 Alfred Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding adapter backed by a local Ollama daemon.
//!
//! Uses the native batch endpoint `POST /api/embed`. Availability is a
//! short `GET /api/tags` against the daemon.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use alfred_config::model::{OllamaConfig, PROVIDER_OLLAMA};
use alfred_core::{AdapterType, AlfredError, EmbeddingAdapter, HealthStatus, PluginAdapter};

pub struct OllamaEmbedder {
    client: reqwest::Client,
    host: String,
    model: String,
    dimensions: usize,
    probe_timeout: Duration,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedder {
    pub fn new(
        config: &OllamaConfig,
        dimensions: usize,
        probe_timeout: Duration,
    ) -> Result<Self, AlfredError> {
        let host = config.host.trim_end_matches('/').to_string();
        if !(host.starts_with("http://") || host.starts_with("https://")) {
            return Err(AlfredError::Config(format!(
                "embedding.ollama.host must be an http(s) URL, got `{host}`"
            )));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(probe_timeout)
            .build()
            .map_err(|e| AlfredError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            host,
            model: config.model.clone(),
            dimensions,
            probe_timeout,
        })
    }

    fn failure(&self, message: impl Into<String>) -> AlfredError {
        AlfredError::Embedding {
            provider: PROVIDER_OLLAMA.to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl PluginAdapter for OllamaEmbedder {
    fn name(&self) -> &str {
        PROVIDER_OLLAMA
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, AlfredError> {
        if self.is_available().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy(format!(
                "ollama daemon not reachable at {}",
                self.host
            )))
        }
    }

    async fn shutdown(&self) -> Result<(), AlfredError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for OllamaEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.host);
        match self
            .client
            .get(&url)
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "ollama probe failed");
                false
            }
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AlfredError> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| self.failure("empty response"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AlfredError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.host);
        let response = self
            .client
            .post(&url)
            .json(&EmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| AlfredError::ProviderUnavailable {
                provider: PROVIDER_OLLAMA.to_string(),
                reason: format!("request failed: {e}"),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(self.failure(format!("API error {status}: {body}")));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| self.failure(format!("parse error: {e}")))?;

        debug!(model = %self.model, count = parsed.embeddings.len(), "ollama embeddings generated");
        Ok(parsed.embeddings)
    }
}
