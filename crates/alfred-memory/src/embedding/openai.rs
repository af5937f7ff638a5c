// SPDX-FileCopyrightText: 2026 Alfred Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI-compatible remote embedding adapter.
//!
//! Only constructed when `privacy.local_only` is off. Requests the
//! configured dimensionality through the `dimensions` parameter so the
//! remote model can share a store with the local ones.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use alfred_config::model::{OpenAiConfig, PROVIDER_OPENAI};
use alfred_core::{AdapterType, AlfredError, EmbeddingAdapter, HealthStatus, PluginAdapter};

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    dimensions: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(config: &OpenAiConfig, dimensions: usize) -> Result<Self, AlfredError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AlfredError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dimensions,
        })
    }

    fn failure(&self, message: impl Into<String>) -> AlfredError {
        AlfredError::Embedding {
            provider: PROVIDER_OPENAI.to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl PluginAdapter for OpenAiEmbedder {
    fn name(&self) -> &str {
        PROVIDER_OPENAI
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, AlfredError> {
        if self.api_key.is_some() {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy("no API key configured".to_string()))
        }
    }

    async fn shutdown(&self) -> Result<(), AlfredError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for OpenAiEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Configured key only; no network round trip.
    async fn is_available(&self) -> bool {
        self.api_key.is_some()
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
        let api_key = self.api_key.as_ref().ok_or_else(|| AlfredError::ProviderUnavailable {
            provider: PROVIDER_OPENAI.to_string(),
            reason: "no API key configured".to_string(),
        })?;

        let url = format!("{}/embeddings", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&EmbeddingRequest {
                input: texts,
                model: &self.model,
                dimensions: self.dimensions,
            })
            .send()
            .await
            .map_err(|e| AlfredError::ProviderUnavailable {
                provider: PROVIDER_OPENAI.to_string(),
                reason: format!("request failed: {e}"),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(self.failure(format!("API error {status}: {body}")));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| self.failure(format!("parse error: {e}")))?;

        // The API may answer out of order; `index` is authoritative.
        parsed.data.sort_by_key(|d| d.index);
        debug!(model = %self.model, count = parsed.data.len(), "openai embeddings generated");
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}
