// SPDX-FileCopyrightText: 2026 Alfred Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding providers and the fallback chain that orders them.

pub mod chain;
pub mod ollama;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use alfred_config::model::{AlfredConfig, PROVIDER_OLLAMA, PROVIDER_ONNX, PROVIDER_OPENAI};
use alfred_core::{AlfredError, EmbeddingAdapter};

pub use chain::EmbeddingChain;
pub use ollama::OllamaEmbedder;
#[cfg(feature = "onnx")]
pub use onnx::{OnnxEmbedder, OnnxModel};
pub use openai::OpenAiEmbedder;

/// L2-normalize a vector. The zero vector is returned unchanged.
///
/// The norm is accumulated in f64 so very small components do not
/// underflow to a zero norm.
pub fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector
        .iter()
        .map(|&v| f64::from(v) * f64::from(v))
        .sum::<f64>()
        .sqrt();
    if norm > 0.0 && norm.is_finite() {
        for v in &mut vector {
            *v = (f64::from(*v) / norm) as f32;
        }
    }
    vector
}

/// Build the embedding chain described by `[embedding]`.
///
/// Providers are constructed in configured order. One that cannot be built
/// (model files missing, bad URL, wrong dimensionality) is skipped with a
/// warning. Remote providers are never built while `privacy.local_only` is set.
pub async fn build_chain(config: &AlfredConfig) -> Result<EmbeddingChain, AlfredError> {
    let embedding = &config.embedding;
    let probe_timeout = Duration::from_millis(embedding.probe_timeout_ms);
    let embed_timeout = Duration::from_millis(embedding.embed_timeout_ms);

    let mut providers: Vec<Arc<dyn EmbeddingAdapter>> = Vec::new();
    for name in &embedding.providers {
        let built = match name.as_str() {
            PROVIDER_ONNX => build_onnx(config).await,
            PROVIDER_OLLAMA => OllamaEmbedder::new(&embedding.ollama, embedding.dimensions, probe_timeout)
                .map(|p| Some(Arc::new(p) as Arc<dyn EmbeddingAdapter>)),
            PROVIDER_OPENAI if config.privacy.local_only => {
                info!(provider = %name, "privacy.local_only is set, remote provider not enabled");
                Ok(None)
            }
            PROVIDER_OPENAI => OpenAiEmbedder::new(&embedding.openai, embedding.dimensions)
                .map(|p| Some(Arc::new(p) as Arc<dyn EmbeddingAdapter>)),
            other => {
                warn!(provider = %other, "unknown embedding provider, skipping");
                Ok(None)
            }
        };

        match built {
            Ok(Some(provider)) if provider.dimensions() != embedding.dimensions => {
                warn!(
                    provider = %name,
                    dims = provider.dimensions(),
                    expected = embedding.dimensions,
                    "embedding provider dimensionality differs from embedding.dimensions, skipping"
                );
            }
            Ok(Some(provider)) => providers.push(provider),
            Ok(None) => {}
            Err(e) => warn!(provider = %name, error = %e, "embedding provider could not be built, skipping"),
        }
    }

    if providers.is_empty() {
        warn!("no embedding providers could be built; inserts and searches will fail");
    }

    Ok(EmbeddingChain::new(providers)?.with_timeouts(probe_timeout, embed_timeout))
}

#[cfg(feature = "onnx")]
async fn build_onnx(config: &AlfredConfig) -> Result<Option<Arc<dyn EmbeddingAdapter>>, AlfredError> {
    use crate::model_manager::ModelManager;

    let onnx = &config.embedding.onnx;
    let manager = ModelManager::new(onnx.resolved_data_dir(), &onnx.model_name);
    if !manager.is_model_available() {
        if !onnx.auto_download {
            return Err(AlfredError::ProviderUnavailable {
                provider: PROVIDER_ONNX.to_string(),
                reason: format!(
                    "model files missing in {} (set embedding.onnx.auto_download = true)",
                    manager.model_dir().display()
                ),
            });
        }
        manager.ensure_model().await?;
    }
    let model = manager.load()?;
    Ok(Some(Arc::new(OnnxEmbedder::new(model))))
}

#[cfg(not(feature = "onnx"))]
async fn build_onnx(_config: &AlfredConfig) -> Result<Option<Arc<dyn EmbeddingAdapter>>, AlfredError> {
    Err(AlfredError::ProviderUnavailable {
        provider: PROVIDER_ONNX.to_string(),
        reason: "built without the `onnx` feature".to_string(),
    })
}
