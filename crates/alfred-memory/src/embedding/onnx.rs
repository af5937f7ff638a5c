// SPDX-FileCopyrightText: 2026 Alfred Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! ONNX embedding adapter for local inference using all-MiniLM-L6-v2.
//!
//! Produces 384-dimensional embeddings on CPU with zero external API calls.
//! Inference runs on the blocking thread pool so the async runtime keeps
//! serving store operations meanwhile.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::Array2;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

use alfred_config::model::PROVIDER_ONNX;
use alfred_core::{AdapterType, AlfredError, EmbeddingAdapter, HealthStatus, PluginAdapter};

/// Embedding dimensions for all-MiniLM-L6-v2.
pub const EMBEDDING_DIM: usize = 384;

/// A loaded model: ONNX Runtime session plus its tokenizer.
///
/// Built once (usually by [`crate::model_manager::ModelManager::load`]) and
/// moved into the [`OnnxEmbedder`] that owns it.
pub struct OnnxModel {
    session: Mutex<Session>,
    tokenizer: tokenizers::Tokenizer,
}

impl OnnxModel {
    /// Load the model and tokenizer from disk.
    pub fn load(model_path: &Path, tokenizer_path: &Path) -> Result<Self, AlfredError> {
        let tokenizer = tokenizers::Tokenizer::from_file(tokenizer_path).map_err(|e| {
            unavailable(format!(
                "failed to load tokenizer from {}: {e}",
                tokenizer_path.display()
            ))
        })?;

        let session = Session::builder()
            .map_err(|e| unavailable(format!("failed to create ONNX session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| unavailable(format!("failed to set optimization level: {e}")))?
            .with_intra_threads(1)
            .map_err(|e| unavailable(format!("failed to set thread count: {e}")))?
            .commit_from_file(model_path)
            .map_err(|e| {
                unavailable(format!(
                    "failed to load ONNX model from {}: {e}",
                    model_path.display()
                ))
            })?;

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }

    /// Embed a single text string, returning a mean-pooled, unnormalized vector.
    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>, AlfredError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| failure(format!("tokenization failed: {e}")))?;

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| i64::from(id)).collect();
        let attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| i64::from(m))
            .collect();
        let token_type_ids: Vec<i64> = encoding
            .get_type_ids()
            .iter()
            .map(|&t| i64::from(t))
            .collect();

        let seq_len = input_ids.len();
        let to_array = |values: Vec<i64>, label: &str| {
            Array2::from_shape_vec((1, seq_len), values)
                .map_err(|e| failure(format!("failed to shape {label} tensor: {e}")))
        };
        let input_ids_array = to_array(input_ids, "input_ids")?;
        let attention_mask_array = to_array(attention_mask.clone(), "attention_mask")?;
        let token_type_ids_array = to_array(token_type_ids, "token_type_ids")?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| failure(format!("ONNX session lock poisoned: {e}")))?;

        let input_ids_tensor = TensorRef::from_array_view(&input_ids_array)
            .map_err(|e| failure(format!("input_ids tensor: {e}")))?;
        let attention_mask_tensor = TensorRef::from_array_view(&attention_mask_array)
            .map_err(|e| failure(format!("attention_mask tensor: {e}")))?;
        let token_type_ids_tensor = TensorRef::from_array_view(&token_type_ids_array)
            .map_err(|e| failure(format!("token_type_ids tensor: {e}")))?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor
            ])
            .map_err(|e| failure(format!("ONNX inference failed: {e}")))?;

        // Output shape: [1, seq_len, hidden]
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| failure(format!("failed to extract output tensor: {e}")))?;
        let hidden_size = shape
            .last()
            .map(|&d| d as usize)
            .ok_or_else(|| failure("output tensor has no dimensions"))?;

        Ok(mean_pool_with_attention(data, &attention_mask, seq_len, hidden_size))
    }

    fn is_healthy(&self) -> bool {
        self.session.lock().is_ok()
    }
}

/// Local all-MiniLM-L6-v2 embedder.
pub struct OnnxEmbedder {
    model: Arc<OnnxModel>,
}

impl OnnxEmbedder {
    pub fn new(model: OnnxModel) -> Self {
        Self {
            model: Arc::new(model),
        }
    }
}

fn unavailable(reason: String) -> AlfredError {
    AlfredError::ProviderUnavailable {
        provider: PROVIDER_ONNX.to_string(),
        reason,
    }
}

fn failure(message: impl Into<String>) -> AlfredError {
    AlfredError::Embedding {
        provider: PROVIDER_ONNX.to_string(),
        message: message.into(),
    }
}

/// Apply attention-masked mean pooling over token embeddings.
fn mean_pool_with_attention(
    embeddings: &[f32],
    attention_mask: &[i64],
    seq_len: usize,
    hidden_size: usize,
) -> Vec<f32> {
    let mut sum = vec![0.0f32; hidden_size];
    let mut count = 0.0f32;

    for (token, &mask) in attention_mask.iter().enumerate().take(seq_len) {
        if mask > 0 {
            let row = &embeddings[token * hidden_size..(token + 1) * hidden_size];
            for (acc, value) in sum.iter_mut().zip(row) {
                *acc += value;
            }
            count += 1.0;
        }
    }

    if count > 0.0 {
        for val in &mut sum {
            *val /= count;
        }
    }

    sum
}

#[async_trait]
impl PluginAdapter for OnnxEmbedder {
    fn name(&self) -> &str {
        PROVIDER_ONNX
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, AlfredError> {
        if self.model.is_healthy() {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy("session lock poisoned".to_string()))
        }
    }

    async fn shutdown(&self) -> Result<(), AlfredError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for OnnxEmbedder {
    fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }

    async fn is_available(&self) -> bool {
        self.model.is_healthy()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AlfredError> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();
        tokio::task::spawn_blocking(move || model.embed_text(&text))
            .await
            .map_err(|e| failure(format!("inference task failed: {e}")))?
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AlfredError> {
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || {
            texts
                .iter()
                .map(|text| model.embed_text(text))
                .collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(|e| failure(format!("inference task failed: {e}")))?
    }
}
