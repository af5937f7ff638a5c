// SPDX-FileCopyrightText: 2026 Alfred Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding adapter trait for vector embedding generation.

use async_trait::async_trait;

use crate::error::AlfredError;
use crate::traits::adapter::PluginAdapter;

/// Adapter turning text into fixed-length vectors.
///
/// Implementations are swappable and ordered by an embedding chain; nothing
/// outside the adapter knows which backend it talks to. Returned vectors do
/// not need to be normalized: the chain normalizes every output.
#[async_trait]
pub trait EmbeddingAdapter: PluginAdapter {
    /// Fixed length of every vector this adapter produces.
    fn dimensions(&self) -> usize;

    /// Cheap liveness probe. Must not perform an embedding.
    async fn is_available(&self) -> bool;

    /// Embeds a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AlfredError>;

    /// Embeds a batch of texts, one vector per input in input order.
    ///
    /// Default implementation calls `embed` for each text sequentially.
    /// Backends with a native batch API should override this.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AlfredError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}
