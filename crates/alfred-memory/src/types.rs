// SPDX-FileCopyrightText: 2026 Alfred Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory domain types for the local memory engine.

use serde::{Deserialize, Serialize};

/// Free-form, JSON-shaped metadata carried through the engine unexamined.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A single stored memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique identifier, immutable once assigned.
    pub id: String,
    /// The literal memory text. Never empty.
    pub content: String,
    /// Unit-normalized embedding of `content`.
    #[serde(skip)]
    pub embedding: Vec<f32>,
    /// Pass-through provenance (source, confidence, timestamps, ...).
    #[serde(default)]
    pub metadata: Metadata,
    /// Coarse topic labels, sorted and de-duplicated.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Owning agent, `None` when unscoped.
    pub agent_id: Option<String>,
    /// Owning session, `None` when unscoped.
    pub session_id: Option<String>,
    /// ISO 8601 creation timestamp.
    pub created_at: String,
    /// ISO 8601 last-update timestamp.
    pub updated_at: String,
}

/// What an upstream caller hands over to be remembered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewMemory {
    /// Explicit id; a UUID v4 is assigned when `None`.
    pub id: Option<String>,
    pub content: String,
    pub metadata: Metadata,
    pub tags: Vec<String>,
    pub agent_id: Option<String>,
    pub session_id: Option<String>,
}

impl NewMemory {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Candidate restriction shared by vector and lexical retrieval.
///
/// `agent_id` and `session_id` are equality filters; `tags` matches records
/// carrying any of the listed tags. Empty fields do not restrict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryFilter {
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl MemoryFilter {
    /// True when the filter lets every record through.
    pub fn is_empty(&self) -> bool {
        self.agent_id.is_none() && self.session_id.is_none() && self.tags.is_empty()
    }

    pub fn agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// A record ranked by cosine similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMemory {
    pub record: MemoryRecord,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
}

/// Per-query knobs for hybrid search. `None` falls back to `[memory]` config.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOptions {
    pub limit: Option<usize>,
    pub filter: MemoryFilter,
    pub vector_weight: Option<f64>,
    pub bm25_weight: Option<f64>,
}

impl SearchOptions {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_filter(mut self, filter: MemoryFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_weights(mut self, vector_weight: f64, bm25_weight: f64) -> Self {
        self.vector_weight = Some(vector_weight);
        self.bm25_weight = Some(bm25_weight);
        self
    }
}

/// One entry of a hybrid search result.
///
/// Both raw sub-scores are kept for observability; a `None` means the
/// record was not among that retriever's candidates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub content: String,
    /// Weighted reciprocal rank fusion score.
    pub score: f64,
    pub vector_score: Option<f32>,
    pub bm25_score: Option<f64>,
    pub metadata: Metadata,
}

/// A single embedding and the provider that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbedResult {
    pub embedding: Vec<f32>,
    pub provider: String,
}

/// A batch of embeddings, all produced by one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEmbedResult {
    pub embeddings: Vec<Vec<f32>>,
    /// Empty when the input batch was empty and no provider was consulted.
    pub provider: String,
}

/// Availability snapshot of one chain member, as reported to `doctor`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub dimensions: usize,
    pub available: bool,
}

/// Convert f32 vector to bytes for SQLite BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert SQLite BLOB back to f32 vector. Trailing bytes that do not form
/// a whole `f32` are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two unit vectors.
///
/// Stored and query embeddings are L2-normalized, so this is the dot
/// product. Callers check lengths first; a length mismatch only compares
/// the common prefix.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "vectors must have same length");
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_memory_builder_collects_fields() {
        let memory = NewMemory::new("User's dog is named Max")
            .with_id("mem-1")
            .with_tag("pets")
            .with_agent("a")
            .with_session("s")
            .with_metadata("confidence", 0.9);
        assert_eq!(memory.id.as_deref(), Some("mem-1"));
        assert_eq!(memory.tags, vec!["pets"]);
        assert_eq!(memory.agent_id.as_deref(), Some("a"));
        assert_eq!(memory.session_id.as_deref(), Some("s"));
        assert_eq!(memory.metadata["confidence"], serde_json::json!(0.9));
    }

    #[test]
    fn default_filter_is_empty() {
        assert!(MemoryFilter::default().is_empty());
        assert!(!MemoryFilter::default().tag("x").is_empty());
        assert!(!MemoryFilter::default().agent("a").is_empty());
    }

    #[test]
    fn vec_to_blob_roundtrip() {
        let original = vec![0.1_f32, 0.2, 0.3, -0.5, 1.0];
        let blob = vec_to_blob(&original);
        assert_eq!(blob.len(), original.len() * 4);
        assert_eq!(blob_to_vec(&blob), original);
    }

    #[test]
    fn blob_with_trailing_bytes_ignores_remainder() {
        let mut blob = vec_to_blob(&[1.0]);
        blob.push(0xff);
        assert_eq!(blob_to_vec(&blob), vec![1.0]);
    }

    #[test]
    fn cosine_similarity_of_unit_vector_with_itself_is_one() {
        let v = [0.6_f32, 0.8];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn search_hit_serializes_sub_scores() {
        let hit = SearchHit {
            id: "m1".into(),
            content: "c".into(),
            score: 0.5,
            vector_score: Some(0.25),
            bm25_score: None,
            metadata: Metadata::new(),
        };
        let json = serde_json::to_value(&hit).unwrap();
        assert_eq!(json["vector_score"], serde_json::json!(0.25));
        assert!(json["bm25_score"].is_null());
    }
}
