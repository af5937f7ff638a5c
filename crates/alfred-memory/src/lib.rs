// SPDX-FileCopyrightText: 2026 Alfred Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local memory engine for Alfred.
//!
//! Stores memories as text plus a unit-normalized embedding in SQLite and
//! recalls them with hybrid search: exact cosine similarity fused with BM25
//! through weighted Reciprocal Rank Fusion. Embeddings come from an ordered
//! fallback chain of providers (local ONNX model, Ollama, OpenAI).

pub mod bm25;
pub mod embedding;
pub mod engine;
pub mod fusion;
pub mod hybrid;
pub mod model_manager;
pub mod store;
pub mod types;

pub use bm25::{tokenize, Bm25Index, Bm25Params};
pub use embedding::{build_chain, normalize, EmbeddingChain};
pub use engine::MemoryEngine;
pub use fusion::{reciprocal_rank_fusion, RankedList, DEFAULT_RRF_K};
pub use hybrid::HybridSearch;
pub use model_manager::ModelManager;
pub use store::MemoryStore;
pub use types::{
    MemoryFilter, MemoryRecord, Metadata, NewMemory, ProviderStatus, ScoredMemory, SearchHit,
    SearchOptions,
};
