// SPDX-FileCopyrightText: 2026 Alfred Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the memory engine over a real SQLite database.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use alfred_config::model::MemoryConfig;
use alfred_core::{AdapterType, AlfredError, EmbeddingAdapter, HealthStatus, PluginAdapter};
use alfred_memory::{
    EmbeddingChain, MemoryEngine, MemoryFilter, NewMemory, SearchOptions, tokenize,
};
use alfred_storage::Database;

const DIMS: usize = 16;

/// Deterministic bag-of-words embedder: each index term lands in a bucket.
struct HashingEmbedder {
    calls: AtomicUsize,
}

impl HashingEmbedder {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

fn bucket(term: &str) -> usize {
    term.bytes()
        .fold(5381usize, |h, b| h.wrapping_mul(33) ^ usize::from(b))
        % DIMS
}

fn hashed(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for term in tokenize(text) {
        v[bucket(&term)] += 1.0;
    }
    v
}

#[async_trait]
impl PluginAdapter for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }
    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }
    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }
    async fn health_check(&self) -> Result<HealthStatus, AlfredError> {
        Ok(HealthStatus::Healthy)
    }
    async fn shutdown(&self) -> Result<(), AlfredError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for HashingEmbedder {
    fn dimensions(&self) -> usize {
        DIMS
    }
    async fn is_available(&self) -> bool {
        true
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AlfredError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(hashed(text))
    }
}

/// Always unavailable.
struct Offline;

#[async_trait]
impl PluginAdapter for Offline {
    fn name(&self) -> &str {
        "offline"
    }
    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }
    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }
    async fn health_check(&self) -> Result<HealthStatus, AlfredError> {
        Ok(HealthStatus::Unhealthy("offline".into()))
    }
    async fn shutdown(&self) -> Result<(), AlfredError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for Offline {
    fn dimensions(&self) -> usize {
        DIMS
    }
    async fn is_available(&self) -> bool {
        false
    }
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, AlfredError> {
        Err(AlfredError::ProviderUnavailable {
            provider: "offline".into(),
            reason: "down".into(),
        })
    }
}

async fn engine_with(providers: Vec<Arc<dyn EmbeddingAdapter>>, memory: MemoryConfig) -> MemoryEngine {
    let db = Database::open_in_memory().await.unwrap();
    let chain = EmbeddingChain::new(providers).unwrap();
    MemoryEngine::from_parts(db, chain, memory, DIMS).await.unwrap()
}

async fn engine() -> MemoryEngine {
    engine_with(vec![Arc::new(HashingEmbedder::new()) as Arc<dyn EmbeddingAdapter>], MemoryConfig::default()).await
}

async fn seed(engine: &MemoryEngine) {
    for (id, text) in [
        ("1", "the cat sat on the mat"),
        ("2", "dogs are loyal companions"),
        ("3", "cats and dogs are pets"),
    ] {
        engine.insert(NewMemory::new(text).with_id(id)).await.unwrap();
    }
}

#[tokio::test]
async fn cat_query_finds_cat_documents_first() {
    let engine = engine().await;
    seed(&engine).await;

    let hits = engine.search("cat", &SearchOptions::default()).await.unwrap();
    assert_eq!(hits[0].id, "1");
    let lexical: Vec<&str> = hits
        .iter()
        .filter(|h| h.bm25_score.is_some())
        .map(|h| h.id.as_str())
        .collect();
    assert_eq!(lexical.len(), 2);
    assert!(lexical.contains(&"1") && lexical.contains(&"3"));
}

#[tokio::test]
async fn fts_disabled_uses_bm25_rebuild_with_same_best_match() {
    let memory = MemoryConfig {
        fts_acceleration: false,
        ..MemoryConfig::default()
    };
    let engine = engine_with(vec![Arc::new(HashingEmbedder::new()) as Arc<dyn EmbeddingAdapter>], memory).await;
    seed(&engine).await;

    let hits = engine.search("cat", &SearchOptions::default()).await.unwrap();
    assert_eq!(hits[0].id, "1");
    assert!(hits.iter().any(|h| h.id == "3" && h.bm25_score.is_some()));
    assert!(hits.iter().any(|h| h.id == "2" && h.bm25_score.is_none()));
}

#[tokio::test]
async fn deleted_record_disappears_from_both_retrievers_immediately() {
    for fts_acceleration in [true, false] {
        let memory = MemoryConfig {
            fts_acceleration,
            ..MemoryConfig::default()
        };
        let engine = engine_with(vec![Arc::new(HashingEmbedder::new()) as Arc<dyn EmbeddingAdapter>], memory).await;
        seed(&engine).await;
        // Warm any cached lexical state.
        engine.search("cat", &SearchOptions::default()).await.unwrap();

        assert!(engine.delete("1").await.unwrap());
        let hits = engine.search("cat", &SearchOptions::default()).await.unwrap();
        assert!(hits.iter().all(|h| h.id != "1"));

        let vector = engine
            .store()
            .vector_search(&alfred_memory::normalize(hashed("cat mat")), 10, &MemoryFilter::default())
            .await
            .unwrap();
        assert!(vector.iter().all(|h| h.record.id != "1"));
        assert!(engine.get("1").await.unwrap().is_none());
    }
}

#[tokio::test]
async fn agent_filter_returns_exactly_one_of_identical_records() {
    let engine = engine().await;
    engine
        .insert(NewMemory::new("prefers window seats").with_agent("a"))
        .await
        .unwrap();
    engine
        .insert(NewMemory::new("prefers window seats").with_agent("b"))
        .await
        .unwrap();

    let query = alfred_memory::normalize(hashed("prefers window seats"));
    let hits = engine
        .store()
        .vector_search(&query, 10, &MemoryFilter::default().agent("a"))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].record.agent_id.as_deref(), Some("a"));
    assert!((hits[0].score - 1.0).abs() < 1e-5);

    let options = SearchOptions::default().with_filter(MemoryFilter::default().agent("a"));
    assert_eq!(engine.search("window seats", &options).await.unwrap().len(), 1);
}

#[tokio::test]
async fn vector_only_weights_reproduce_vector_search_order() {
    let engine = engine().await;
    seed(&engine).await;
    engine
        .insert(NewMemory::new("a loyal cat waits by the door"))
        .await
        .unwrap();

    let query = alfred_memory::normalize(hashed("loyal cat"));
    let options = SearchOptions::default().with_weights(1.0, 0.0);
    let hybrid = engine
        .search_with_embedding("loyal cat", &query, &options)
        .await
        .unwrap();
    let vector = engine
        .store()
        .vector_search(&query, 10, &MemoryFilter::default())
        .await
        .unwrap();

    let hybrid_ids: Vec<&str> = hybrid.iter().map(|h| h.id.as_str()).collect();
    let vector_ids: Vec<&str> = vector.iter().map(|h| h.record.id.as_str()).collect();
    assert_eq!(hybrid_ids, vector_ids);
}

#[tokio::test]
async fn unavailable_chain_fails_search_and_insert() {
    let engine = engine_with(vec![Arc::new(Offline) as Arc<dyn EmbeddingAdapter>], MemoryConfig::default()).await;

    match engine.search("anything", &SearchOptions::default()).await {
        Err(AlfredError::AllProvidersFailed { failures }) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].provider, "offline");
        }
        other => panic!("expected AllProvidersFailed, got {other:?}"),
    }
    assert!(engine.insert(NewMemory::new("kept?")).await.is_err());
    assert_eq!(engine.count().await.unwrap(), 0);
}

#[tokio::test]
async fn fallback_provider_serves_when_first_is_offline() {
    let engine = engine_with(
        vec![
            Arc::new(Offline) as Arc<dyn EmbeddingAdapter>,
            Arc::new(HashingEmbedder::new()),
        ],
        MemoryConfig::default(),
    )
    .await;
    let record = engine.insert(NewMemory::new("remember the milk")).await.unwrap();
    assert_eq!(engine.get(&record.id).await.unwrap().unwrap().content, "remember the milk");

    let status = engine.provider_status().await;
    let available: Vec<bool> = status.iter().map(|s| s.available).collect();
    assert_eq!(available, vec![false, true]);
}

#[tokio::test]
async fn insert_batch_embeds_once_per_text_and_stores_all() {
    let embedder = Arc::new(HashingEmbedder::new());
    let engine = engine_with(vec![embedder.clone() as Arc<dyn EmbeddingAdapter>], MemoryConfig::default()).await;

    let records = engine
        .insert_batch(vec![
            NewMemory::new("first memory").with_tag("a"),
            NewMemory::new("second memory").with_tag("b"),
        ])
        .await
        .unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(engine.count().await.unwrap(), 2);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);

    let tagged = engine.list(&MemoryFilter::default().tag("b")).await.unwrap();
    assert_eq!(tagged.len(), 1);
    assert_eq!(tagged[0].content, "second memory");
}

#[tokio::test]
async fn empty_content_is_rejected_before_embedding() {
    let embedder = Arc::new(HashingEmbedder::new());
    let engine = engine_with(vec![embedder.clone() as Arc<dyn EmbeddingAdapter>], MemoryConfig::default()).await;
    assert!(matches!(
        engine.insert(NewMemory::new("   ")).await,
        Err(AlfredError::InvalidInput(_))
    ));
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn update_reembeds_and_keeps_identity() {
    let engine = engine().await;
    let record = engine
        .insert(NewMemory::new("favourite drink is tea").with_tag("prefs"))
        .await
        .unwrap();

    let updated = engine
        .update(&record.id, "favourite drink is coffee")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.id, record.id);
    assert_eq!(updated.tags, vec!["prefs"]);
    assert_eq!(updated.created_at, record.created_at);

    let hits = engine.search("coffee", &SearchOptions::default()).await.unwrap();
    assert_eq!(hits[0].id, record.id);
    assert!(engine.update("missing", "x").await.unwrap().is_none());
}

#[tokio::test]
async fn mismatched_chain_dimensions_are_rejected() {
    let db = Database::open_in_memory().await.unwrap();
    let chain = EmbeddingChain::new(vec![Arc::new(HashingEmbedder::new()) as Arc<dyn EmbeddingAdapter>]).unwrap();
    let result = MemoryEngine::from_parts(db, chain, MemoryConfig::default(), 384).await;
    assert!(matches!(
        result,
        Err(AlfredError::DimensionMismatch {
            expected: 384,
            actual: DIMS
        })
    ));
}

#[tokio::test]
async fn data_survives_reopen_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memory.db");
    let path = path.to_str().unwrap();

    {
        let db = Database::open(path, true).await.unwrap();
        let chain = EmbeddingChain::new(vec![Arc::new(HashingEmbedder::new()) as Arc<dyn EmbeddingAdapter>]).unwrap();
        let engine = MemoryEngine::from_parts(db, chain, MemoryConfig::default(), DIMS).await.unwrap();
        engine.insert(NewMemory::new("persisted fact").with_id("p")).await.unwrap();
        engine.shutdown().await.unwrap();
    }

    let db = Database::open(path, true).await.unwrap();
    let chain = EmbeddingChain::new(vec![Arc::new(HashingEmbedder::new()) as Arc<dyn EmbeddingAdapter>]).unwrap();
    let engine = MemoryEngine::from_parts(db, chain, MemoryConfig::default(), DIMS).await.unwrap();
    let hits = engine.search("persisted", &SearchOptions::default()).await.unwrap();
    assert_eq!(hits[0].id, "p");
}
