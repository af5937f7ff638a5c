// SPDX-FileCopyrightText: 2026 Alfred Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hybrid search combining vector similarity and BM25 via weighted RRF.
//!
//! The query is embedded through the fallback chain while the lexical leg
//! runs. The lexical leg prefers the FTS5 index and falls back to an
//! in-memory BM25 rebuild when that index errors. Both candidate lists are
//! fused with Reciprocal Rank Fusion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, warn};

use alfred_config::model::MemoryConfig;
use alfred_core::AlfredError;

use crate::bm25::{Bm25Index, Bm25Params};
use crate::embedding::EmbeddingChain;
use crate::fusion::{candidate_limit, reciprocal_rank_fusion, RankedList};
use crate::store::MemoryStore;
use crate::types::{MemoryFilter, MemoryRecord, Metadata, SearchHit, SearchOptions};

/// Unfiltered BM25 index over the whole store, valid for one write generation.
struct CachedIndex {
    generation: u64,
    index: Bm25Index,
    records: Vec<MemoryRecord>,
}

/// Hybrid retriever over one store and one embedding chain.
pub struct HybridSearch {
    store: Arc<MemoryStore>,
    chain: Arc<EmbeddingChain>,
    config: MemoryConfig,
    bm25_cache: Mutex<Option<Arc<CachedIndex>>>,
}

impl HybridSearch {
    pub fn new(store: Arc<MemoryStore>, chain: Arc<EmbeddingChain>, config: MemoryConfig) -> Self {
        Self {
            store,
            chain,
            config,
            bm25_cache: Mutex::new(None),
        }
    }

    /// Retrieve memories for `query`.
    ///
    /// 1. Embeds the query while the lexical leg runs
    /// 2. Runs exact vector search over the filtered candidates
    /// 3. Fuses both rankings with weighted RRF
    /// 4. Reassembles hits carrying both raw sub-scores
    ///
    /// Fails when no embedding provider can serve the query.
    pub async fn search(
        &self,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>, AlfredError> {
        let plan = self.plan(options)?;
        if self.chain.is_empty() {
            return Err(AlfredError::AllProvidersFailed {
                failures: Vec::new(),
            });
        }
        if plan.limit == 0 {
            return Ok(Vec::new());
        }
        let started = Instant::now();

        let (embedded, lexical) = tokio::join!(
            self.chain.embed(query),
            self.lexical(query, plan.candidates, &options.filter)
        );
        let embedded = embedded?;
        let lexical = lexical?;
        debug!(provider = %embedded.provider, "query embedded");

        let hits = self
            .finish(&embedded.embedding, lexical, &plan, &options.filter)
            .await?;
        metrics::histogram!("alfred_memory_search_seconds").record(started.elapsed().as_secs_f64());
        Ok(hits)
    }

    /// Retrieve memories with a caller-supplied query embedding.
    ///
    /// The embedding is normalized before scoring, so `vector_score` is a
    /// cosine even when the caller's vector is not unit length.
    pub async fn search_with_embedding(
        &self,
        query: &str,
        query_embedding: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>, AlfredError> {
        let plan = self.plan(options)?;
        if plan.limit == 0 {
            return Ok(Vec::new());
        }
        let started = Instant::now();

        let lexical = self.lexical(query, plan.candidates, &options.filter).await?;
        let hits = self
            .finish(query_embedding, lexical, &plan, &options.filter)
            .await?;
        metrics::histogram!("alfred_memory_search_seconds").record(started.elapsed().as_secs_f64());
        Ok(hits)
    }

    fn plan(&self, options: &SearchOptions) -> Result<Plan, AlfredError> {
        let vector_weight = options.vector_weight.unwrap_or(self.config.vector_weight);
        let bm25_weight = options.bm25_weight.unwrap_or(self.config.bm25_weight);

        for (label, weight) in [("vector_weight", vector_weight), ("bm25_weight", bm25_weight)] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(AlfredError::InvalidInput(format!(
                    "{label} must be a non-negative number, got {weight}"
                )));
            }
        }
        if vector_weight == 0.0 && bm25_weight == 0.0 {
            return Err(AlfredError::InvalidInput(
                "at least one of vector_weight and bm25_weight must be positive".to_string(),
            ));
        }

        let limit = options.limit.unwrap_or(self.config.default_limit);
        Ok(Plan {
            limit,
            candidates: candidate_limit(
                limit,
                self.config.candidate_multiplier,
                self.config.min_candidates,
            ),
            vector_weight,
            bm25_weight,
        })
    }

    async fn finish(
        &self,
        query_embedding: &[f32],
        lexical: Vec<(MemoryRecord, f64)>,
        plan: &Plan,
        filter: &MemoryFilter,
    ) -> Result<Vec<SearchHit>, AlfredError> {
        let vector = self
            .store
            .vector_search(query_embedding, plan.candidates, filter)
            .await?;

        let vector_ids: Vec<String> = vector.iter().map(|h| h.record.id.clone()).collect();
        let lexical_ids: Vec<String> = lexical.iter().map(|(r, _)| r.id.clone()).collect();
        let fused = reciprocal_rank_fusion(
            &[
                RankedList::new(&vector_ids, plan.vector_weight),
                RankedList::new(&lexical_ids, plan.bm25_weight),
            ],
            self.config.rrf_k,
        );

        // Content comes from whichever retriever found the record first.
        let mut parts: HashMap<String, Parts> = HashMap::new();
        for hit in vector {
            parts.insert(
                hit.record.id.clone(),
                Parts {
                    content: hit.record.content,
                    metadata: hit.record.metadata,
                    vector_score: Some(hit.score),
                    bm25_score: None,
                },
            );
        }
        for (record, score) in lexical {
            parts
                .entry(record.id.clone())
                .or_insert_with(|| Parts {
                    content: record.content,
                    metadata: record.metadata,
                    vector_score: None,
                    bm25_score: None,
                })
                .bm25_score = Some(score);
        }

        let hits: Vec<SearchHit> = fused
            .into_iter()
            .take(plan.limit)
            .filter_map(|(id, score)| {
                let parts = parts.remove(&id)?;
                Some(SearchHit {
                    id,
                    content: parts.content,
                    score,
                    vector_score: parts.vector_score,
                    bm25_score: parts.bm25_score,
                    metadata: parts.metadata,
                })
            })
            .collect();

        debug!(results = hits.len(), "hybrid search complete");
        Ok(hits)
    }

    /// Lexical leg: FTS5 when enabled, in-memory BM25 otherwise or on error.
    async fn lexical(
        &self,
        query: &str,
        limit: usize,
        filter: &MemoryFilter,
    ) -> Result<Vec<(MemoryRecord, f64)>, AlfredError> {
        if self.config.fts_acceleration {
            match self.store.search_fts(query, limit, filter).await {
                Ok(hits) => return Ok(hits),
                Err(e) => {
                    let degraded = AlfredError::LexicalIndexDegraded(e.to_string());
                    warn!(error = %degraded, "falling back to in-memory BM25");
                    metrics::counter!("alfred_lexical_degraded_total").increment(1);
                }
            }
        }
        self.bm25_search(query, limit, filter).await
    }

    /// Rank with an in-memory BM25 index rebuilt from the store.
    ///
    /// The unfiltered index is cached until the next write; filtered
    /// queries always build from the filtered rows.
    pub async fn bm25_search(
        &self,
        query: &str,
        limit: usize,
        filter: &MemoryFilter,
    ) -> Result<Vec<(MemoryRecord, f64)>, AlfredError> {
        let params = Bm25Params {
            k1: self.config.bm25_k1,
            b: self.config.bm25_b,
        };

        if !filter.is_empty() {
            let records = self.store.lexical_documents(filter).await?;
            let index = build_index(params, &records);
            return Ok(rank(&index, &records, query, limit));
        }

        // Read before loading so a concurrent write can only make the
        // cached entry look older than it is.
        let generation = self.store.generation();
        let cached = self
            .bm25_cache
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().filter(|c| c.generation == generation).cloned());

        let cached = match cached {
            Some(cached) => cached,
            None => {
                let records = self.store.lexical_documents(filter).await?;
                let index = build_index(params, &records);
                debug!(documents = records.len(), generation, "bm25 index rebuilt");
                let fresh = Arc::new(CachedIndex {
                    generation,
                    index,
                    records,
                });
                if let Ok(mut slot) = self.bm25_cache.lock() {
                    *slot = Some(Arc::clone(&fresh));
                }
                fresh
            }
        };

        Ok(rank(&cached.index, &cached.records, query, limit))
    }
}

struct Plan {
    limit: usize,
    candidates: usize,
    vector_weight: f64,
    bm25_weight: f64,
}

struct Parts {
    content: String,
    metadata: Metadata,
    vector_score: Option<f32>,
    bm25_score: Option<f64>,
}

fn build_index(params: Bm25Params, records: &[MemoryRecord]) -> Bm25Index {
    let documents: Vec<&str> = records.iter().map(|r| r.content.as_str()).collect();
    Bm25Index::build(params, &documents)
}

fn rank(
    index: &Bm25Index,
    records: &[MemoryRecord],
    query: &str,
    limit: usize,
) -> Vec<(MemoryRecord, f64)> {
    index
        .search(query, limit)
        .into_iter()
        .filter_map(|hit| records.get(hit.doc).map(|r| (r.clone(), hit.score)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use tracing_test::traced_test;

    use alfred_core::{AdapterType, EmbeddingAdapter, HealthStatus, PluginAdapter};
    use alfred_storage::Database;

    use crate::embedding::normalize;
    use crate::types::NewMemory;

    /// Embeds text onto four axes by keyword: cat, dog, mat, loyal.
    struct Keywords;

    fn keyword_vector(text: &str) -> Vec<f32> {
        let text = text.to_lowercase();
        let axis = |word: &str| if text.contains(word) { 1.0 } else { 0.0 };
        let mut v = vec![axis("cat"), axis("dog"), axis("mat"), axis("loyal")];
        if v.iter().all(|x| *x == 0.0) {
            v = vec![0.1, 0.1, 0.1, 0.1];
        }
        normalize(v)
    }

    #[async_trait]
    impl PluginAdapter for Keywords {
        fn name(&self) -> &str {
            "keywords"
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
    impl EmbeddingAdapter for Keywords {
        fn dimensions(&self) -> usize {
            4
        }
        async fn is_available(&self) -> bool {
            true
        }
        async fn embed(&self, text: &str) -> Result<Vec<f32>, AlfredError> {
            Ok(keyword_vector(text))
        }
    }

    async fn fixture(config: MemoryConfig) -> (Arc<MemoryStore>, HybridSearch) {
        let db = Database::open_in_memory().await.unwrap();
        let store = Arc::new(MemoryStore::open(db, 4).await.unwrap());
        for (id, text) in [
            ("1", "the cat sat on the mat"),
            ("2", "dogs are loyal companions"),
            ("3", "cats and dogs are pets"),
        ] {
            store
                .insert(NewMemory::new(text).with_id(id), keyword_vector(text))
                .await
                .unwrap();
        }
        let chain = EmbeddingChain::new(vec![Arc::new(Keywords) as Arc<dyn EmbeddingAdapter>]).unwrap();
        let search = HybridSearch::new(Arc::clone(&store), Arc::new(chain), config);
        (store, search)
    }

    fn ids(hits: &[SearchHit]) -> Vec<&str> {
        hits.iter().map(|h| h.id.as_str()).collect()
    }

    #[tokio::test]
    async fn bm25_fallback_ranks_cat_corpus() {
        let (_, search) = fixture(MemoryConfig::default()).await;
        let hits = search.bm25_search("cat", 10, &MemoryFilter::default()).await.unwrap();
        let order: Vec<&str> = hits.iter().map(|(r, _)| r.id.as_str()).collect();
        assert_eq!(order, vec!["1", "3"]);
    }

    #[tokio::test]
    async fn hybrid_puts_best_match_first_and_keeps_sub_scores() {
        let (_, search) = fixture(MemoryConfig::default()).await;
        let hits = search.search("cat on a mat", &SearchOptions::default()).await.unwrap();

        assert_eq!(hits[0].id, "1");
        assert!(hits[0].vector_score.is_some());
        assert!(hits[0].bm25_score.is_some());
        // Record 2 shares no term with the query: vector list only.
        let dog = hits.iter().find(|h| h.id == "2").unwrap();
        assert!(dog.bm25_score.is_none());
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn limit_caps_results_and_zero_limit_is_empty() {
        let (_, search) = fixture(MemoryConfig::default()).await;
        let one = search
            .search("cat", &SearchOptions::default().with_limit(1))
            .await
            .unwrap();
        assert_eq!(one.len(), 1);
        let none = search
            .search("cat", &SearchOptions::default().with_limit(0))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn vector_only_weights_match_vector_search_order() {
        let (store, search) = fixture(MemoryConfig::default()).await;
        let query = keyword_vector("loyal dog");
        let options = SearchOptions::default().with_weights(1.0, 0.0);
        let hybrid = search
            .search_with_embedding("loyal dog", &query, &options)
            .await
            .unwrap();
        let vector = store
            .vector_search(&query, 10, &MemoryFilter::default())
            .await
            .unwrap();
        let expected: Vec<&str> = vector.iter().map(|h| h.record.id.as_str()).collect();
        assert_eq!(ids(&hybrid), expected);
    }

    #[tokio::test]
    async fn caller_embedding_is_normalized_before_scoring() {
        let (_, search) = fixture(MemoryConfig::default()).await;
        let scaled: Vec<f32> = keyword_vector("cat").iter().map(|v| v * 5.0).collect();
        let hits = search
            .search_with_embedding("cat", &scaled, &SearchOptions::default())
            .await
            .unwrap();
        assert!(!hits.is_empty());
        for hit in &hits {
            let score = hit.vector_score.unwrap();
            assert!((-1.0..=1.0 + 1e-6).contains(&score), "{score}");
        }
    }

    #[tokio::test]
    async fn invalid_weights_are_rejected() {
        let (_, search) = fixture(MemoryConfig::default()).await;
        for options in [
            SearchOptions::default().with_weights(0.0, 0.0),
            SearchOptions::default().with_weights(-1.0, 0.5),
            SearchOptions::default().with_weights(f64::NAN, 0.5),
        ] {
            assert!(matches!(
                search.search("cat", &options).await,
                Err(AlfredError::InvalidInput(_))
            ));
        }
    }

    #[tokio::test]
    async fn filter_yielding_nothing_is_empty_not_error() {
        let (_, search) = fixture(MemoryConfig::default()).await;
        let options = SearchOptions::default().with_filter(MemoryFilter::default().agent("nobody"));
        assert!(search.search("cat", &options).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cached_index_is_rebuilt_after_delete() {
        let config = MemoryConfig {
            fts_acceleration: false,
            ..MemoryConfig::default()
        };
        let (store, search) = fixture(config).await;
        let all = MemoryFilter::default();
        assert_eq!(search.bm25_search("cat", 10, &all).await.unwrap().len(), 2);

        store.delete("1").await.unwrap();
        let hits = search.bm25_search("cat", 10, &all).await.unwrap();
        let order: Vec<&str> = hits.iter().map(|(r, _)| r.id.as_str()).collect();
        assert_eq!(order, vec!["3"]);
    }

    #[tokio::test]
    #[traced_test]
    async fn broken_fts_index_degrades_to_bm25() {
        let (store, search) = fixture(MemoryConfig::default()).await;
        store
            .database()
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch(
                    "DROP TRIGGER memories_ai; DROP TRIGGER memories_ad; \
                     DROP TRIGGER memories_au; DROP TABLE memories_fts;",
                )
            })
            .await
            .unwrap();

        let hits = search.search("cat", &SearchOptions::default()).await.unwrap();
        assert_eq!(hits[0].id, "1");
        assert!(hits.iter().any(|h| h.id == "3" && h.bm25_score.is_some()));
        assert!(logs_contain("lexical index degraded"));
    }

    #[tokio::test]
    async fn empty_chain_fails_search() {
        let db = Database::open_in_memory().await.unwrap();
        let store = Arc::new(MemoryStore::open(db, 4).await.unwrap());
        let chain = Arc::new(EmbeddingChain::new(Vec::new()).unwrap());
        let search = HybridSearch::new(store, chain, MemoryConfig::default());
        assert!(matches!(
            search.search("cat", &SearchOptions::default()).await,
            Err(AlfredError::AllProvidersFailed { .. })
        ));
        assert!(matches!(
            search.search("cat", &SearchOptions::default().with_limit(0)).await,
            Err(AlfredError::AllProvidersFailed { .. })
        ));
    }
}
