// SPDX-FileCopyrightText: 2026 Alfred Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory engine facade: the insert / search / delete surface consumed by
//! agents and the CLI.

use std::sync::Arc;

use tracing::{debug, info};

use alfred_config::model::{AlfredConfig, MemoryConfig};
use alfred_core::{AlfredError, PluginAdapter};
use alfred_storage::Database;

use crate::embedding::{build_chain, EmbeddingChain};
use crate::hybrid::HybridSearch;
use crate::store::MemoryStore;
use crate::types::{MemoryFilter, MemoryRecord, NewMemory, ProviderStatus, SearchHit, SearchOptions};

/// Owns the store, the embedding chain and the hybrid retriever over both.
pub struct MemoryEngine {
    db: Database,
    store: Arc<MemoryStore>,
    chain: Arc<EmbeddingChain>,
    search: HybridSearch,
}

impl MemoryEngine {
    /// Open the database and build the provider chain described by `config`.
    pub async fn open(config: &AlfredConfig) -> Result<Self, AlfredError> {
        let db = Database::from_config(&config.storage).await?;
        let chain = build_chain(config).await?;
        info!(
            database = %db.path(),
            providers = ?chain.provider_names(),
            "memory engine opened"
        );
        Self::from_parts(db, chain, config.memory.clone(), config.embedding.dimensions).await
    }

    /// Assemble an engine from already-built parts.
    ///
    /// `dimensions` pins the store; a non-empty chain must produce vectors
    /// of the same length.
    pub async fn from_parts(
        db: Database,
        chain: EmbeddingChain,
        memory: MemoryConfig,
        dimensions: usize,
    ) -> Result<Self, AlfredError> {
        if let Some(actual) = chain.dimensions() {
            if actual != dimensions {
                return Err(AlfredError::DimensionMismatch {
                    expected: dimensions,
                    actual,
                });
            }
        }

        let store = Arc::new(MemoryStore::open(db.clone(), dimensions).await?);
        let chain = Arc::new(chain);
        let search = HybridSearch::new(Arc::clone(&store), Arc::clone(&chain), memory);
        Ok(Self {
            db,
            store,
            chain,
            search,
        })
    }

    /// Embed and store one memory.
    pub async fn insert(&self, memory: NewMemory) -> Result<MemoryRecord, AlfredError> {
        ensure_content(&memory.content)?;
        let embedded = self.chain.embed(&memory.content).await?;
        let record = self.store.insert(memory, embedded.embedding).await?;
        debug!(id = %record.id, provider = %embedded.provider, "memory stored");
        Ok(record)
    }

    /// Embed several memories with one provider and store them together.
    pub async fn insert_batch(&self, memories: Vec<NewMemory>) -> Result<Vec<MemoryRecord>, AlfredError> {
        for memory in &memories {
            ensure_content(&memory.content)?;
        }
        let texts: Vec<String> = memories.iter().map(|m| m.content.clone()).collect();
        let embedded = self.chain.embed_batch(&texts).await?;
        let records = self
            .store
            .insert_many(memories.into_iter().zip(embedded.embeddings).collect())
            .await?;
        debug!(count = records.len(), provider = %embedded.provider, "memory batch stored");
        Ok(records)
    }

    /// Replace a memory's content, re-embedding it. `None` if the id is unknown.
    pub async fn update(&self, id: &str, content: &str) -> Result<Option<MemoryRecord>, AlfredError> {
        ensure_content(content)?;
        if self.store.get_by_id(id).await?.is_none() {
            return Ok(None);
        }
        let embedded = self.chain.embed(content).await?;
        self.store.replace(id, content, embedded.embedding).await
    }

    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchHit>, AlfredError> {
        self.search.search(query, options).await
    }

    pub async fn search_with_embedding(
        &self,
        query: &str,
        query_embedding: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>, AlfredError> {
        self.search
            .search_with_embedding(query, query_embedding, options)
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<MemoryRecord>, AlfredError> {
        self.store.get_by_id(id).await
    }

    /// Delete a memory from every index. Returns whether it existed.
    pub async fn delete(&self, id: &str) -> Result<bool, AlfredError> {
        let removed = self.store.delete(id).await?;
        debug!(id = %id, removed, "memory delete");
        Ok(removed)
    }

    pub async fn count(&self) -> Result<usize, AlfredError> {
        self.store.count().await
    }

    pub async fn list(&self, filter: &MemoryFilter) -> Result<Vec<MemoryRecord>, AlfredError> {
        self.store.list(filter).await
    }

    /// Probe every embedding provider in priority order.
    pub async fn provider_status(&self) -> Vec<ProviderStatus> {
        self.chain.availability().await
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Checkpoint the database. Safe to call more than once.
    pub async fn shutdown(&self) -> Result<(), AlfredError> {
        self.db.shutdown().await
    }
}

fn ensure_content(content: &str) -> Result<(), AlfredError> {
    if content.trim().is_empty() {
        return Err(AlfredError::InvalidInput(
            "memory content must not be empty".to_string(),
        ));
    }
    Ok(())
}
