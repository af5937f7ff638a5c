// SPDX-FileCopyrightText: 2026 Alfred Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed memory store with vector BLOB storage and FTS5 for BM25.
//!
//! The `memories` table is authoritative. The FTS5 index is kept in sync by
//! triggers inside the same transaction as every write, and in-memory BM25
//! caches key themselves on [`MemoryStore::generation`], which every write
//! bumps.

use std::sync::atomic::{AtomicU64, Ordering};

use rusqlite::OptionalExtension;
use tracing::debug;

use alfred_core::AlfredError;
use alfred_storage::{map_tr_err, Database};

use crate::bm25::tokenize;
use crate::embedding::normalize;
use crate::types::{
    blob_to_vec, cosine_similarity, vec_to_blob, MemoryFilter, MemoryRecord, Metadata,
    NewMemory, ScoredMemory,
};

const DIMENSIONS_KEY: &str = "embedding_dimensions";

/// Columns read by [`row_to_record`], in order. Tags come back as a JSON array.
const RECORD_COLUMNS: &str = "m.id, m.content, m.embedding, m.metadata, m.agent_id, m.session_id, \
     m.created_at, m.updated_at, \
     (SELECT json_group_array(t.tag) FROM memory_tags t WHERE t.memory_id = m.id)";

/// Persistent store for memory records.
pub struct MemoryStore {
    db: Database,
    dimensions: usize,
    generation: AtomicU64,
}

impl MemoryStore {
    /// Attach to an opened database, pinning its embedding dimensionality.
    ///
    /// A fresh database records `dimensions`; an existing one must match it.
    pub async fn open(db: Database, dimensions: usize) -> Result<Self, AlfredError> {
        if dimensions == 0 {
            return Err(AlfredError::Config(
                "embedding dimensionality must be positive".to_string(),
            ));
        }

        let stored = db
            .connection()
            .call(move |conn| -> Result<Option<String>, rusqlite::Error> {
                conn.execute(
                    "INSERT OR IGNORE INTO memory_meta (key, value) VALUES (?1, ?2)",
                    rusqlite::params![DIMENSIONS_KEY, dimensions.to_string()],
                )?;
                conn.query_row(
                    "SELECT value FROM memory_meta WHERE key = ?1",
                    [DIMENSIONS_KEY],
                    |row| row.get(0),
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)?;

        let stored = stored
            .map(|v| {
                v.parse::<usize>().map_err(|e| {
                    AlfredError::Internal(format!("corrupt {DIMENSIONS_KEY} value `{v}`: {e}"))
                })
            })
            .transpose()?
            .unwrap_or(dimensions);
        if stored != dimensions {
            return Err(AlfredError::DimensionMismatch {
                expected: stored,
                actual: dimensions,
            });
        }

        debug!(path = %db.path(), dimensions, "memory store attached");
        Ok(Self {
            db,
            dimensions,
            generation: AtomicU64::new(0),
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Monotonic counter bumped after every committed write.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    fn check_embedding(&self, embedding: &[f32]) -> Result<(), AlfredError> {
        if embedding.len() != self.dimensions {
            return Err(AlfredError::DimensionMismatch {
                expected: self.dimensions,
                actual: embedding.len(),
            });
        }
        Ok(())
    }

    fn prepare(&self, memory: NewMemory, embedding: Vec<f32>) -> Result<MemoryRecord, AlfredError> {
        if memory.content.trim().is_empty() {
            return Err(AlfredError::InvalidInput(
                "memory content must not be empty".to_string(),
            ));
        }
        self.check_embedding(&embedding)?;

        let mut tags = memory.tags;
        tags.retain(|t| !t.trim().is_empty());
        tags.sort();
        tags.dedup();

        let now = timestamp();
        Ok(MemoryRecord {
            id: memory
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            content: memory.content,
            embedding,
            metadata: memory.metadata,
            tags,
            agent_id: memory.agent_id,
            session_id: memory.session_id,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Validate and persist one record; assigns an id when none was given.
    pub async fn insert(&self, memory: NewMemory, embedding: Vec<f32>) -> Result<MemoryRecord, AlfredError> {
        let mut records = self.insert_many(vec![(memory, embedding)]).await?;
        records
            .pop()
            .ok_or_else(|| AlfredError::Internal("insert produced no record".to_string()))
    }

    /// Persist several records in one transaction: all or none.
    pub async fn insert_many(
        &self,
        items: Vec<(NewMemory, Vec<f32>)>,
    ) -> Result<Vec<MemoryRecord>, AlfredError> {
        let records = items
            .into_iter()
            .map(|(memory, embedding)| self.prepare(memory, embedding))
            .collect::<Result<Vec<_>, _>>()?;
        if records.is_empty() {
            return Ok(records);
        }

        let rows = records.clone();
        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                let tx = conn.transaction()?;
                for record in &rows {
                    write_record(&tx, record)?;
                }
                tx.commit()
            })
            .await
            .map_err(map_tr_err)?;
        self.bump();

        debug!(count = records.len(), "memories inserted");
        Ok(records)
    }

    /// Replace the content and embedding of an existing record, keeping its
    /// id, metadata, tags, scope and creation time.
    ///
    /// Delete and reinsert run in one transaction. Returns `None` when no
    /// record has this id.
    pub async fn replace(
        &self,
        id: &str,
        content: &str,
        embedding: Vec<f32>,
    ) -> Result<Option<MemoryRecord>, AlfredError> {
        if content.trim().is_empty() {
            return Err(AlfredError::InvalidInput(
                "memory content must not be empty".to_string(),
            ));
        }
        self.check_embedding(&embedding)?;

        let id = id.to_string();
        let content = content.to_string();
        let updated_at = timestamp();
        let replaced = self
            .db
            .connection()
            .call(move |conn| -> Result<Option<MemoryRecord>, rusqlite::Error> {
                let tx = conn.transaction()?;
                let Some(mut record) = load_one(&tx, &id)? else {
                    return Ok(None);
                };
                tx.execute("DELETE FROM memories WHERE id = ?1", [&id])?;
                record.content = content;
                record.embedding = embedding;
                record.updated_at = updated_at;
                write_record(&tx, &record)?;
                tx.commit()?;
                Ok(Some(record))
            })
            .await
            .map_err(map_tr_err)?;

        if replaced.is_some() {
            self.bump();
        }
        Ok(replaced)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<MemoryRecord>, AlfredError> {
        let id = id.to_string();
        self.db
            .connection()
            .call(move |conn| load_one(conn, &id))
            .await
            .map_err(map_tr_err)
    }

    /// Remove a record (tags cascade, FTS follows via trigger).
    ///
    /// Returns whether a record existed.
    pub async fn delete(&self, id: &str) -> Result<bool, AlfredError> {
        let id = id.to_string();
        let removed = self
            .db
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute("DELETE FROM memories WHERE id = ?1", [&id])
            })
            .await
            .map_err(map_tr_err)?;
        if removed > 0 {
            self.bump();
        }
        Ok(removed > 0)
    }

    pub async fn count(&self) -> Result<usize, AlfredError> {
        let count = self
            .db
            .connection()
            .call(|conn| -> Result<i64, rusqlite::Error> {
                conn.query_row("SELECT count(*) FROM memories", [], |row| row.get(0))
            })
            .await
            .map_err(map_tr_err)?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// All records passing `filter`, in insertion order.
    pub async fn list(&self, filter: &MemoryFilter) -> Result<Vec<MemoryRecord>, AlfredError> {
        let (clause, params) = filter_clause(filter);
        self.db
            .connection()
            .call(move |conn| -> Result<Vec<MemoryRecord>, rusqlite::Error> {
                let sql = format!("SELECT {RECORD_COLUMNS} FROM memories m{clause} ORDER BY m.seq");
                let mut stmt = conn.prepare(&sql)?;
                let records = stmt
                    .query_map(rusqlite::params_from_iter(params.iter()), row_to_record)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(records)
            })
            .await
            .map_err(map_tr_err)
    }

    /// Exact nearest neighbours by cosine similarity.
    ///
    /// The query is unit-normalized first, so scores stay in [-1, 1] for
    /// any caller-supplied vector. Filters apply before scoring. Equal
    /// scores keep insertion order.
    pub async fn vector_search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        filter: &MemoryFilter,
    ) -> Result<Vec<ScoredMemory>, AlfredError> {
        self.check_embedding(query_embedding)?;
        if query_embedding.iter().any(|v| !v.is_finite()) {
            return Err(AlfredError::InvalidInput(
                "query embedding contains non-finite values".to_string(),
            ));
        }
        if limit == 0 {
            return Ok(Vec::new());
        }
        let query_embedding = normalize(query_embedding.to_vec());
        let query_embedding = query_embedding.as_slice();

        let candidates = self.list(filter).await?;
        let mut scored: Vec<ScoredMemory> = candidates
            .into_iter()
            .filter(|record| record.embedding.len() == query_embedding.len())
            .map(|record| {
                let score = cosine_similarity(query_embedding, &record.embedding);
                ScoredMemory { record, score }
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);
        Ok(scored)
    }

    /// Records an in-memory BM25 index is rebuilt from.
    pub async fn lexical_documents(
        &self,
        filter: &MemoryFilter,
    ) -> Result<Vec<MemoryRecord>, AlfredError> {
        self.list(filter).await
    }

    /// Lexical search through the FTS5 index.
    ///
    /// The query is reduced to its index terms and OR-ed, so user text can
    /// never inject FTS syntax. Scores are negated `bm25()` values: higher is
    /// better.
    pub async fn search_fts(
        &self,
        query: &str,
        limit: usize,
        filter: &MemoryFilter,
    ) -> Result<Vec<(MemoryRecord, f64)>, AlfredError> {
        let terms = tokenize(query);
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let match_expr = terms
            .iter()
            .map(|t| format!("\"{t}\""))
            .collect::<Vec<_>>()
            .join(" OR ");

        let (clause, filter_params) = filter_clause(filter);
        let clause = if clause.is_empty() {
            String::new()
        } else {
            clause.replacen(" WHERE ", " AND ", 1)
        };
        let mut params = vec![match_expr];
        params.extend(filter_params);

        self.db
            .connection()
            .call(move |conn| -> Result<Vec<(MemoryRecord, f64)>, rusqlite::Error> {
                let sql = format!(
                    "SELECT {RECORD_COLUMNS}, -bm25(memories_fts) AS score \
                     FROM memories_fts JOIN memories m ON m.seq = memories_fts.rowid \
                     WHERE memories_fts MATCH ?{clause} \
                     ORDER BY score DESC, m.seq LIMIT {limit}"
                );
                let mut stmt = conn.prepare(&sql)?;
                let hits = stmt
                    .query_map(rusqlite::params_from_iter(params.iter()), |row| {
                        Ok((row_to_record(row)?, row.get::<_, f64>(9)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(hits)
            })
            .await
            .map_err(map_tr_err)
    }
}

fn timestamp() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

/// Insert a record and its tags. Caller owns the transaction.
fn write_record(conn: &rusqlite::Connection, record: &MemoryRecord) -> Result<(), rusqlite::Error> {
    let metadata = serde_json::to_string(&record.metadata)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
    conn.execute(
        "INSERT INTO memories (id, content, embedding, metadata, agent_id, session_id, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            record.id,
            record.content,
            vec_to_blob(&record.embedding),
            metadata,
            record.agent_id,
            record.session_id,
            record.created_at,
            record.updated_at,
        ],
    )?;
    let mut tag_stmt =
        conn.prepare_cached("INSERT OR IGNORE INTO memory_tags (memory_id, tag) VALUES (?1, ?2)")?;
    for tag in &record.tags {
        tag_stmt.execute(rusqlite::params![record.id, tag])?;
    }
    Ok(())
}

fn load_one(conn: &rusqlite::Connection, id: &str) -> Result<Option<MemoryRecord>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {RECORD_COLUMNS} FROM memories m WHERE m.id = ?1"),
        [id],
        row_to_record,
    )
    .optional()
}

/// `WHERE` clause (with leading space) and its positional parameters.
fn filter_clause(filter: &MemoryFilter) -> (String, Vec<String>) {
    let mut conditions = Vec::new();
    let mut params = Vec::new();

    if let Some(agent_id) = &filter.agent_id {
        conditions.push("m.agent_id = ?".to_string());
        params.push(agent_id.clone());
    }
    if let Some(session_id) = &filter.session_id {
        conditions.push("m.session_id = ?".to_string());
        params.push(session_id.clone());
    }
    if !filter.tags.is_empty() {
        let placeholders = vec!["?"; filter.tags.len()].join(", ");
        conditions.push(format!(
            "EXISTS (SELECT 1 FROM memory_tags t WHERE t.memory_id = m.id AND t.tag IN ({placeholders}))"
        ));
        params.extend(filter.tags.iter().cloned());
    }

    if conditions.is_empty() {
        (String::new(), params)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), params)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> Result<MemoryRecord, rusqlite::Error> {
    let embedding: Vec<u8> = row.get(2)?;
    let metadata: String = row.get(3)?;
    let tags: String = row.get(8)?;

    let metadata: Metadata = serde_json::from_str(&metadata).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let mut tags: Vec<String> = serde_json::from_str::<Vec<Option<String>>>(&tags)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
        })?
        .into_iter()
        .flatten()
        .collect();
    tags.sort();

    Ok(MemoryRecord {
        id: row.get(0)?,
        content: row.get(1)?,
        embedding: blob_to_vec(&embedding),
        metadata,
        tags,
        agent_id: row.get(4)?,
        session_id: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}
