// SPDX-FileCopyrightText: 2026 Alfred Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use async_trait::async_trait;
use tracing::{debug, info};

use alfred_config::model::StorageConfig;
use alfred_core::{AdapterType, AlfredError, HealthStatus, PluginAdapter};

use crate::migrations::run_migrations;

/// Milliseconds SQLite waits on a locked database before returning `SQLITE_BUSY`.
const BUSY_TIMEOUT_MS: u32 = 5_000;

/// Convert a tokio-rusqlite error into `AlfredError::Storage`.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> AlfredError {
    AlfredError::Storage {
        source: Box::new(e),
    }
}

/// Owned handle to the memory database.
///
/// Cloning the inner connection is cheap; every clone talks to the same
/// background thread, so writes stay serialized.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
    path: String,
}

impl Database {
    /// Open (or create) the database at `path`, apply PRAGMAs and run migrations.
    pub async fn open(path: &str, wal_mode: bool) -> Result<Self, AlfredError> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| AlfredError::Storage {
                    source: Box::new(e),
                })?;
            }
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| AlfredError::Storage {
                source: Box::new(e),
            })?;
        let db = Self {
            conn,
            path: path.to_string(),
        };
        db.initialize(wal_mode).await?;
        info!(path = %path, wal = wal_mode, "memory database opened");
        Ok(db)
    }

    /// Open the database described by a `[storage]` config section.
    pub async fn from_config(config: &StorageConfig) -> Result<Self, AlfredError> {
        Self::open(&config.database_path, config.wal_mode).await
    }

    /// Open a private in-memory database with the full schema applied.
    pub async fn open_in_memory() -> Result<Self, AlfredError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(|e| AlfredError::Storage {
                source: Box::new(e),
            })?;
        let db = Self {
            conn,
            path: ":memory:".to_string(),
        };
        db.initialize(false).await?;
        Ok(db)
    }

    async fn initialize(&self, wal_mode: bool) -> Result<(), AlfredError> {
        let pragmas = format!(
            "PRAGMA foreign_keys = ON;\nPRAGMA busy_timeout = {BUSY_TIMEOUT_MS};\n{}",
            if wal_mode {
                "PRAGMA journal_mode = WAL;\nPRAGMA synchronous = NORMAL;"
            } else {
                ""
            }
        );
        self.conn
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch(&pragmas)
            })
            .await
            .map_err(map_tr_err)?;

        let outcome = self
            .conn
            .call(|conn| -> Result<Result<(), AlfredError>, rusqlite::Error> {
                Ok(run_migrations(conn))
            })
            .await
            .map_err(map_tr_err)?;
        outcome?;
        debug!(path = %self.path, "schema up to date");
        Ok(())
    }

    /// The shared tokio-rusqlite connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Filesystem path, or `:memory:`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Checkpoint the WAL so the main database file is self-contained.
    pub async fn checkpoint(&self) -> Result<(), AlfredError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

#[async_trait]
impl PluginAdapter for Database {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, AlfredError> {
        let fts_ok = self
            .conn
            .call(|conn| -> Result<bool, rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                let found: i64 = conn.query_row(
                    "SELECT count(*) FROM sqlite_master WHERE name = 'memories_fts'",
                    [],
                    |row| row.get(0),
                )?;
                Ok(found == 1)
            })
            .await
            .map_err(map_tr_err)?;
        if fts_ok {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Degraded(
                "full-text index missing; lexical search uses in-memory BM25".to_string(),
            ))
        }
    }

    async fn shutdown(&self) -> Result<(), AlfredError> {
        if self.path != ":memory:" {
            self.checkpoint().await?;
        }
        Ok(())
    }
}
