// SPDX-FileCopyrightText: 2026 Alfred Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Alfred memory engine.
//!
//! Provides WAL-mode SQLite storage with embedded migrations and a
//! single-writer concurrency model via `tokio-rusqlite`. The memory schema
//! (records, tags, dimensionality marker and the FTS5 lexical index with its
//! sync triggers) lives in the migrations directory.

pub mod database;
pub mod migrations;

pub use database::{map_tr_err, Database};
