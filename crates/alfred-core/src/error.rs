// SPDX-FileCopyrightText: 2026 Alfred Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Alfred memory engine.

use thiserror::Error;

use crate::types::ProviderFailure;

/// The primary error type used across all Alfred adapter traits and core operations.
#[derive(Debug, Error)]
pub enum AlfredError {
    /// Configuration errors (invalid TOML, unknown provider names, bad weights).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A single embedding provider cannot currently serve requests.
    ///
    /// Non-fatal: the embedding chain falls through to the next provider.
    #[error("embedding provider {provider} unavailable: {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    /// A single embedding provider accepted the request but failed to answer it.
    #[error("embedding provider {provider} failed: {message}")]
    Embedding { provider: String, message: String },

    /// Every provider in the embedding chain was unavailable or errored.
    #[error("all embedding providers failed: {}", render_failures(failures))]
    AllProvidersFailed { failures: Vec<ProviderFailure> },

    /// An embedding's length disagrees with the store's configured dimensionality.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The accelerated full-text index failed. Recovered locally by the
    /// hybrid search layer and never returned to callers of `search`.
    #[error("lexical index degraded: {0}")]
    LexicalIndexDegraded(String),

    /// Caller supplied input the engine refuses to store or score.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

fn render_failures(failures: &[ProviderFailure]) -> String {
    if failures.is_empty() {
        return "no embedding providers configured".to_string();
    }
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl AlfredError {
    /// Returns true for errors that indicate misconfiguration rather than
    /// transient unavailability.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            AlfredError::Config(_)
                | AlfredError::AllProvidersFailed { .. }
                | AlfredError::DimensionMismatch { .. }
        )
    }
}
