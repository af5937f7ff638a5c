// SPDX-FileCopyrightText: 2026 Alfred Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Alfred memory engine.
//!
//! This crate provides the foundational trait definitions, error types, and
//! common types used throughout the Alfred workspace. Every embedding
//! backend implements the traits defined here.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::AlfredError;
pub use types::{AdapterType, HealthStatus, ProviderFailure};

pub use traits::{EmbeddingAdapter, PluginAdapter};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alfred_error_has_all_variants() {
        let _config = AlfredError::Config("test".into());
        let _storage = AlfredError::Storage {
            source: Box::new(std::io::Error::other("test")),
        };
        let _unavailable = AlfredError::ProviderUnavailable {
            provider: "ollama".into(),
            reason: "down".into(),
        };
        let _embedding = AlfredError::Embedding {
            provider: "openai".into(),
            message: "429".into(),
        };
        let _all = AlfredError::AllProvidersFailed { failures: vec![] };
        let _dims = AlfredError::DimensionMismatch {
            expected: 384,
            actual: 3,
        };
        let _lexical = AlfredError::LexicalIndexDegraded("fts".into());
        let _input = AlfredError::InvalidInput("empty".into());
        let _timeout = AlfredError::Timeout {
            duration: std::time::Duration::from_secs(30),
        };
        let _internal = AlfredError::Internal("test".into());
    }

    #[test]
    fn adapter_type_round_trips_through_strings() {
        use std::str::FromStr;

        for variant in [AdapterType::Embedding, AdapterType::Storage] {
            let s = variant.to_string();
            let parsed = AdapterType::from_str(&s).expect("should parse back");
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn adapter_type_serialization() {
        let json = serde_json::to_string(&AdapterType::Embedding).expect("should serialize");
        let parsed: AdapterType = serde_json::from_str(&json).expect("should deserialize");
        assert_eq!(parsed, AdapterType::Embedding);
    }

    #[test]
    fn health_status_variants() {
        assert!(HealthStatus::Healthy.is_serving());
        assert!(HealthStatus::Degraded("slow".into()).is_serving());
        assert!(!HealthStatus::Unhealthy("down".into()).is_serving());
    }

    #[test]
    fn provider_failure_display() {
        let failure = ProviderFailure::new("onnx", "timed out after 2s");
        assert_eq!(failure.to_string(), "onnx: timed out after 2s");
    }
}
