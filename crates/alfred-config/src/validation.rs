// SPDX-FileCopyrightText: 2026 Alfred Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as fusion weights in range, known provider names, and non-zero timeouts.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::{AlfredConfig, KNOWN_PROVIDERS, ONNX_MODEL_NAME, PROVIDER_OPENAI};

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &AlfredConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut invalid = |message: String| errors.push(ConfigError::Validation { message });

    if config.storage.database_path.trim().is_empty() {
        invalid("storage.database_path must not be empty".to_string());
    }

    let memory = &config.memory;
    for (key, weight) in [
        ("memory.vector_weight", memory.vector_weight),
        ("memory.bm25_weight", memory.bm25_weight),
    ] {
        if !weight.is_finite() || !(0.0..=1.0).contains(&weight) {
            invalid(format!("{key} must be between 0.0 and 1.0, got {weight}"));
        }
    }
    if memory.vector_weight <= 0.0 && memory.bm25_weight <= 0.0 {
        invalid("at least one of memory.vector_weight and memory.bm25_weight must be positive".to_string());
    }
    if !memory.rrf_k.is_finite() || memory.rrf_k <= 0.0 {
        invalid(format!("memory.rrf_k must be positive, got {}", memory.rrf_k));
    }
    if !memory.bm25_k1.is_finite() || memory.bm25_k1 < 0.0 {
        invalid(format!("memory.bm25_k1 must be non-negative, got {}", memory.bm25_k1));
    }
    if !(0.0..=1.0).contains(&memory.bm25_b) {
        invalid(format!("memory.bm25_b must be between 0.0 and 1.0, got {}", memory.bm25_b));
    }
    if memory.default_limit == 0 {
        invalid("memory.default_limit must be at least 1".to_string());
    }
    if memory.candidate_multiplier == 0 {
        invalid("memory.candidate_multiplier must be at least 1".to_string());
    }

    let embedding = &config.embedding;
    if embedding.dimensions == 0 {
        invalid("embedding.dimensions must be at least 1".to_string());
    }
    if embedding.probe_timeout_ms == 0 {
        invalid("embedding.probe_timeout_ms must be non-zero".to_string());
    }
    if embedding.embed_timeout_ms == 0 {
        invalid("embedding.embed_timeout_ms must be non-zero".to_string());
    }

    let mut seen = HashSet::new();
    for name in &embedding.providers {
        if !KNOWN_PROVIDERS.contains(&name.as_str()) {
            invalid(format!(
                "unknown embedding provider `{name}` (known: {})",
                KNOWN_PROVIDERS.join(", ")
            ));
        }
        if !seen.insert(name.as_str()) {
            invalid(format!("embedding provider `{name}` is listed more than once"));
        }
    }

    if embedding.onnx.model_name != ONNX_MODEL_NAME {
        invalid(format!(
            "embedding.onnx.model_name `{}` is not supported (only `{ONNX_MODEL_NAME}`)",
            embedding.onnx.model_name
        ));
    }

    let openai_enabled =
        !config.privacy.local_only && embedding.providers.iter().any(|p| p == PROVIDER_OPENAI);
    let has_key = embedding
        .openai
        .api_key
        .as_deref()
        .is_some_and(|k| !k.trim().is_empty());
    if openai_enabled && !has_key {
        invalid("embedding.openai.api_key is required when the openai provider is enabled".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
