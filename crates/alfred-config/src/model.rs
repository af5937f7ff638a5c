// SPDX-FileCopyrightText: 2026 Alfred Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Alfred memory engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Provider name of the local ONNX embedder.
pub const PROVIDER_ONNX: &str = "onnx";
/// Provider name of the local Ollama daemon embedder.
pub const PROVIDER_OLLAMA: &str = "ollama";
/// Provider name of the remote OpenAI-compatible embedder.
pub const PROVIDER_OPENAI: &str = "openai";

/// The only model the local ONNX provider knows how to fetch and run.
pub const ONNX_MODEL_NAME: &str = "all-MiniLM-L6-v2";

/// Every provider name accepted in `embedding.providers`.
pub const KNOWN_PROVIDERS: &[&str] = &[PROVIDER_ONNX, PROVIDER_OLLAMA, PROVIDER_OPENAI];

/// Top-level Alfred configuration.
///
/// Loaded from TOML files following the XDG hierarchy plus `$ALFRED_HOME`,
/// with environment variable overrides. All sections are optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AlfredConfig {
    /// Agent identity and logging settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Privacy gate settings.
    #[serde(default)]
    pub privacy: PrivacyConfig,

    /// Retrieval and fusion settings.
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Embedding provider chain settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

/// Resolve the Alfred home directory: `$ALFRED_HOME`, else `~/.alfred`.
pub fn alfred_home() -> PathBuf {
    if let Ok(home) = std::env::var("ALFRED_HOME") {
        PathBuf::from(home)
    } else if let Some(home) = dirs::home_dir() {
        home.join(".alfred")
    } else {
        PathBuf::from(".alfred")
    }
}

/// Agent identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the agent.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "alfred".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file holding the memory store.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    alfred_home()
        .join("memory.db")
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Privacy gate configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrivacyConfig {
    /// Keep all text on the device. When true, remote embedding providers
    /// are never constructed even if listed in `embedding.providers`.
    #[serde(default = "default_true")]
    pub local_only: bool,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            local_only: default_true(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Retrieval configuration for hybrid (vector + BM25) search.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Number of results returned when the caller does not set a limit.
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// RRF weight of the vector (semantic) ranking.
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,

    /// RRF weight of the BM25 (lexical) ranking.
    #[serde(default = "default_bm25_weight")]
    pub bm25_weight: f64,

    /// RRF fusion constant `k`.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,

    /// Lower bound on candidates pulled from each sub-retriever.
    #[serde(default = "default_min_candidates")]
    pub min_candidates: usize,

    /// Candidates pulled from each sub-retriever per requested result.
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,

    /// BM25 term-frequency saturation.
    #[serde(default = "default_bm25_k1")]
    pub bm25_k1: f64,

    /// BM25 document-length normalization.
    #[serde(default = "default_bm25_b")]
    pub bm25_b: f64,

    /// Use the SQLite FTS5 index for the lexical leg, falling back to the
    /// in-memory BM25 rebuild when it fails.
    #[serde(default = "default_true")]
    pub fts_acceleration: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            vector_weight: default_vector_weight(),
            bm25_weight: default_bm25_weight(),
            rrf_k: default_rrf_k(),
            min_candidates: default_min_candidates(),
            candidate_multiplier: default_candidate_multiplier(),
            bm25_k1: default_bm25_k1(),
            bm25_b: default_bm25_b(),
            fts_acceleration: default_true(),
        }
    }
}

fn default_limit() -> usize {
    10
}

fn default_vector_weight() -> f64 {
    0.7
}

fn default_bm25_weight() -> f64 {
    0.3
}

fn default_rrf_k() -> f64 {
    60.0
}

fn default_min_candidates() -> usize {
    50
}

fn default_candidate_multiplier() -> usize {
    3
}

fn default_bm25_k1() -> f64 {
    1.2
}

fn default_bm25_b() -> f64 {
    0.75
}

/// Embedding provider chain configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    /// Provider names in priority order. Known: `onnx`, `ollama`, `openai`.
    #[serde(default = "default_providers")]
    pub providers: Vec<String>,

    /// Dimensionality shared by every provider and the memory store.
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Timeout for a provider availability probe, in milliseconds.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Timeout for one embed or embed-batch call, in milliseconds.
    #[serde(default = "default_embed_timeout_ms")]
    pub embed_timeout_ms: u64,

    /// Local ONNX model settings.
    #[serde(default)]
    pub onnx: OnnxConfig,

    /// Local Ollama daemon settings.
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// Remote OpenAI-compatible API settings.
    #[serde(default)]
    pub openai: OpenAiConfig,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            dimensions: default_dimensions(),
            probe_timeout_ms: default_probe_timeout_ms(),
            embed_timeout_ms: default_embed_timeout_ms(),
            onnx: OnnxConfig::default(),
            ollama: OllamaConfig::default(),
            openai: OpenAiConfig::default(),
        }
    }
}

fn default_providers() -> Vec<String> {
    vec![PROVIDER_ONNX.to_string(), PROVIDER_OLLAMA.to_string()]
}

fn default_dimensions() -> usize {
    384
}

fn default_probe_timeout_ms() -> u64 {
    2_000
}

fn default_embed_timeout_ms() -> u64 {
    30_000
}

/// Local ONNX embedding model settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OnnxConfig {
    /// Model name, also the directory under `<data_dir>/models/`.
    /// Only [`ONNX_MODEL_NAME`] is supported.
    #[serde(default = "default_onnx_model_name")]
    pub model_name: String,

    /// Directory holding downloaded models. Defaults to the Alfred home.
    #[serde(default)]
    pub data_dir: Option<String>,

    /// Download the model from HuggingFace on first use when missing.
    #[serde(default)]
    pub auto_download: bool,
}

impl Default for OnnxConfig {
    fn default() -> Self {
        Self {
            model_name: default_onnx_model_name(),
            data_dir: None,
            auto_download: false,
        }
    }
}

impl OnnxConfig {
    /// Effective data directory.
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(alfred_home)
    }
}

fn default_onnx_model_name() -> String {
    ONNX_MODEL_NAME.to_string()
}

/// Local Ollama daemon settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OllamaConfig {
    /// Base URL of the Ollama daemon.
    #[serde(default = "default_ollama_host")]
    pub host: String,

    /// Embedding model served by Ollama.
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: default_ollama_host(),
            model: default_ollama_model(),
        }
    }
}

fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "all-minilm".to_string()
}

/// Remote OpenAI-compatible embedding API settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OpenAiConfig {
    /// API key. The provider reports itself unavailable without one.
    #[serde(default)]
    pub api_key: Option<String>,

    /// API base URL (Azure OpenAI and compatible servers work too).
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    /// Embedding model name.
    #[serde(default = "default_openai_model")]
    pub model: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_openai_base_url(),
            model: default_openai_model(),
        }
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "text-embedding-3-small".to_string()
}
