// SPDX-FileCopyrightText: 2026 Alfred Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports `./alfred.toml` > `$ALFRED_HOME/alfred.toml` >
//! `~/.config/alfred/alfred.toml` > `/etc/alfred/alfred.toml`
//! with environment variable overrides via `ALFRED_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::{alfred_home, AlfredConfig};

/// Candidate config files, lowest precedence first.
pub fn config_file_candidates() -> Vec<PathBuf> {
    let mut files = vec![PathBuf::from("/etc/alfred/alfred.toml")];
    if let Some(config_dir) = dirs::config_dir() {
        files.push(config_dir.join("alfred/alfred.toml"));
    }
    files.push(alfred_home().join("alfred.toml"));
    files.push(PathBuf::from("alfred.toml"));
    files
}

/// Load configuration from the standard hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/alfred/alfred.toml` (system-wide)
/// 3. `~/.config/alfred/alfred.toml` (user XDG config)
/// 4. `$ALFRED_HOME/alfred.toml` (defaults to `~/.alfred`)
/// 5. `./alfred.toml` (local directory)
/// 6. `ALFRED_*` environment variables
pub fn load_config() -> Result<AlfredConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no file lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<AlfredConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(AlfredConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<AlfredConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(AlfredConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    let mut figment = Figment::new().merge(Serialized::defaults(AlfredConfig::default()));
    for file in config_file_candidates() {
        figment = figment.merge(Toml::file(file));
    }
    figment.merge(env_provider())
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` because key names contain
/// underscores: `ALFRED_MEMORY_VECTOR_WEIGHT` must map to
/// `memory.vector_weight`, not `memory.vector.weight`. Nested embedding
/// sections are matched before the bare `embedding_` prefix.
fn env_provider() -> Env {
    Env::prefixed("ALFRED_")
        .ignore(&["home"])
        .map(|key| map_env_key(key.as_str()).into())
}

/// Map a lowercased, prefix-stripped env var name to a dotted config path.
pub(crate) fn map_env_key(key: &str) -> String {
    const SECTIONS: &[(&str, &str)] = &[
        ("embedding_onnx_", "embedding.onnx."),
        ("embedding_ollama_", "embedding.ollama."),
        ("embedding_openai_", "embedding.openai."),
        ("embedding_", "embedding."),
        ("agent_", "agent."),
        ("storage_", "storage."),
        ("privacy_", "privacy."),
        ("memory_", "memory."),
    ];

    for (prefix, dotted) in SECTIONS {
        if let Some(rest) = key.strip_prefix(prefix) {
            return format!("{dotted}{rest}");
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_map_to_sections() {
        assert_eq!(map_env_key("memory_vector_weight"), "memory.vector_weight");
        assert_eq!(map_env_key("storage_database_path"), "storage.database_path");
        assert_eq!(map_env_key("privacy_local_only"), "privacy.local_only");
        assert_eq!(map_env_key("agent_log_level"), "agent.log_level");
    }

    #[test]
    fn nested_embedding_sections_win_over_bare_prefix() {
        assert_eq!(map_env_key("embedding_ollama_host"), "embedding.ollama.host");
        assert_eq!(map_env_key("embedding_openai_api_key"), "embedding.openai.api_key");
        assert_eq!(map_env_key("embedding_onnx_auto_download"), "embedding.onnx.auto_download");
        assert_eq!(map_env_key("embedding_probe_timeout_ms"), "embedding.probe_timeout_ms");
    }

    #[test]
    fn local_file_has_highest_file_precedence() {
        let files = config_file_candidates();
        assert_eq!(files.first().unwrap(), &PathBuf::from("/etc/alfred/alfred.toml"));
        assert_eq!(files.last().unwrap(), &PathBuf::from("alfred.toml"));
    }
}
