// SPDX-FileCopyrightText: 2026 Alfred Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `alfred doctor` command implementation.
//!
//! Runs diagnostic checks against the configuration, the memory database
//! and every configured embedding provider.

use std::io::IsTerminal;
use std::time::{Duration, Instant};

use alfred_config::model::{AlfredConfig, PROVIDER_OPENAI};
use alfred_core::{AlfredError, HealthStatus, PluginAdapter};
use alfred_memory::build_chain;
use alfred_storage::Database;

/// Status of a diagnostic check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Result of a single diagnostic check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub duration: Duration,
}

impl CheckResult {
    fn new(name: impl Into<String>, status: CheckStatus, message: impl Into<String>, start: Instant) -> Self {
        Self {
            name: name.into(),
            status,
            message: message.into(),
            duration: start.elapsed(),
        }
    }
}

/// Run the `alfred doctor` command. With `plain`, disables colored output.
pub async fn run_doctor(config: &AlfredConfig, plain: bool) -> Result<(), AlfredError> {
    let use_color = !plain && std::io::stdout().is_terminal();

    let mut results = vec![check_config(), check_database(config).await, check_privacy(config)];
    results.extend(check_providers(config).await);

    println!();
    println!("  alfred doctor");
    println!("  {}", "-".repeat(50));

    for result in &results {
        println!("{}", render_line(result, use_color));
    }

    println!();
    let issues = results
        .iter()
        .filter(|r| r.status != CheckStatus::Pass)
        .count();
    if issues > 0 {
        let issue_word = if issues == 1 { "issue" } else { "issues" };
        println!("  {issues} {issue_word} found.");
    } else {
        println!("  All checks passed.");
    }
    println!();

    Ok(())
}

fn render_line(result: &CheckResult, use_color: bool) -> String {
    let duration_ms = result.duration.as_millis();
    if !use_color {
        let tag = match result.status {
            CheckStatus::Pass => "[PASS]",
            CheckStatus::Warn => "[WARN]",
            CheckStatus::Fail => "[FAIL]",
        };
        return format!(
            "    {tag} {:<20} {} ({duration_ms}ms)",
            result.name, result.message
        );
    }

    use colored::Colorize;
    let (symbol, message) = match result.status {
        CheckStatus::Pass => ("✓".green(), result.message.normal()),
        CheckStatus::Warn => ("!".yellow(), result.message.yellow()),
        CheckStatus::Fail => ("✗".red(), result.message.red()),
    };
    format!(
        "    {symbol} {:<20} {message} ({duration_ms}ms)",
        result.name
    )
}

/// Check configuration loads without errors.
fn check_config() -> CheckResult {
    let start = Instant::now();
    match alfred_config::load_and_validate() {
        Ok(_) => CheckResult::new("Configuration", CheckStatus::Pass, "valid", start),
        Err(errors) => CheckResult::new(
            "Configuration",
            CheckStatus::Fail,
            format!("{} error(s)", errors.len()),
            start,
        ),
    }
}

/// Check the memory database opens, migrates and has its lexical index.
async fn check_database(config: &AlfredConfig) -> CheckResult {
    let start = Instant::now();
    let db_path = &config.storage.database_path;

    if !std::path::Path::new(db_path).exists() {
        return CheckResult::new(
            "Database",
            CheckStatus::Warn,
            format!("not found: {db_path} (will be created on first use)"),
            start,
        );
    }

    let db = match Database::open(db_path, config.storage.wal_mode).await {
        Ok(db) => db,
        Err(e) => {
            return CheckResult::new("Database", CheckStatus::Fail, format!("open failed: {e}"), start);
        }
    };

    let result = match db.health_check().await {
        Ok(status) => {
            let message = match &status {
                HealthStatus::Healthy => "connected".to_string(),
                HealthStatus::Degraded(reason) | HealthStatus::Unhealthy(reason) => reason.clone(),
            };
            CheckResult::new("Database", health_level(&status), message, start)
        }
        Err(e) => CheckResult::new("Database", CheckStatus::Fail, format!("query failed: {e}"), start),
    };
    let _ = db.shutdown().await;
    result
}

/// Degraded adapters still serve, so they only warn.
fn health_level(status: &HealthStatus) -> CheckStatus {
    match status {
        HealthStatus::Healthy => CheckStatus::Pass,
        status if status.is_serving() => CheckStatus::Warn,
        _ => CheckStatus::Fail,
    }
}

/// Warn when a remote provider is listed but blocked by `privacy.local_only`.
fn check_privacy(config: &AlfredConfig) -> CheckResult {
    let start = Instant::now();
    let remote_listed = config
        .embedding
        .providers
        .iter()
        .any(|p| p == PROVIDER_OPENAI);

    match (config.privacy.local_only, remote_listed) {
        (true, true) => CheckResult::new(
            "Privacy",
            CheckStatus::Warn,
            "openai is listed but privacy.local_only keeps it disabled",
            start,
        ),
        (true, false) => CheckResult::new("Privacy", CheckStatus::Pass, "local only", start),
        (false, _) => CheckResult::new(
            "Privacy",
            CheckStatus::Pass,
            "remote providers allowed",
            start,
        ),
    }
}

/// One result per built provider plus an overall chain verdict.
async fn check_providers(config: &AlfredConfig) -> Vec<CheckResult> {
    let start = Instant::now();
    let chain = match build_chain(config).await {
        Ok(chain) => chain,
        Err(e) => {
            return vec![CheckResult::new(
                "Embedding chain",
                CheckStatus::Fail,
                e.to_string(),
                start,
            )];
        }
    };

    let statuses = chain.availability().await;
    let mut results: Vec<CheckResult> = statuses
        .iter()
        .map(|status| {
            let (level, message) = if status.available {
                (CheckStatus::Pass, format!("available ({} dims)", status.dimensions))
            } else {
                (CheckStatus::Warn, "unavailable".to_string())
            };
            CheckResult::new(format!("Provider {}", status.name), level, message, start)
        })
        .collect();

    let available = statuses.iter().filter(|s| s.available).count();
    results.push(if statuses.is_empty() {
        CheckResult::new(
            "Embedding chain",
            CheckStatus::Fail,
            "no embedding providers could be built",
            start,
        )
    } else if available == 0 {
        CheckResult::new(
            "Embedding chain",
            CheckStatus::Fail,
            "no provider is available; remember and recall will fail",
            start,
        )
    } else {
        CheckResult::new(
            "Embedding chain",
            CheckStatus::Pass,
            format!("{available}/{} providers available", statuses.len()),
            start,
        )
    });
    results
}
