// SPDX-FileCopyrightText: 2026 Alfred Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Alfred - local memory engine for a personal AI agent.
//!
//! This is the binary entry point: remember, recall, forget and inspect
//! memories stored on this machine.

mod doctor;

use clap::{Parser, Subcommand};

use alfred_config::model::AlfredConfig;
use alfred_core::AlfredError;
use alfred_memory::{MemoryEngine, MemoryFilter, NewMemory, SearchOptions};

/// Alfred - local memory engine for a personal AI agent.
#[derive(Parser, Debug)]
#[command(name = "alfred", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a new memory.
    Remember {
        /// The text to remember.
        text: String,
        /// Topic tag (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Owning agent.
        #[arg(long)]
        agent: Option<String>,
        /// Owning session.
        #[arg(long)]
        session: Option<String>,
        /// Metadata entry as key=value; JSON values are parsed (repeatable).
        #[arg(long = "meta", value_parser = parse_meta)]
        meta: Vec<(String, serde_json::Value)>,
    },
    /// Search memories with hybrid vector + keyword ranking.
    Recall {
        query: String,
        /// Maximum number of results.
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        agent: Option<String>,
        #[arg(long)]
        session: Option<String>,
        /// Only memories carrying any of these tags (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Delete a memory by id.
    Forget { id: String },
    /// Print one memory as JSON.
    Show { id: String },
    /// Check configuration, database and embedding providers.
    Doctor {
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match alfred_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            alfred_config::render_errors(&errors);
            std::process::exit(EXIT_STRUCTURAL);
        }
    };

    init_tracing(&config.agent.log_level);

    if let Err(e) = run(cli.command, &config).await {
        eprintln!("alfred: {e}");
        if e.is_structural() {
            eprintln!("alfred: run `alfred doctor` to check configuration and providers");
        }
        std::process::exit(exit_code(&e));
    }
}

/// Exit status for a failure the user can retry.
const EXIT_FAILURE: i32 = 1;
/// Exit status for misconfiguration: retrying will not help.
const EXIT_STRUCTURAL: i32 = 2;

fn exit_code(error: &AlfredError) -> i32 {
    if error.is_structural() {
        EXIT_STRUCTURAL
    } else {
        EXIT_FAILURE
    }
}

async fn run(command: Commands, config: &AlfredConfig) -> Result<(), AlfredError> {
    if let Commands::Doctor { plain } = command {
        return doctor::run_doctor(config, plain).await;
    }

    let engine = MemoryEngine::open(config).await?;
    let result = execute(command, &engine).await;
    engine.shutdown().await?;
    result
}

async fn execute(command: Commands, engine: &MemoryEngine) -> Result<(), AlfredError> {
    match command {
        Commands::Remember {
            text,
            tags,
            agent,
            session,
            meta,
        } => {
            let mut memory = NewMemory::new(text);
            memory.tags = tags;
            memory.agent_id = agent;
            memory.session_id = session;
            memory.metadata.extend(meta);
            let record = engine.insert(memory).await?;
            println!("{}", record.id);
        }
        Commands::Recall {
            query,
            limit,
            agent,
            session,
            tags,
            json,
        } => {
            let options = SearchOptions {
                limit,
                filter: MemoryFilter {
                    agent_id: agent,
                    session_id: session,
                    tags,
                },
                ..SearchOptions::default()
            };
            let hits = engine.search(&query, &options).await?;
            if json {
                println!("{}", to_json(&hits)?);
            } else if hits.is_empty() {
                println!("no memories found");
            } else {
                for hit in &hits {
                    println!(
                        "{:.4}  {}  {}  (vector {}, bm25 {})",
                        hit.score,
                        hit.id,
                        hit.content,
                        hit.vector_score.map_or("-".to_string(), |s| format!("{s:.3}")),
                        hit.bm25_score.map_or("-".to_string(), |s| format!("{s:.3}")),
                    );
                }
            }
        }
        Commands::Forget { id } => {
            if engine.delete(&id).await? {
                println!("forgot {id}");
            } else {
                return Err(AlfredError::InvalidInput(format!("no memory with id {id}")));
            }
        }
        Commands::Show { id } => match engine.get(&id).await? {
            Some(record) => println!("{}", to_json(&record)?),
            None => return Err(AlfredError::InvalidInput(format!("no memory with id {id}"))),
        },
        Commands::Doctor { .. } => {}
    }
    Ok(())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, AlfredError> {
    serde_json::to_string_pretty(value).map_err(|e| AlfredError::Internal(format!("serialize: {e}")))
}

/// Parse `key=value`. The value is read as JSON when it parses, else kept
/// as a string.
fn parse_meta(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("metadata key is empty in `{raw}`"));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Initialize tracing subscriber with the configured log level.
///
/// `RUST_LOG` takes precedence when set.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("alfred={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
