//! ragforge — RAG orchestration from the command line.
//!
//! `ragforge ingest <path>` loads a file or directory into the vector
//! store; `ragforge query <text> [--stream]` runs the retrieval
//! pipeline and prints the answer. Both read the JSON config given by
//! `--config`. Exit code 0 on success, 1 on any unhandled error.
//!
//! This binary wires the engine to its reference backends (in-memory
//! vector store and history, text loader, OpenAI-compatible HTTP
//! provider); production deployments embed `ragforge-runtime` and plug
//! in their own stores.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_stream::StreamExt;
use tracing::error;
use tracing_subscriber::EnvFilter;

use ragforge_backend::OpenAiCompatBackend;
use ragforge_core::config::RagConfig;
use ragforge_core::Result;
use ragforge_runtime::{QueryOptions, RagEngine};
use ragforge_store::{InMemoryHistory, MemoryVectorStore, TextLoader};

#[derive(Debug, Parser)]
#[command(name = "ragforge", about = "Provider-agnostic RAG orchestration", version)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, global = true, default_value = "ragforge.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Ingest a file or directory into the vector store.
    Ingest { path: PathBuf },
    /// Ask a question against the ingested corpus.
    Query {
        text: String,
        /// Stream the answer token by token.
        #[arg(long)]
        stream: bool,
        /// Conversation session id for memory.
        #[arg(long)]
        session: Option<String>,
    },
}

fn load_config(path: &PathBuf) -> Result<RagConfig> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn build_engine(config: RagConfig) -> Result<RagEngine> {
    let backend = Arc::new(OpenAiCompatBackend::from_config(
        &config.embedding,
        &config.llm,
    )?);
    let store = match config.embedding.dimensions {
        Some(dim) => MemoryVectorStore::with_dimension(dim),
        None => MemoryVectorStore::new(),
    };
    let max_messages = config.memory.max_messages;
    Ok(RagEngine::new(config, backend, Arc::new(store), Arc::new(TextLoader))?
        .with_history(Arc::new(InMemoryHistory::new(max_messages))))
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli.config)?;
    let engine = build_engine(config)?;

    match cli.command {
        Commands::Ingest { path } => {
            if path.is_dir() {
                let summary = engine.ingest_directory(&path).await?;
                println!(
                    "ingest {}: {} processed, {} succeeded, {} failed in {}ms",
                    path.display(),
                    summary.processed,
                    summary.succeeded,
                    summary.failed,
                    summary.duration_ms
                );
                for err in &summary.errors {
                    eprintln!("  {}", err);
                }
            } else {
                let chunks = engine.ingest_file(&path).await?;
                println!("ingest {}: {} chunks", path.display(), chunks);
            }
        }
        Commands::Query {
            text,
            stream,
            session,
        } => {
            let opts = QueryOptions {
                session_id: session,
                filter: None,
            };
            if stream {
                let mut streaming = engine.query_stream(&text, opts).await?;
                while let Some(chunk) = streaming.stream.next().await {
                    print!("{}", chunk?.delta);
                }
                println!();
                print_sources(&streaming.sources);
            } else {
                let outcome = engine.query(&text, opts).await?;
                println!("{}", outcome.answer.as_text());
                print_sources(&outcome.sources);
            }
        }
    }
    Ok(())
}

fn print_sources(sources: &[serde_json::Value]) {
    if sources.is_empty() {
        return;
    }
    println!();
    println!("sources:");
    for source in sources {
        let title = source
            .get("docTitle")
            .or_else(|| source.get("source"))
            .and_then(|v| v.as_str())
            .unwrap_or("(unknown)");
        match source.get("section").and_then(|v| v.as_str()) {
            Some(section) => println!("  - {} / {}", title, section),
            None => println!("  - {}", title),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
