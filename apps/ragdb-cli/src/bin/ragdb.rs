use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

use ragdb_core::config::{Config, Settings};
use ragdb_core::events::{DocumentExtracted, EventEnvelope};
use ragdb_core::logging;
use ragdb_core::types::{HealthStatus, SearchRequest};
use ragdb_core::{Document, SemanticChunker};
use ragdb_cli::{document_id_for, text_files, App};
use ragdb_hybrid::{build_token_counter, IndexOptions};

#[derive(Parser)]
#[command(name = "ragdb")]
#[command(about = "Token-aware chunking and hybrid semantic + BM25 retrieval", long_about = None)]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and config.<env>.toml
    #[arg(long, global = true, env = "RAGDB_CONFIG_DIR", default_value = ".")]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index one extracted text file
    Index {
        path: PathBuf,

        /// Document id (defaults to the file stem)
        #[arg(long)]
        id: Option<String>,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        url: Option<String>,

        /// Replace chunks already stored for the document
        #[arg(long)]
        force: bool,
    },

    /// Index every *.txt file under a directory
    IndexDir {
        dir: PathBuf,

        #[arg(long)]
        force: bool,
    },

    /// Re-index a document from <indexing.text_dir>/<id>.txt
    Reindex { document_id: String },

    /// Search the index
    Search {
        query: String,

        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// semantic, bm25 or hybrid
        #[arg(short, long, default_value = "semantic")]
        mode: String,

        /// Restrict results to one document
        #[arg(long)]
        document_id: Option<String>,

        #[arg(long)]
        correlation_id: Option<String>,
    },

    /// Check embedder and vector store reachability
    Health,

    /// Show how a text file would be chunked, without indexing it
    Chunk {
        path: PathBuf,

        #[arg(long)]
        id: Option<String>,
    },

    /// Documents and chunks currently indexed
    Stats,

    /// Handle a DocumentExtracted event stored as JSON
    Consume { event: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let env_name = std::env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
    let config = Config::load_from(&cli.config_dir, &env_name);
    let settings = config.settings()?;
    logging::init(&settings.logging)?;
    info!(env = config.env_name(), "Loaded configuration");

    match cli.command {
        Commands::Chunk { path, id } => chunk_preview(&settings, &path, id),
        command => run(settings, command).await,
    }
}

async fn run(settings: Settings, command: Commands) -> Result<()> {
    let app = App::open(settings).await?;
    match command {
        Commands::Index { path, id, title, url, force } => {
            let id = match id {
                Some(id) => id,
                None => document_id_for(&path)?,
            };
            let options = IndexOptions { force, correlation_id: None };
            let outcome = app.indexer.index_file(&id, &path, title, url, options).await?;
            print_json(&outcome)
        }
        Commands::IndexDir { dir, force } => index_dir(&app, &dir, force).await,
        Commands::Reindex { document_id } => print_json(&app.indexer.reindex(&document_id).await?),
        Commands::Search { query, top_k, mode, document_id, correlation_id } => {
            let request = SearchRequest {
                q: query,
                top_k: top_k.unwrap_or(app.settings.retrieval.default_top_k),
                mode,
                document_id,
            };
            let response = app.engine.search_request(request, correlation_id).await?;
            print_json(&response)
        }
        Commands::Health => {
            let report = app.engine.health().await;
            print_json(&report)?;
            if report.status == HealthStatus::Down {
                bail!("embedder and vector store are both unreachable");
            }
            Ok(())
        }
        Commands::Stats => print_json(&app.indexer.stats().await?),
        Commands::Consume { event } => {
            let raw = fs::read_to_string(&event).with_context(|| format!("reading {}", event.display()))?;
            let envelope = EventEnvelope::<DocumentExtracted>::from_json(&raw)?;
            print_json(&app.indexer.handle_extracted(&envelope).await?)
        }
        Commands::Chunk { path, id } => chunk_preview(&app.settings, &path, id),
    }
}

async fn index_dir(app: &App, dir: &Path, force: bool) -> Result<()> {
    let files = text_files(dir)?;
    if files.is_empty() {
        bail!("no .txt files under {}", dir.display());
    }
    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents {msg}")?
            .progress_chars("#>-"),
    );

    let concurrency = app.settings.indexing.concurrency;
    let results: Vec<_> = stream::iter(files)
        .map(|path| {
            let options = IndexOptions { force, correlation_id: None };
            async move {
                let id = document_id_for(&path)?;
                let outcome = app.indexer.index_file(&id, &path, None, None, options).await?;
                anyhow::Ok(outcome)
            }
        })
        .buffer_unordered(concurrency)
        .inspect(|r| {
            if let Ok(outcome) = r {
                pb.set_message(outcome.document_id.clone());
            }
            pb.inc(1);
        })
        .collect()
        .await;
    pb.finish_and_clear();

    let (mut indexed, mut skipped, mut failed, mut chunks) = (0usize, 0usize, 0usize, 0usize);
    for result in &results {
        match result {
            Ok(o) if o.skipped => skipped += 1,
            Ok(o) => {
                indexed += 1;
                chunks += o.chunk_count;
            }
            Err(e) => {
                failed += 1;
                error!(error = %e, "Indexing failed");
            }
        }
    }
    println!("indexed {indexed} documents ({chunks} chunks), skipped {skipped}, failed {failed}");
    if failed > 0 {
        bail!("{failed} documents failed to index");
    }
    Ok(())
}

fn chunk_preview(settings: &Settings, path: &Path, id: Option<String>) -> Result<()> {
    let id = match id {
        Some(id) => id,
        None => document_id_for(path)?,
    };
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let counter = build_token_counter(&settings.embedding)?;
    let chunker = SemanticChunker::new(Arc::clone(&counter), settings.chunking)?;
    let output = chunker.chunk_document(&Document::from_marked_text(id, &text))?;
    for chunk in &output.chunks {
        let tokens = counter.count(&chunk.text)?;
        println!("{} page={} tokens={}", chunk.chunk_id, chunk.page, tokens);
        println!("{}\n", chunk.text);
    }
    print_json(&output.report)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
