//! ragdb-hybrid
//!
//! Ties the workspace together: the indexing orchestrator that turns
//! documents into stored chunk vectors, and the retrieval engine that serves
//! semantic, bm25 and hybrid searches over them.
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use ragdb_core::config::{expand_path, EmbeddingConfig, EventsConfig, SinkKind};
use ragdb_core::error::Error;
use ragdb_core::events::{publish, Event, EventEnvelope, EventSink, JsonlSink, NullSink, TracingSink};
use ragdb_core::traits::TokenCounter;
use ragdb_embed::HfTokenizer;
use ragdb_text::WordTokenizer;

pub mod engine;
pub mod fusion;
pub mod indexer;
pub mod journal;
pub mod locks;

pub use engine::{snippet, RetrievalEngine};
pub use fusion::fuse;
pub use indexer::{IndexOptions, IndexOutcome, IndexStats, Indexer};
pub use locks::KeyedLocks;

/// Token counter for chunk budgets: the embedding model's tokenizer when one
/// is configured, word tokens otherwise.
pub fn build_token_counter(config: &EmbeddingConfig) -> Result<Arc<dyn TokenCounter>> {
    match config.tokenizer.as_deref() {
        Some(path) => {
            let path = expand_path(path);
            let tokenizer = HfTokenizer::from_file(&path)
                .with_context(|| format!("loading tokenizer from {}", path.display()))?;
            info!(path = %path.display(), "Chunk budgets use model tokenizer");
            Ok(Arc::new(tokenizer))
        }
        None => Ok(Arc::new(WordTokenizer)),
    }
}

pub fn build_sink(config: &EventsConfig) -> Result<Arc<dyn EventSink>> {
    Ok(match config.sink {
        SinkKind::Null => Arc::new(NullSink),
        SinkKind::Tracing => Arc::new(TracingSink),
        SinkKind::Jsonl => {
            let path = config.path.as_deref().context("events.path is required for the jsonl sink")?;
            Arc::new(JsonlSink::new(expand_path(path)))
        }
    })
}

/// Publish on the blocking pool; sinks may write files synchronously.
pub(crate) async fn publish_blocking<P>(sink: Arc<dyn EventSink>, envelope: EventEnvelope<P>) -> ragdb_core::Result<()>
where
    P: Event + Send + 'static,
{
    tokio::task::spawn_blocking(move || publish(sink.as_ref(), envelope))
        .await
        .map_err(|e| Error::Operation(format!("event publish task failed: {e}")))?
}
