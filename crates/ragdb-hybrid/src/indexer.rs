//! Idempotent indexing: chunk, embed, store, journal, announce.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use ragdb_core::chunker::SemanticChunker;
use ragdb_core::config::{expand_path, IndexingConfig};
use ragdb_core::error::{Error, Result};
use ragdb_core::events::{ChunksIndexed, DocumentExtracted, EventEnvelope, EventSink, NullSink};
use ragdb_core::traits::{Embedder, VectorStore};
use ragdb_core::types::{Document, EmbeddedChunk, Filter};

use crate::journal::{append_index_record, latest_index_records, lookup_title_url, IndexRecord};
use crate::locks::KeyedLocks;
use crate::publish_blocking;

#[derive(Debug, Clone, Default)]
pub struct IndexOptions {
    /// Replace chunks already stored for the document.
    pub force: bool,
    pub correlation_id: Option<String>,
}

impl IndexOptions {
    pub fn forced() -> Self {
        Self { force: true, correlation_id: None }
    }

    pub fn with_correlation(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexOutcome {
    pub document_id: String,
    pub chunk_count: usize,
    /// The document was already indexed and nothing was written.
    pub skipped: bool,
    /// Chunks stored with placeholder vectors.
    pub placeholder_embeddings: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub documents_indexed: usize,
    pub chunks_stored: usize,
    pub vector_db: String,
    pub embedding_model: String,
}

pub struct Indexer {
    chunker: SemanticChunker,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    sink: Arc<dyn EventSink>,
    config: IndexingConfig,
    batch_size: usize,
    locks: KeyedLocks,
}

impl Indexer {
    pub fn new(
        chunker: SemanticChunker,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        config: IndexingConfig,
    ) -> Self {
        Self { chunker, embedder, store, sink: Arc::new(NullSink), config, batch_size: 32, locks: KeyedLocks::new() }
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn chunker(&self) -> &SemanticChunker { &self.chunker }

    /// Index one document. Runs exclusively per `document_id`.
    ///
    /// Without `force`, a document that already has stored chunks is left
    /// untouched and its stored chunk count is reported. With `force`, every
    /// stored chunk of the document is deleted before new ones are written.
    pub async fn index(&self, document: &Document, options: IndexOptions) -> Result<IndexOutcome> {
        let document_id = document.document_id.as_str();
        if document_id.trim().is_empty() {
            return Err(Error::InvalidInput("document_id must not be empty".into()));
        }
        let _guard = self.locks.lock(document_id).await;
        let filter = Filter::DocumentId(document_id.to_string());

        let existing = self.store.count(Some(&filter)).await?;
        if existing > 0 && !options.force {
            info!(document_id, existing, "Document already indexed, skipping");
            return Ok(IndexOutcome {
                document_id: document_id.to_string(),
                chunk_count: existing,
                skipped: true,
                placeholder_embeddings: 0,
            });
        }
        if options.force {
            let removed = self.store.delete(&filter).await?;
            info!(document_id, removed, "Removed previous chunks before re-indexing");
        }

        let output = self.chunker.chunk_document(document)?;
        let report = &output.report;
        info!(
            document_id,
            chunks = output.chunks.len(),
            pages = report.pages,
            malformed_markers = report.malformed_markers,
            hard_splits = report.hard_splits,
            tokenizer = self.chunker.tokenizer(),
            "Chunked document"
        );
        if output.chunks.is_empty() {
            warn!(document_id, "Document produced no chunks");
            return Ok(IndexOutcome {
                document_id: document_id.to_string(),
                chunk_count: 0,
                skipped: false,
                placeholder_embeddings: 0,
            });
        }

        let mut records = Vec::with_capacity(output.chunks.len());
        let mut placeholders = 0;
        for batch in output.chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embeddings = self.embedder.embed_batch(&texts).await?;
            if embeddings.len() != batch.len() {
                return Err(Error::Operation(format!(
                    "embedder returned {} vectors for {} chunks",
                    embeddings.len(),
                    batch.len()
                )));
            }
            for (chunk, embedding) in batch.iter().cloned().zip(embeddings) {
                placeholders += usize::from(embedding.is_placeholder());
                records.push(EmbeddedChunk { chunk, embedding }.into_record());
            }
        }
        if placeholders > 0 {
            warn!(document_id, placeholders, "Stored chunks carry placeholder embeddings");
        }

        let chunk_count = self.store.upsert(records).await?;
        let index_path = self.store.location();
        let record = IndexRecord::now(
            document_id,
            &index_path,
            chunk_count,
            self.embedder.model(),
            self.store.backend(),
            self.embedder.dim(),
        );
        append_index_record(&expand_path(&self.config.metadata_log), &record).await?;
        info!(document_id, chunk_count, "Indexed document");

        let event = ChunksIndexed {
            document_id: document_id.to_string(),
            chunk_count,
            embedding_model: record.embedding_model,
            vector_db: record.vector_db,
            vector_dimension: record.vector_dimension,
            index_path,
        };
        let envelope = EventEnvelope::new(event, &self.config.source, options.correlation_id);
        if let Err(e) = publish_blocking(Arc::clone(&self.sink), envelope).await {
            warn!(document_id, error = %e, "Failed to publish ChunksIndexed");
        }

        Ok(IndexOutcome { document_id: document_id.to_string(), chunk_count, skipped: false, placeholder_embeddings: placeholders })
    }

    /// Index an extracted text file carrying page markers. Missing titles
    /// and urls are looked up in the extraction metadata.
    pub async fn index_file(
        &self,
        document_id: &str,
        text_path: &Path,
        title: Option<String>,
        url: Option<String>,
        options: IndexOptions,
    ) -> Result<IndexOutcome> {
        let text = read_text_file(text_path).await?;
        let (title, url) = match (title, url) {
            (Some(t), Some(u)) => (Some(t), Some(u)),
            (title, url) => {
                let (found_title, found_url) = self.lookup_metadata(document_id).await;
                (title.or(found_title), url.or(found_url))
            }
        };
        let document = Document::from_marked_text(document_id, &text).with_title(title).with_url(url);
        self.index(&document, options).await
    }

    /// Manual re-index from `<text_dir>/<document_id>.txt`.
    pub async fn reindex(&self, document_id: &str) -> Result<IndexOutcome> {
        let path = self.text_path(document_id);
        if !path.exists() {
            return Err(Error::NotFound(format!("text file for '{document_id}' not found at {}", path.display())));
        }
        let correlation_id = format!("manual-{}", Uuid::new_v4());
        info!(document_id, correlation_id = %correlation_id, "Re-indexing document");
        self.index_file(document_id, &path, None, None, IndexOptions::forced().with_correlation(Some(correlation_id)))
            .await
    }

    /// React to a `DocumentExtracted` event.
    pub async fn handle_extracted(&self, envelope: &EventEnvelope<DocumentExtracted>) -> Result<IndexOutcome> {
        let payload = &envelope.payload;
        info!(
            document_id = %payload.document_id,
            text_path = %payload.text_path,
            page_count = ?payload.page_count,
            "Received DocumentExtracted"
        );
        let options = IndexOptions { force: false, correlation_id: envelope.correlation_id.clone() };
        self.index_file(
            &payload.document_id,
            &expand_path(&payload.text_path),
            payload.title().map(str::to_string),
            payload.url.clone(),
            options,
        )
        .await
    }

    /// Index several documents, at most `indexing.concurrency` at a time.
    /// Results come back in completion order.
    pub async fn index_many(&self, documents: Vec<Document>, options: IndexOptions) -> Vec<Result<IndexOutcome>> {
        let concurrency = self.config.concurrency.max(1);
        stream::iter(documents)
            .map(|doc| {
                let options = options.clone();
                async move { self.index(&doc, options).await }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        let journal = latest_index_records(&expand_path(&self.config.metadata_log)).await?;
        Ok(IndexStats {
            documents_indexed: journal.len(),
            chunks_stored: self.store.count(None).await?,
            vector_db: self.store.backend().to_string(),
            embedding_model: self.embedder.model().to_string(),
        })
    }

    pub fn text_path(&self, document_id: &str) -> PathBuf {
        expand_path(&self.config.text_dir).join(format!("{document_id}.txt"))
    }

    async fn lookup_metadata(&self, document_id: &str) -> (Option<String>, Option<String>) {
        match self.config.text_metadata.as_deref() {
            Some(p) => lookup_title_url(&expand_path(p), document_id).await,
            None => (None, None),
        }
    }
}

/// Read an extracted text file; missing files and blank files are errors.
pub async fn read_text_file(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(Error::NotFound(format!("text file not found at {}", path.display())));
    }
    let text = tokio::fs::read_to_string(path).await?;
    if text.trim().is_empty() {
        return Err(Error::InvalidInput(format!("text file at {} is empty", path.display())));
    }
    Ok(text)
}
