//! Wiring shared by the `ragdb` binary: builds the configured collaborators
//! once and hands out the indexer and the retrieval engine.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use walkdir::WalkDir;

use ragdb_core::config::Settings;
use ragdb_core::traits::{Embedder, VectorStore};
use ragdb_core::SemanticChunker;
use ragdb_embed::build_embedder;
use ragdb_hybrid::{build_sink, build_token_counter, Indexer, RetrievalEngine};
use ragdb_vector::open_store;

pub struct App {
    pub settings: Settings,
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<dyn VectorStore>,
    pub indexer: Indexer,
    pub engine: RetrievalEngine,
}

impl App {
    pub async fn open(settings: Settings) -> Result<Self> {
        let chunker = chunker(&settings)?;
        let embedder = build_embedder(&settings.embedding).context("building embedder")?;
        let store = open_store(&settings.storage, embedder.dim())
            .await
            .with_context(|| format!("opening vector store at {}", settings.storage.path))?;
        let sink = build_sink(&settings.events)?;
        info!(
            embedder = embedder.model(),
            dim = embedder.dim(),
            store = store.backend(),
            location = %store.location(),
            tokenizer = chunker.tokenizer(),
            "Opened ragdb"
        );

        let indexer = Indexer::new(chunker, Arc::clone(&embedder), Arc::clone(&store), settings.indexing.clone())
            .with_sink(Arc::clone(&sink))
            .with_batch_size(settings.embedding.batch_size);
        let engine = RetrievalEngine::new(Arc::clone(&embedder), Arc::clone(&store), settings.retrieval.clone())?
            .with_sink(sink);
        Ok(Self { settings, embedder, store, indexer, engine })
    }
}

/// Chunker alone, for commands that never touch the store.
pub fn chunker(settings: &Settings) -> Result<SemanticChunker> {
    let counter = build_token_counter(&settings.embedding)?;
    Ok(SemanticChunker::new(counter, settings.chunking)?)
}

/// `*.txt` files under `dir`, sorted by path.
pub fn text_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.with_context(|| format!("walking {}", dir.display()))?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|ext| ext == "txt") {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

/// Document id derived from an extracted file name (`<id>.txt`).
pub fn document_id_for(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .with_context(|| format!("cannot derive a document id from {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn finds_text_files_recursively() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(tmp.path().join("nested")).expect("mkdir");
        fs::write(tmp.path().join("b.txt"), "b").expect("write");
        fs::write(tmp.path().join("nested/a.txt"), "a").expect("write");
        fs::write(tmp.path().join("notes.md"), "skip").expect("write");

        let files = text_files(tmp.path()).expect("walk");
        let ids: Vec<String> = files.iter().map(|p| document_id_for(p).expect("id")).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }
}
