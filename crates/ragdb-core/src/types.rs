//! Domain types shared by the chunker, the collaborator adapters and the
//! retrieval engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

pub type ChunkId = String;

/// Upper bound for `top_k` accepted by the search surface.
pub const MAX_TOP_K: usize = 50;

/// One page of extracted text, numbered from 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub number: u32,
    pub text: String,
}

/// A source document as handed over by the extraction step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub document_id: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub pages: Vec<Page>,
}

impl Document {
    pub fn new(document_id: impl Into<String>, pages: Vec<Page>) -> Self {
        Self { document_id: document_id.into(), title: None, url: None, pages }
    }

    /// Build a document from text carrying `--- page N ---` markers.
    /// Marker recoveries are logged by [`crate::pages::split_pages`].
    pub fn from_marked_text(document_id: impl Into<String>, text: &str) -> Self {
        let split = crate::pages::split_pages(text);
        Self::new(document_id, split.pages)
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }

    pub fn with_url(mut self, url: Option<String>) -> Self {
        self.url = url;
        self
    }
}

/// A bounded span of document text; the unit that gets embedded and retrieved.
///
/// - `chunk_id`: `<document_id>-<seq:04>`, seq counting from 1 per document
/// - `page`: page the chunk content was taken from (1 when unknown)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: ChunkId,
    pub document_id: String,
    pub text: String,
    pub page: u32,
    pub title: Option<String>,
    pub url: Option<String>,
}

impl Chunk {
    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            document_id: self.document_id.clone(),
            chunk_id: self.chunk_id.clone(),
            title: self.title.clone(),
            url: self.url.clone(),
            page: self.page,
        }
    }
}

/// Where an embedding vector came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Produced by the configured embedding model.
    Model,
    /// Deterministic stand-in used while the model is unreachable.
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub provenance: Provenance,
}

impl Embedding {
    pub fn model(vector: Vec<f32>) -> Self {
        Self { vector, provenance: Provenance::Model }
    }

    pub fn placeholder(vector: Vec<f32>) -> Self {
        Self { vector, provenance: Provenance::Placeholder }
    }

    pub fn is_placeholder(&self) -> bool {
        self.provenance == Provenance::Placeholder
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub embedding: Embedding,
}

impl EmbeddedChunk {
    pub fn into_record(self) -> StoreRecord {
        StoreRecord {
            id: self.chunk.chunk_id.clone(),
            metadata: self.chunk.metadata(),
            embedding: self.embedding.vector,
            document: self.chunk.text,
        }
    }
}

/// Metadata persisted next to every chunk vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub document_id: String,
    pub chunk_id: ChunkId,
    pub title: Option<String>,
    pub url: Option<String>,
    pub page: u32,
}

/// Per-chunk record written to the vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreRecord {
    pub id: ChunkId,
    pub embedding: Vec<f32>,
    pub document: String,
    pub metadata: ChunkMetadata,
}

/// Restricts store reads and deletes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    DocumentId(String),
}

impl Filter {
    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        match self {
            Self::DocumentId(id) => metadata.document_id == *id,
        }
    }
}

/// A nearest-neighbour hit returned by the vector store.
///
/// `distance` is cosine distance in `[0, 2]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub chunk_id: ChunkId,
    pub metadata: ChunkMetadata,
    pub text: String,
    pub distance: f32,
}

impl Candidate {
    /// `clamp(1 - distance / 2, 0, 1)`; NaN distances score 0.
    pub fn similarity(&self) -> f32 {
        let sim = 1.0 - self.distance / 2.0;
        if sim.is_nan() { 0.0 } else { sim.clamp(0.0, 1.0) }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Semantic,
    Bm25,
    Hybrid,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Bm25 => "bm25",
            Self::Hybrid => "hybrid",
        }
    }

    /// Modes that re-rank a widened semantic candidate pool lexically.
    pub fn uses_lexical(&self) -> bool {
        matches!(self, Self::Bm25 | Self::Hybrid)
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "semantic" => Ok(Self::Semantic),
            "bm25" => Ok(Self::Bm25),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(Error::InvalidInput(format!("unknown mode '{other}'"))),
        }
    }
}

/// A validated search query. Construct through [`Query::new`] or
/// [`SearchRequest::into_query`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    text: String,
    top_k: usize,
    mode: SearchMode,
    document_id: Option<String>,
}

impl Query {
    pub fn new(text: impl Into<String>, top_k: usize, mode: SearchMode) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("query text must not be empty".into()));
        }
        if !(1..=MAX_TOP_K).contains(&top_k) {
            return Err(Error::InvalidInput(format!("top_k must be within 1..={MAX_TOP_K}, got {top_k}")));
        }
        Ok(Self { text, top_k, mode, document_id: None })
    }

    pub fn with_document(mut self, document_id: Option<String>) -> Self {
        self.document_id = document_id.filter(|id| !id.trim().is_empty());
        self
    }

    pub fn text(&self) -> &str { &self.text }
    pub fn top_k(&self) -> usize { self.top_k }
    pub fn mode(&self) -> SearchMode { self.mode }
    pub fn document_id(&self) -> Option<&str> { self.document_id.as_deref() }

    pub fn filter(&self) -> Option<Filter> {
        self.document_id.clone().map(Filter::DocumentId)
    }
}

/// Search request as it arrives on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub q: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub document_id: Option<String>,
}

fn default_top_k() -> usize { 5 }
fn default_mode() -> String { SearchMode::Semantic.as_str().to_string() }

impl SearchRequest {
    pub fn into_query(self) -> Result<Query> {
        let mode: SearchMode = self.mode.parse()?;
        Ok(Query::new(self.q, self.top_k, mode)?.with_document(self.document_id))
    }
}

/// Normalized per-result scores, each in `[0, 1]` when present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub semantic: Option<f32>,
    pub bm25: Option<f32>,
    pub combined: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredResult {
    pub document_id: String,
    pub chunk_id: ChunkId,
    pub page: u32,
    pub title: Option<String>,
    pub url: Option<String>,
    pub snippet: String,
    pub scores: Scores,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query_id: String,
    pub query: String,
    pub top_k: usize,
    pub mode: SearchMode,
    pub duration_ms: u64,
    /// Set when the query vector is a placeholder rather than a model embedding.
    #[serde(default)]
    pub degraded: bool,
    pub results: Vec<ScoredResult>,
}

impl SearchResponse {
    pub fn top_score(&self) -> Option<f32> {
        self.results
            .iter()
            .filter_map(|r| r.scores.combined)
            .fold(None, |acc: Option<f32>, s| Some(acc.map_or(s, |a| a.max(s))))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Down,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingHealth {
    pub reachable: bool,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreHealth {
    pub reachable: bool,
    pub backend: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub embedding: EmbeddingHealth,
    pub vector_store: StoreHealth,
}

impl HealthReport {
    /// Both collaborators up: ok; one up: degraded; none: down. A placeholder
    /// embedder in use never reports ok.
    pub fn from_parts(embedding: EmbeddingHealth, vector_store: StoreHealth, placeholder_active: bool) -> Self {
        let status = match (embedding.reachable, vector_store.reachable) {
            (true, true) if !placeholder_active => HealthStatus::Ok,
            (false, false) => HealthStatus::Down,
            _ => HealthStatus::Degraded,
        };
        Self { status, embedding, vector_store }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_validation_rejects_bad_input() {
        assert!(matches!(Query::new("   ", 5, SearchMode::Hybrid), Err(Error::InvalidInput(_))));
        assert!(matches!(Query::new("appeal", 0, SearchMode::Hybrid), Err(Error::InvalidInput(_))));
        assert!(matches!(Query::new("appeal", 51, SearchMode::Hybrid), Err(Error::InvalidInput(_))));
        assert!(Query::new("appeal", 50, SearchMode::Semantic).is_ok());
    }

    #[test]
    fn unknown_mode_is_input_error() {
        let req = SearchRequest { q: "x".into(), top_k: 3, mode: "fuzzy".into(), document_id: None };
        assert!(matches!(req.into_query(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn similarity_maps_cosine_distance() {
        let meta = ChunkMetadata { document_id: "d".into(), chunk_id: "d-0001".into(), title: None, url: None, page: 1 };
        let mut c = Candidate { chunk_id: "d-0001".into(), metadata: meta, text: String::new(), distance: 0.0 };
        assert_eq!(c.similarity(), 1.0);
        c.distance = 2.0;
        assert_eq!(c.similarity(), 0.0);
        c.distance = 1.0;
        assert!((c.similarity() - 0.5).abs() < 1e-6);
        c.distance = 3.5;
        assert_eq!(c.similarity(), 0.0);
    }

    #[test]
    fn health_status_rules() {
        let emb = |r| EmbeddingHealth { reachable: r, model: "m".into() };
        let st = |r| StoreHealth { reachable: r, backend: "memory".into() };
        assert_eq!(HealthReport::from_parts(emb(true), st(true), false).status, HealthStatus::Ok);
        assert_eq!(HealthReport::from_parts(emb(true), st(true), true).status, HealthStatus::Degraded);
        assert_eq!(HealthReport::from_parts(emb(false), st(true), false).status, HealthStatus::Degraded);
        assert_eq!(HealthReport::from_parts(emb(false), st(false), false).status, HealthStatus::Down);
    }

    #[test]
    fn scores_serialize_missing_as_null() {
        let s = Scores { semantic: Some(0.5), bm25: None, combined: Some(0.5) };
        let json = serde_json::to_value(s).expect("json");
        assert!(json["bm25"].is_null());
    }
}
