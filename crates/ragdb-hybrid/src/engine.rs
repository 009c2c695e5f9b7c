//! Query-time retrieval: one engine for every search mode.
//!
//! Semantic candidates come from the vector store. Lexical modes widen the
//! candidate pool, score it with BM25 and re-rank by the fused score. The
//! full index is never searched lexically.
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use uuid::Uuid;

use ragdb_core::config::{expand_path, RetrievalConfig};
use ragdb_core::error::{Component, Error, Result};
use ragdb_core::events::{EventEnvelope, EventSink, NullSink, RetrievalCompleted, RetrievedHit};
use ragdb_core::traits::{Embedder, LexicalScorer, VectorStore};
use ragdb_core::types::{
    Candidate, EmbeddingHealth, HealthReport, Query, ScoredResult, Scores, SearchMode, SearchRequest, SearchResponse,
    StoreHealth,
};
use ragdb_text::Bm25Scorer;

use crate::fusion::{fuse, rank_descending};
use crate::journal::{append_query_record, QueryRecord};
use crate::publish_blocking;

/// Snippet length in characters, ellipsis included.
pub const SNIPPET_CHARS: usize = 220;

pub struct RetrievalEngine {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    scorer: Arc<dyn LexicalScorer>,
    config: RetrievalConfig,
    sink: Arc<dyn EventSink>,
    query_log: Option<PathBuf>,
    bm25_fallbacks: AtomicU64,
}

impl RetrievalEngine {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>, config: RetrievalConfig) -> Result<Self> {
        config.validate()?;
        let query_log = config.query_log.as_deref().map(expand_path);
        Ok(Self {
            embedder,
            store,
            scorer: Arc::new(Bm25Scorer::default()),
            config,
            sink: Arc::new(NullSink),
            query_log,
            bm25_fallbacks: AtomicU64::new(0),
        })
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn LexicalScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn config(&self) -> &RetrievalConfig { &self.config }

    /// Requests whose lexical scoring failed and were ranked semantically.
    pub fn bm25_fallbacks(&self) -> u64 { self.bm25_fallbacks.load(Ordering::Relaxed) }

    /// Validate a wire request, then search. Invalid requests never reach
    /// the embedder or the store.
    pub async fn search_request(&self, request: SearchRequest, correlation_id: Option<String>) -> Result<SearchResponse> {
        let query = request.into_query()?;
        self.search_correlated(&query, correlation_id).await
    }

    pub async fn search(&self, query: &Query) -> Result<SearchResponse> {
        self.search_correlated(query, None).await
    }

    pub async fn search_correlated(&self, query: &Query, correlation_id: Option<String>) -> Result<SearchResponse> {
        let query_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let (results, degraded) = self.retrieve(query).await.map_err(|e| e.in_query(&query_id, query.mode()))?;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let response = SearchResponse {
            query_id,
            query: query.text().to_string(),
            top_k: query.top_k(),
            mode: query.mode(),
            duration_ms,
            degraded,
            results,
        };
        info!(
            query_id = %response.query_id,
            mode = %response.mode,
            top_k = response.top_k,
            results = response.results.len(),
            duration_ms,
            degraded,
            "Search completed"
        );
        self.record(&response, correlation_id).await;
        Ok(response)
    }

    /// Collaborator reachability. A placeholder embedder in use reports
    /// degraded even when both collaborators answer.
    pub async fn health(&self) -> HealthReport {
        let embedding_ok = self
            .bounded(Component::Embedder, self.embedder.probe())
            .await;
        let store_ok = self.bounded(Component::VectorStore, self.store.ping()).await;
        if let Err(e) = &store_ok {
            warn!(backend = self.store.backend(), error = %e, "Vector store ping failed");
        }
        HealthReport::from_parts(
            EmbeddingHealth { reachable: embedding_ok.unwrap_or(false), model: self.embedder.model().to_string() },
            StoreHealth { reachable: store_ok.is_ok(), backend: self.store.backend().to_string() },
            self.embedder.degraded(),
        )
    }

    async fn retrieve(&self, query: &Query) -> Result<(Vec<ScoredResult>, bool)> {
        let embedding = self.bounded(Component::Embedder, self.embedder.embed(query.text())).await??;
        let degraded = embedding.is_placeholder();
        if degraded {
            warn!(model = self.embedder.model(), "Query embedded with a placeholder vector");
        }

        let pool = self.candidate_pool(query);
        let filter = query.filter();
        let candidates = self
            .bounded(Component::VectorStore, self.store.query(&embedding.vector, pool, filter.as_ref()))
            .await??;
        debug!(pool, candidates = candidates.len(), mode = %query.mode(), "Semantic candidates fetched");

        let results = if query.mode().uses_lexical() {
            self.rerank(query, candidates)
        } else {
            semantic_ranking(candidates, query.top_k())
        };
        Ok((results, degraded))
    }

    /// `top_k` for semantic search, `max(top_k * multiplier, top_k)` when
    /// the pool is re-ranked lexically.
    pub fn candidate_pool(&self, query: &Query) -> usize {
        if query.mode().uses_lexical() {
            query.top_k().saturating_mul(self.config.candidate_multiplier).max(query.top_k())
        } else {
            query.top_k()
        }
    }

    fn rerank(&self, query: &Query, candidates: Vec<Candidate>) -> Vec<ScoredResult> {
        if candidates.is_empty() {
            return Vec::new();
        }
        if query.mode() == SearchMode::Bm25 {
            debug!("bm25 mode served by hybrid re-rank over semantic candidates");
        }
        let corpus: Vec<&str> = candidates.iter().map(|c| c.text.as_str()).collect();
        let lexical = match self.scorer.score_normalized(query.text(), &corpus) {
            Ok(scores) => scores,
            Err(e) => {
                let total = self.bm25_fallbacks.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(error = %e, fallbacks = total, "BM25 scoring failed, ranking semantically");
                return semantic_ranking(candidates, query.top_k());
            }
        };

        let semantic: Vec<f32> = candidates.iter().map(Candidate::similarity).collect();
        let combined = fuse(&semantic, &lexical, self.config.alpha);
        let mut slots: Vec<Option<Candidate>> = candidates.into_iter().map(Some).collect();
        rank_descending(&combined)
            .into_iter()
            .take(query.top_k())
            .filter_map(|i| {
                let candidate = slots[i].take()?;
                let scores = Scores { semantic: Some(semantic[i]), bm25: Some(lexical[i]), combined: Some(combined[i]) };
                Some(to_result(candidate, scores))
            })
            .collect()
    }

    async fn bounded<T>(&self, component: Component, fut: impl Future<Output = T>) -> Result<T> {
        let after_ms = self.config.request_timeout_ms;
        tokio::time::timeout(Duration::from_millis(after_ms), fut)
            .await
            .map_err(|_| Error::Timeout { component, after_ms })
    }

    /// Journal and event publication. Failures here never fail the search.
    async fn record(&self, response: &SearchResponse, correlation_id: Option<String>) {
        if let Some(path) = &self.query_log {
            if let Err(e) = append_query_record(path, &QueryRecord::from(response)).await {
                warn!(path = %path.display(), error = %e, "Failed to append query journal");
            }
        }
        if !self.config.publish_events {
            return;
        }
        let envelope = EventEnvelope::new(completed_event(response), &self.config.source, correlation_id);
        if let Err(e) = publish_blocking(Arc::clone(&self.sink), envelope).await {
            warn!(query_id = %response.query_id, error = %e, "Failed to publish RetrievalCompleted");
        }
    }
}

fn completed_event(response: &SearchResponse) -> RetrievalCompleted {
    RetrievalCompleted {
        query_id: response.query_id.clone(),
        query: response.query.clone(),
        results_count: response.results.len(),
        top_score: response.top_score(),
        latency_ms: response.duration_ms,
        results: response
            .results
            .iter()
            .map(|r| RetrievedHit {
                doc_id: r.document_id.clone(),
                page: r.page,
                title: r.title.clone(),
                url: r.url.clone(),
                score: r.scores.combined,
            })
            .collect(),
    }
}

/// Store order, truncated, with `combined == semantic`.
fn semantic_ranking(candidates: Vec<Candidate>, top_k: usize) -> Vec<ScoredResult> {
    candidates
        .into_iter()
        .take(top_k)
        .map(|c| {
            let sim = c.similarity();
            to_result(c, Scores { semantic: Some(sim), bm25: None, combined: Some(sim) })
        })
        .collect()
}

fn to_result(candidate: Candidate, scores: Scores) -> ScoredResult {
    ScoredResult {
        document_id: candidate.metadata.document_id,
        chunk_id: candidate.chunk_id,
        page: candidate.metadata.page,
        title: candidate.metadata.title,
        url: candidate.metadata.url,
        snippet: snippet(&candidate.text),
        scores,
    }
}

/// Whitespace-collapsed text, cut to [`SNIPPET_CHARS`] with a trailing `…`.
pub fn snippet(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= SNIPPET_CHARS {
        return collapsed;
    }
    let mut out: String = collapsed.chars().take(SNIPPET_CHARS - 1).collect();
    out.push('…');
    out
}
