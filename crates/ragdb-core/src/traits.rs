use std::ops::Range;

use async_trait::async_trait;

use crate::error::Result;
use crate::tokens::TokenSeq;
use crate::types::{Candidate, Embedding, Filter, StoreRecord};

/// Token accounting for a fixed vocabulary. Only used to measure and cut
/// text, never for semantics.
pub trait TokenCounter: Send + Sync {
    fn name(&self) -> &str;

    /// Byte spans of every token in `text`, in order.
    fn spans(&self, text: &str) -> Result<Vec<Range<usize>>>;

    fn encode<'a>(&self, text: &'a str) -> Result<TokenSeq<'a>> {
        Ok(TokenSeq::new(text, self.spans(text)?))
    }

    fn count(&self, text: &str) -> Result<usize> {
        Ok(self.encode(text)?.len())
    }
}

/// Turns text into a vector. Implementations may block on the network.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier recorded in index metadata.
    fn model(&self) -> &str;

    fn dim(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Embedding>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Whether the underlying model answers right now.
    async fn probe(&self) -> bool {
        self.embed(".").await.is_ok_and(|e| !e.is_placeholder())
    }

    /// True once a placeholder vector has been handed out.
    fn degraded(&self) -> bool { false }
}

/// Lexical relevance of a query against a candidate-local corpus.
pub trait LexicalScorer: Send + Sync {
    /// One score per corpus entry, in order, rescaled onto `[0, 1]`.
    fn score_normalized(&self, query: &str, corpus: &[&str]) -> Result<Vec<f32>>;
}

/// Persistence and nearest-neighbour lookup for chunk vectors. Must tolerate
/// concurrent queries alongside upserts and deletes.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short backend name recorded in index metadata (e.g. `LanceDB`).
    fn backend(&self) -> &str;

    /// Where the index lives, for the metadata journal.
    fn location(&self) -> String;

    /// Insert or replace records keyed by `id`.
    async fn upsert(&self, records: Vec<StoreRecord>) -> Result<usize>;

    /// Up to `k` nearest records by cosine distance, closest first.
    async fn query(&self, vector: &[f32], k: usize, filter: Option<&Filter>) -> Result<Vec<Candidate>>;

    /// Remove every record matching `filter`, returning how many went.
    async fn delete(&self, filter: &Filter) -> Result<usize>;

    async fn count(&self, filter: Option<&Filter>) -> Result<usize>;

    async fn ping(&self) -> Result<()> {
        self.count(None).await.map(|_| ())
    }
}
