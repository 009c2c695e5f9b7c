//! ragdb-text
//!
//! Lexical side of retrieval: tantivy analyzers, a word-level token counter
//! for chunk budgets and candidate-local BM25 scoring.
pub mod analyzers;
pub mod bm25;

pub use analyzers::{bm25_analyzer, WordTokenizer};
pub use bm25::{min_max_normalize, score_tokens, Bm25Params, Bm25Scorer};
