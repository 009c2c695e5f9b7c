//! Okapi BM25 over a small, query-local corpus.
//!
//! The corpus is the candidate set of a single query, so statistics (IDF,
//! average length) are computed per call and nothing is persisted. Negative
//! IDF values, which appear for terms present in more than half of the
//! corpus, are floored at `epsilon * average_idf`.
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tantivy::tokenizer::TextAnalyzer;

use ragdb_core::error::{Error, Result};
use ragdb_core::traits::LexicalScorer;

use crate::analyzers::{analyze, bm25_analyzer};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
	pub k1: f32,
	pub b: f32,
	pub epsilon: f32,
}

impl Default for Bm25Params {
	fn default() -> Self {
		Self { k1: 1.5, b: 0.75, epsilon: 0.25 }
	}
}

#[derive(Clone)]
pub struct Bm25Scorer {
	analyzer: TextAnalyzer,
	params: Bm25Params,
}

impl Default for Bm25Scorer {
	fn default() -> Self { Self::new(Bm25Params::default()) }
}

impl Bm25Scorer {
	pub fn new(params: Bm25Params) -> Self {
		Self { analyzer: bm25_analyzer(), params }
	}

	pub fn params(&self) -> Bm25Params { self.params }

	pub fn tokenize(&self, text: &str) -> Vec<String> {
		let mut analyzer = self.analyzer.clone();
		analyze(&mut analyzer, text)
	}

	/// Raw BM25 score of `query` against each document in `corpus`, in order.
	pub fn score(&self, query: &str, corpus: &[&str]) -> Result<Vec<f32>> {
		let mut analyzer = self.analyzer.clone();
		let query_tokens = analyze(&mut analyzer, query);
		let docs: Vec<Vec<String>> = corpus.iter().map(|d| analyze(&mut analyzer, d)).collect();
		score_tokens(&query_tokens, &docs, self.params)
	}

}

impl LexicalScorer for Bm25Scorer {
	fn score_normalized(&self, query: &str, corpus: &[&str]) -> Result<Vec<f32>> {
		Ok(min_max_normalize(&self.score(query, corpus)?))
	}
}

/// BM25 of pre-tokenized input. Repeated query terms contribute repeatedly.
pub fn score_tokens(query: &[String], corpus: &[Vec<String>], params: Bm25Params) -> Result<Vec<f32>> {
	if corpus.is_empty() {
		return Err(Error::InvalidInput("bm25 corpus is empty".into()));
	}

	let n = corpus.len() as f32;
	let total_len: usize = corpus.iter().map(Vec::len).sum();
	let avgdl = total_len as f32 / n;

	let mut doc_freq: HashMap<&str, usize> = HashMap::new();
	let mut term_freqs: Vec<HashMap<&str, usize>> = Vec::with_capacity(corpus.len());
	for doc in corpus {
		let mut tf: HashMap<&str, usize> = HashMap::new();
		for token in doc {
			*tf.entry(token.as_str()).or_insert(0) += 1;
		}
		let seen: HashSet<&str> = tf.keys().copied().collect();
		for term in seen {
			*doc_freq.entry(term).or_insert(0) += 1;
		}
		term_freqs.push(tf);
	}

	let mut idf: HashMap<&str, f32> = HashMap::with_capacity(doc_freq.len());
	let mut idf_sum = 0.0f32;
	let mut negative = Vec::new();
	for (term, df) in &doc_freq {
		let df = *df as f32;
		let value = ((n - df + 0.5) / (df + 0.5)).ln();
		idf_sum += value;
		if value < 0.0 {
			negative.push(*term);
		}
		idf.insert(*term, value);
	}
	if !idf.is_empty() {
		let floor = params.epsilon * (idf_sum / idf.len() as f32);
		for term in negative {
			idf.insert(term, floor);
		}
	}

	let scores = corpus
		.iter()
		.zip(&term_freqs)
		.map(|(doc, tf)| {
			let length_ratio = if avgdl > 0.0 { doc.len() as f32 / avgdl } else { 0.0 };
			let norm = params.k1 * (1.0 - params.b + params.b * length_ratio);
			query
				.iter()
				.map(|q| {
					let f = tf.get(q.as_str()).copied().unwrap_or(0) as f32;
					let w = idf.get(q.as_str()).copied().unwrap_or(0.0);
					w * (f * (params.k1 + 1.0)) / (f + norm)
				})
				.sum::<f32>()
		})
		.collect();
	Ok(scores)
}

/// Min-max rescale onto `[0, 1]`. When every score is equal (including a
/// single score) the result is all zeros. Non-finite inputs count as the
/// minimum.
pub fn min_max_normalize(scores: &[f32]) -> Vec<f32> {
	let finite = scores.iter().copied().filter(|s| s.is_finite());
	let (min, max) = finite.fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), s| (lo.min(s), hi.max(s)));
	if max <= min {
		return vec![0.0; scores.len()];
	}
	let span = max - min;
	scores
		.iter()
		.map(|s| if s.is_finite() { ((s - min) / span).clamp(0.0, 1.0) } else { 0.0 })
		.collect()
}
