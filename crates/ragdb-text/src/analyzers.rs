//! Tantivy analyzers shared by lexical scoring and chunk token counting.
use std::ops::Range;

use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, TextAnalyzer, TokenStream, Tokenizer, WhitespaceTokenizer};

use ragdb_core::error::Result;
use ragdb_core::traits::TokenCounter;

/// Lowercased whitespace tokens; no stemming, no stop words.
pub fn bm25_analyzer() -> TextAnalyzer {
	TextAnalyzer::builder(WhitespaceTokenizer::default()).filter(LowerCaser).build()
}

/// Run `text` through `analyzer` and collect the token texts.
pub fn analyze(analyzer: &mut TextAnalyzer, text: &str) -> Vec<String> {
	let mut stream = analyzer.token_stream(text);
	let mut out = Vec::new();
	while stream.advance() {
		out.push(stream.token().text.clone());
	}
	out
}

/// Counts alphanumeric words using tantivy's `SimpleTokenizer`. The default
/// chunk budget tokenizer when no model vocabulary is configured.
#[derive(Debug, Clone, Default)]
pub struct WordTokenizer;

impl TokenCounter for WordTokenizer {
	fn name(&self) -> &str { "words" }

	fn spans(&self, text: &str) -> Result<Vec<Range<usize>>> {
		let mut tokenizer = SimpleTokenizer::default();
		let mut stream = tokenizer.token_stream(text);
		let mut spans = Vec::new();
		while stream.advance() {
			let token = stream.token();
			spans.push(token.offset_from..token.offset_to);
		}
		Ok(spans)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bm25_tokens_are_lowercased_whitespace_splits() {
		let mut analyzer = bm25_analyzer();
		assert_eq!(analyze(&mut analyzer, "Appeal  DEADLINE, extended."), vec!["appeal", "deadline,", "extended."]);
	}

	#[test]
	fn word_tokenizer_skips_punctuation() {
		let seq = WordTokenizer.encode("Appeals: within 10 days!").expect("encode");
		assert_eq!(seq.len(), 4);
		assert_eq!(seq.slice(0..1), "Appeals");
		assert_eq!(seq.tail(2), "10 days!");
		assert_eq!(WordTokenizer.count("   ").expect("count"), 0);
	}
}
