//! Token-budgeted chunking of page text with overlap between consecutive
//! chunks.
//!
//! Pages are hard boundaries: the open chunk is flushed at the end of every
//! page. Inside a page the chunker packs whole paragraphs, falls back to
//! sentences when a paragraph does not fit, and cuts on raw token offsets
//! only for sentences longer than the whole budget. Each flushed chunk
//! leaves its last `overlap_tokens` tokens behind as the prefix of the next.

use std::mem;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::pages::split_pages;
use crate::traits::TokenCounter;
use crate::types::{Chunk, Document, Page};

const PARAGRAPH_JOINER: &str = "\n\n";
const SENTENCE_JOINER: &str = " ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_tokens: 450, overlap_tokens: 50 }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(Error::InvalidConfig("chunking.max_tokens must be at least 1".into()));
        }
        if self.overlap_tokens >= self.max_tokens {
            return Err(Error::InvalidConfig(format!(
                "chunking.overlap_tokens ({}) must be smaller than max_tokens ({})",
                self.overlap_tokens, self.max_tokens
            )));
        }
        Ok(())
    }
}

/// Counters collected while chunking one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChunkingReport {
    pub pages: usize,
    pub malformed_markers: usize,
    /// Sentences that had to be cut on token offsets.
    pub hard_splits: usize,
    /// Tokens across all emitted chunks, overlap included.
    pub total_tokens: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ChunkingOutput {
    pub chunks: Vec<Chunk>,
    pub report: ChunkingReport,
}

/// A chunk as it leaves [`ChunkState::flush`], before ids and document
/// metadata are attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emitted {
    pub seq: usize,
    pub page: u32,
    pub text: String,
    pub tokens: usize,
}

/// Running state of the chunker for one document.
#[derive(Debug, Clone)]
pub struct ChunkState {
    buffer: String,
    tokens: usize,
    overlap: String,
    overlap_tokens: usize,
    page: u32,
    next_seq: usize,
}

impl Default for ChunkState {
    fn default() -> Self { Self::new() }
}

impl ChunkState {
    pub fn new() -> Self {
        Self { buffer: String::new(), tokens: 0, overlap: String::new(), overlap_tokens: 0, page: 1, next_seq: 1 }
    }

    pub fn start_page(&mut self, page: u32) {
        self.page = page;
    }

    pub fn page(&self) -> u32 { self.page }

    pub fn is_open(&self) -> bool { !self.buffer.is_empty() }

    /// Overlap text waiting to prefix the next chunk.
    pub fn pending_overlap(&self) -> &str { &self.overlap }

    /// Tokens the next chunk already holds. While no chunk is open this is
    /// the pending overlap, which will be placed ahead of any new content.
    pub fn used(&self) -> usize {
        if self.is_open() { self.tokens } else { self.overlap_tokens }
    }

    pub fn fits(&self, tokens: usize, max_tokens: usize) -> bool {
        self.used() + tokens <= max_tokens
    }

    pub fn room(&self, max_tokens: usize) -> usize {
        max_tokens.saturating_sub(self.used())
    }

    /// Add content to the open chunk, opening one (with the pending overlap
    /// in front) if needed.
    pub fn append(&mut self, piece: &str, tokens: usize, joiner: &str) {
        if !self.is_open() && !self.overlap.is_empty() {
            self.buffer = mem::take(&mut self.overlap);
            self.tokens = mem::take(&mut self.overlap_tokens);
        }
        if self.is_open() {
            self.buffer.push_str(joiner);
        }
        self.buffer.push_str(piece);
        self.tokens += tokens;
    }

    /// Close the open chunk and keep its trailing `overlap` tokens for the
    /// next one. Returns `None` when nothing but whitespace was buffered.
    pub fn flush(&mut self, counter: &dyn TokenCounter, overlap: usize) -> Result<Option<Emitted>> {
        let buffer = mem::take(&mut self.buffer);
        self.tokens = 0;
        let text = buffer.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let seq = counter.encode(text)?;
        let keep = overlap.min(seq.len());
        self.overlap = seq.tail(keep).trim().to_string();
        self.overlap_tokens = keep;

        let emitted = Emitted { seq: self.next_seq, page: self.page, text: text.to_string(), tokens: seq.len() };
        self.next_seq += 1;
        Ok(Some(emitted))
    }
}

/// Splits documents into overlapping, token-bounded chunks.
#[derive(Clone)]
pub struct SemanticChunker {
    counter: Arc<dyn TokenCounter>,
    config: ChunkingConfig,
}

impl SemanticChunker {
    pub fn new(counter: Arc<dyn TokenCounter>, config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { counter, config })
    }

    pub fn config(&self) -> &ChunkingConfig { &self.config }

    pub fn tokenizer(&self) -> &str { self.counter.name() }

    /// Chunk marker-delimited text (`--- page N ---`).
    pub fn chunk_text(
        &self,
        text: &str,
        document_id: &str,
        title: Option<&str>,
        url: Option<&str>,
    ) -> Result<ChunkingOutput> {
        let split = split_pages(text);
        let mut output = self.chunk_pages(&split.pages, document_id, title, url)?;
        output.report.malformed_markers = split.malformed_markers;
        Ok(output)
    }

    pub fn chunk_document(&self, document: &Document) -> Result<ChunkingOutput> {
        self.chunk_pages(&document.pages, &document.document_id, document.title.as_deref(), document.url.as_deref())
    }

    fn chunk_pages(
        &self,
        pages: &[Page],
        document_id: &str,
        title: Option<&str>,
        url: Option<&str>,
    ) -> Result<ChunkingOutput> {
        if document_id.trim().is_empty() {
            return Err(Error::InvalidInput("document_id must not be empty".into()));
        }

        let mut state = ChunkState::new();
        let mut emitted = Vec::new();
        let mut report = ChunkingReport { pages: pages.len(), ..Default::default() };

        for page in pages {
            state.start_page(page.number);
            for paragraph in paragraphs(&page.text) {
                self.push_paragraph(&mut state, paragraph, &mut emitted, &mut report)?;
            }
            self.flush(&mut state, &mut emitted)?;
        }

        report.total_tokens = emitted.iter().map(|e| e.tokens).sum();
        let chunks: Vec<Chunk> = emitted
            .into_iter()
            .map(|e| Chunk {
                chunk_id: format!("{document_id}-{:04}", e.seq),
                document_id: document_id.to_string(),
                text: e.text,
                page: e.page,
                title: title.map(str::to_string),
                url: url.map(str::to_string),
            })
            .collect();

        debug!(
            document_id,
            chunks = chunks.len(),
            total_tokens = report.total_tokens,
            hard_splits = report.hard_splits,
            max_tokens = self.config.max_tokens,
            overlap_tokens = self.config.overlap_tokens,
            "Created semantic chunks"
        );
        Ok(ChunkingOutput { chunks, report })
    }

    fn push_paragraph(
        &self,
        state: &mut ChunkState,
        paragraph: &str,
        out: &mut Vec<Emitted>,
        report: &mut ChunkingReport,
    ) -> Result<()> {
        let max = self.config.max_tokens;
        let tokens = self.counter.count(paragraph)?;
        if state.fits(tokens, max) {
            state.append(paragraph, tokens, PARAGRAPH_JOINER);
            return Ok(());
        }

        for sentence in sentences(paragraph) {
            let tokens = self.counter.count(sentence)?;
            if state.fits(tokens, max) {
                state.append(sentence, tokens, SENTENCE_JOINER);
            } else if tokens <= max {
                self.flush(state, out)?;
                state.append(sentence, tokens, SENTENCE_JOINER);
            } else {
                report.hard_splits += 1;
                self.hard_split(state, sentence, out)?;
            }
        }
        Ok(())
    }

    fn hard_split(&self, state: &mut ChunkState, sentence: &str, out: &mut Vec<Emitted>) -> Result<()> {
        let max = self.config.max_tokens;
        let seq = self.counter.encode(sentence)?;
        let mut i = 0;
        while i < seq.len() {
            let room = state.room(max);
            if room == 0 {
                self.flush(state, out)?;
                continue;
            }
            let take = room.min(seq.len() - i);
            let piece = seq.segment(i..i + take).trim();
            state.append(piece, take, SENTENCE_JOINER);
            i += take;
            if state.used() >= max {
                self.flush(state, out)?;
            }
        }
        Ok(())
    }

    fn flush(&self, state: &mut ChunkState, out: &mut Vec<Emitted>) -> Result<()> {
        if let Some(e) = state.flush(self.counter.as_ref(), self.config.overlap_tokens)? {
            out.push(e);
        }
        Ok(())
    }
}

/// Paragraphs separated by blank (or whitespace-only) lines, trimmed, empty
/// ones dropped.
pub fn paragraphs(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    let mut end = 0;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.trim().is_empty() {
            if let Some(s) = start.take() {
                out.push(text[s..end].trim());
            }
        } else {
            start.get_or_insert(offset);
            end = offset + line.len();
        }
        offset += line.len();
    }
    if let Some(s) = start {
        out.push(text[s..end].trim());
    }
    out.retain(|p| !p.is_empty());
    out
}

/// Sentences ending in `.`, `!` or `?` followed by whitespace.
pub fn sentences(paragraph: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut prev: Option<char> = None;
    let mut chars = paragraph.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c.is_whitespace() && matches!(prev, Some('.' | '!' | '?')) {
            out.push(&paragraph[start..i]);
            let mut next = i + c.len_utf8();
            while let Some(&(j, d)) = chars.peek() {
                if !d.is_whitespace() {
                    break;
                }
                next = j + d.len_utf8();
                chars.next();
            }
            start = next;
            prev = None;
            continue;
        }
        prev = Some(c);
    }
    if start < paragraph.len() {
        out.push(&paragraph[start..]);
    }
    out.into_iter().map(str::trim).filter(|s| !s.is_empty()).collect()
}
