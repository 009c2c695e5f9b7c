use std::ops::Range;
use std::sync::Arc;

use ragdb_core::{ChunkingConfig, Document, Page, Result, SemanticChunker, TokenCounter};

struct WhitespaceCounter;

impl TokenCounter for WhitespaceCounter {
    fn name(&self) -> &str { "whitespace" }

    fn spans(&self, text: &str) -> Result<Vec<Range<usize>>> {
        let mut spans = Vec::new();
        let mut start = None;
        for (i, c) in text.char_indices() {
            match (c.is_whitespace(), start) {
                (true, Some(s)) => {
                    spans.push(s..i);
                    start = None;
                }
                (false, None) => start = Some(i),
                _ => {}
            }
        }
        if let Some(s) = start {
            spans.push(s..text.len());
        }
        Ok(spans)
    }
}

fn words(text: &str) -> Vec<&str> {
    text.split_whitespace().collect()
}

fn chunker(max_tokens: usize, overlap_tokens: usize) -> SemanticChunker {
    SemanticChunker::new(Arc::new(WhitespaceCounter), ChunkingConfig { max_tokens, overlap_tokens })
        .expect("valid chunking config")
}

/// Several pages of mixed paragraph and sentence lengths, including one
/// sentence far longer than any budget used below.
fn long_document() -> String {
    let mut text = String::new();
    let mut n = 0;
    for page in 1..=3 {
        text.push_str(&format!("--- page {page} ---\n"));
        for para in 0..4 {
            for sentence in 0..(2 + para) {
                let len = 3 + (sentence * 7 + para * 5 + page) % 11;
                let body: Vec<String> = (0..len).map(|_| { n += 1; format!("t{n}") }).collect();
                text.push_str(&body.join(" "));
                text.push_str(". ");
            }
            text.push_str("\n\n");
        }
        if page == 2 {
            let run: Vec<String> = (0..70).map(|_| { n += 1; format!("r{n}") }).collect();
            text.push_str(&run.join(" "));
            text.push_str("\n\n");
        }
    }
    text
}

fn body_words(text: &str) -> Vec<&str> {
    text.lines()
        .filter(|l| !l.trim().starts_with("--- page "))
        .flat_map(str::split_whitespace)
        .collect()
}

#[test]
fn two_pages_give_two_numbered_chunks() {
    let text = "--- page 1 ---\nStudents may appeal a decision within ten working days.\n\
                --- page 2 ---\nThe appeal deadline can be extended in exceptional cases.\n";
    let out = chunker(450, 50).chunk_text(text, "doc", Some("Appeals"), Some("https://example.org/appeals.pdf"))
        .expect("chunk");

    assert_eq!(out.chunks.len(), 2);
    assert_eq!(out.chunks[0].chunk_id, "doc-0001");
    assert_eq!(out.chunks[0].page, 1);
    assert_eq!(out.chunks[1].chunk_id, "doc-0002");
    assert_eq!(out.chunks[1].page, 2);
    assert!(out.chunks[1].text.ends_with("exceptional cases."));
    assert!(out.chunks.iter().all(|c| c.title.as_deref() == Some("Appeals")));
    assert_eq!(out.report.pages, 2);
}

#[test]
fn chunking_is_deterministic() {
    let text = long_document();
    let a = chunker(40, 8).chunk_text(&text, "d", None, None).expect("chunk");
    let b = chunker(40, 8).chunk_text(&text, "d", None, None).expect("chunk");
    assert_eq!(a.chunks, b.chunks);
}

#[test]
fn chunk_ids_are_sequential() {
    let out = chunker(30, 5).chunk_text(&long_document(), "handbook", None, None).expect("chunk");
    for (i, chunk) in out.chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_id, format!("handbook-{:04}", i + 1));
        assert_eq!(chunk.document_id, "handbook");
    }
}

#[test]
fn adjacent_chunks_share_the_overlap_tail() {
    let overlap = 6;
    let out = chunker(35, overlap).chunk_text(&long_document(), "d", None, None).expect("chunk");
    assert!(out.chunks.len() > 3);
    for pair in out.chunks.windows(2) {
        let prev = words(&pair[0].text);
        let next = words(&pair[1].text);
        let k = overlap.min(prev.len());
        assert_eq!(&next[..k], &prev[prev.len() - k..], "overlap mismatch after {}", pair[0].chunk_id);
    }
}

#[test]
fn non_overlap_content_stays_within_budget() {
    for (max, overlap) in [(20, 0), (35, 6), (64, 16)] {
        let out = chunker(max, overlap).chunk_text(&long_document(), "d", None, None).expect("chunk");
        for (i, chunk) in out.chunks.iter().enumerate() {
            let len = words(&chunk.text).len();
            let prefix = if i == 0 { 0 } else { overlap.min(words(&out.chunks[i - 1].text).len()) };
            assert!(len - prefix <= max, "{} carries {} new tokens (max {max})", chunk.chunk_id, len - prefix);
        }
    }
}

#[test]
fn non_overlap_regions_reconstruct_the_text() {
    let text = long_document();
    let overlap = 5;
    let out = chunker(32, overlap).chunk_text(&text, "d", None, None).expect("chunk");

    let mut rebuilt: Vec<&str> = Vec::new();
    for (i, chunk) in out.chunks.iter().enumerate() {
        let w = words(&chunk.text);
        let skip = if i == 0 { 0 } else { overlap.min(words(&out.chunks[i - 1].text).len()) };
        rebuilt.extend_from_slice(&w[skip..]);
    }
    assert_eq!(rebuilt, body_words(&text));
    assert!(out.report.hard_splits >= 1);
}

#[test]
fn chunk_tokens_cover_the_document() {
    let text = long_document();
    let out = chunker(50, 10).chunk_text(&text, "d", None, None).expect("chunk");
    let total: usize = out.chunks.iter().map(|c| words(&c.text).len()).sum();
    assert!(total >= body_words(&text).len());
    assert_eq!(total, out.report.total_tokens);
}

#[test]
fn pre_split_document_keeps_page_numbers() {
    let doc = Document::new(
        "regs",
        vec![
            Page { number: 4, text: "Fees are payable in advance.".into() },
            Page { number: 5, text: "   ".into() },
            Page { number: 6, text: "Refunds follow the schedule.".into() },
        ],
    )
    .with_title(Some("Regulations".into()));

    let out = chunker(100, 0).chunk_document(&doc).expect("chunk");
    let pages: Vec<u32> = out.chunks.iter().map(|c| c.page).collect();
    assert_eq!(pages, vec![4, 6]);
    assert_eq!(out.chunks[1].title.as_deref(), Some("Regulations"));
}

#[test]
fn malformed_markers_are_counted_not_fatal() {
    let text = "--- page 1 ---\nalpha.\n--- page two ---\nbeta.\n";
    let out = chunker(100, 0).chunk_text(text, "d", None, None).expect("chunk");
    assert_eq!(out.report.malformed_markers, 1);
    assert_eq!(out.chunks.last().map(|c| c.page), Some(2));
}

#[test]
fn blank_text_yields_no_chunks() {
    let out = chunker(100, 10).chunk_text(" \n\n \t", "d", None, None).expect("chunk");
    assert!(out.chunks.is_empty());
}
