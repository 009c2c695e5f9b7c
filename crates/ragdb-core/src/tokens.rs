use std::ops::Range;

/// A tokenized view of a string. Tokens are byte spans into the source text,
/// so decoding a run of tokens is a slice of the original input.
#[derive(Debug, Clone)]
pub struct TokenSeq<'a> {
    text: &'a str,
    spans: Vec<Range<usize>>,
}

impl<'a> TokenSeq<'a> {
    /// Spans that fall outside `text`, are empty, or go backwards are dropped;
    /// bounds are snapped onto char boundaries.
    pub fn new(text: &'a str, spans: Vec<Range<usize>>) -> Self {
        let mut clean: Vec<Range<usize>> = Vec::with_capacity(spans.len());
        for span in spans {
            let start = floor_boundary(text, span.start.min(text.len()));
            let end = ceil_boundary(text, span.end.min(text.len()));
            if start >= end {
                continue;
            }
            if clean.last().is_some_and(|prev| start < prev.start) {
                continue;
            }
            clean.push(start..end);
        }
        Self { text, spans: clean }
    }

    pub fn len(&self) -> usize { self.spans.len() }

    pub fn is_empty(&self) -> bool { self.spans.is_empty() }

    pub fn text(&self) -> &'a str { self.text }

    /// Text covered by tokens `range` (end exclusive).
    pub fn slice(&self, range: Range<usize>) -> &'a str {
        let end = range.end.min(self.spans.len());
        if range.start >= end {
            return "";
        }
        &self.text[self.spans[range.start].start..self.spans[end - 1].end]
    }

    /// Text from token `range.start` up to the start of token `range.end`.
    /// The first segment starts at byte 0 and the last runs to the end of the
    /// text, so consecutive segments cover the whole input.
    pub fn segment(&self, range: Range<usize>) -> &'a str {
        let end = range.end.min(self.spans.len());
        if range.start >= end {
            return "";
        }
        let from = if range.start == 0 { 0 } else { self.spans[range.start].start };
        let to = if end == self.spans.len() { self.text.len() } else { self.spans[end].start };
        &self.text[from..to]
    }

    /// The last `n` tokens through the end of the text.
    pub fn tail(&self, n: usize) -> &'a str {
        if n == 0 || self.spans.is_empty() {
            return "";
        }
        let first = self.spans.len().saturating_sub(n);
        &self.text[self.spans[first].start..]
    }
}

fn floor_boundary(text: &str, mut idx: usize) -> usize {
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_boundary(text: &str, mut idx: usize) -> usize {
    while idx < text.len() && !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(text: &str) -> TokenSeq<'_> {
        let mut spans = Vec::new();
        let mut start = None;
        for (i, c) in text.char_indices() {
            match (c.is_whitespace(), start) {
                (true, Some(s)) => { spans.push(s..i); start = None; }
                (false, None) => start = Some(i),
                _ => {}
            }
        }
        if let Some(s) = start { spans.push(s..text.len()); }
        TokenSeq::new(text, spans)
    }

    #[test]
    fn tail_and_slice_follow_spans() {
        let seq = words("alpha beta gamma delta");
        assert_eq!(seq.len(), 4);
        assert_eq!(seq.tail(2), "gamma delta");
        assert_eq!(seq.tail(10), "alpha beta gamma delta");
        assert_eq!(seq.slice(1..3), "beta gamma");
        assert_eq!(seq.slice(3..9), "delta");
        assert_eq!(seq.slice(2..2), "");
    }

    #[test]
    fn segments_cover_the_text() {
        let text = "  one, two; three!";
        let spans = vec![2..5, 7..10, 12..17];
        let seq = TokenSeq::new(text, spans);
        let joined = [seq.segment(0..1), seq.segment(1..2), seq.segment(2..3)].concat();
        assert_eq!(joined, text);
        assert_eq!(seq.segment(1..2), "two; ");
    }

    #[test]
    fn spans_snap_to_char_boundaries() {
        let text = "héllo";
        let seq = TokenSeq::new(text, vec![0..2, 3..6]);
        assert_eq!(seq.slice(0..1), "hé");
        assert_eq!(seq.slice(1..2), "llo");
    }
}
