//! Page marker parsing for extracted text (`--- page N ---` lines).

use tracing::warn;

use crate::types::Page;

const MARKER_OPEN: &str = "--- page ";
const MARKER_CLOSE: &str = " ---";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageSplit {
    pub pages: Vec<Page>,
    /// Markers whose label was not an integer and got a derived number.
    pub malformed_markers: usize,
}

/// Label of a marker line, if `line` is one.
fn marker_label(line: &str) -> Option<&str> {
    let line = line.trim();
    let rest = line.strip_prefix(MARKER_OPEN)?;
    let label = rest.strip_suffix(MARKER_CLOSE)?;
    Some(label.trim())
}

fn close_page(number: u32, buf: &mut String, pages: &mut Vec<Page>) {
    if !buf.trim().is_empty() {
        pages.push(Page { number, text: buf.trim().to_string() });
    }
    buf.clear();
}

/// Split marker-delimited text into pages.
///
/// Text before the first marker is page 1 when it is not blank, and text with
/// no markers at all is a single page 1. Blank pages are dropped.
pub fn split_pages(text: &str) -> PageSplit {
    let mut split = PageSplit::default();
    let mut current: Option<u32> = None;
    let mut last_number: u32 = 0;
    let mut buf = String::new();

    for line in text.split_inclusive('\n') {
        let Some(label) = marker_label(line) else {
            buf.push_str(line);
            continue;
        };

        let had_preamble = current.is_none() && !buf.trim().is_empty();
        close_page(current.unwrap_or(1), &mut buf, &mut split.pages);
        if had_preamble {
            last_number = last_number.max(1);
        }

        let number = match label.parse::<u32>() {
            Ok(n) => n,
            Err(_) => {
                let derived = last_number + 1;
                split.malformed_markers += 1;
                warn!(label, page = derived, "Malformed page marker, numbering from previous page");
                derived
            }
        };
        last_number = number;
        current = Some(number);
    }
    close_page(current.unwrap_or(1), &mut buf, &mut split.pages);
    split
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmarked_text_is_page_one() {
        let split = split_pages("just some text\n\nand more");
        assert_eq!(split.pages.len(), 1);
        assert_eq!(split.pages[0].number, 1);
        assert_eq!(split.malformed_markers, 0);
    }

    #[test]
    fn markers_number_pages() {
        let split = split_pages("--- page 1 ---\nfirst\n--- page 2 ---\nsecond\n");
        let numbers: Vec<u32> = split.pages.iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(split.pages[1].text, "second");
    }

    #[test]
    fn preamble_before_first_marker_is_page_one() {
        let split = split_pages("cover text\n--- page 2 ---\nbody\n");
        assert_eq!(split.pages[0], Page { number: 1, text: "cover text".into() });
        assert_eq!(split.pages[1].number, 2);
    }

    #[test]
    fn malformed_label_follows_previous_page() {
        let split = split_pages("--- page 3 ---\na\n--- page iv ---\nb\n--- page ? ---\nc\n");
        let numbers: Vec<u32> = split.pages.iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![3, 4, 5]);
        assert_eq!(split.malformed_markers, 2);

        let first = split_pages("--- page x ---\nonly\n");
        assert_eq!(first.pages[0].number, 1);
        assert_eq!(first.malformed_markers, 1);
    }

    #[test]
    fn blank_pages_are_dropped() {
        let split = split_pages("--- page 1 ---\n\n--- page 2 ---\ncontent\n");
        assert_eq!(split.pages.len(), 1);
        assert_eq!(split.pages[0].number, 2);
    }
}
