//! Append-only JSONL journals: one line per indexed document and one per
//! served query, plus the read side used for stats and metadata lookups.
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use ragdb_core::error::Result;
use ragdb_core::events::utc_now;
use ragdb_core::types::SearchResponse;

/// One indexed document, as appended to the index metadata journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub document_id: String,
    pub index_path: String,
    pub chunk_count: usize,
    pub embedding_model: String,
    pub vector_db: String,
    pub vector_dimension: usize,
    pub indexed_at: String,
}

impl IndexRecord {
    pub fn now(
        document_id: &str,
        index_path: &str,
        chunk_count: usize,
        embedding_model: &str,
        vector_db: &str,
        vector_dimension: usize,
    ) -> Self {
        Self {
            document_id: document_id.to_string(),
            index_path: index_path.to_string(),
            chunk_count,
            embedding_model: embedding_model.to_string(),
            vector_db: vector_db.to_string(),
            vector_dimension,
            indexed_at: utc_now(),
        }
    }
}

pub async fn append_index_record(path: &Path, record: &IndexRecord) -> Result<()> {
    append_line(path, &serde_json::to_string(record)?).await
}

/// Latest journal record per document. Unreadable lines are skipped.
pub async fn latest_index_records(path: &Path) -> Result<BTreeMap<String, IndexRecord>> {
    let mut latest = BTreeMap::new();
    for line in read_lines(path).await? {
        match serde_json::from_str::<IndexRecord>(&line) {
            Ok(rec) => {
                latest.insert(rec.document_id.clone(), rec);
            }
            Err(e) => debug!(path = %path.display(), error = %e, "Skipping malformed index journal line"),
        }
    }
    Ok(latest)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHit {
    pub document_id: String,
    pub page: u32,
    pub title: Option<String>,
    pub url: Option<String>,
    pub score: Option<f32>,
}

/// Compact telemetry line for one served search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRecord {
    pub query_id: String,
    pub query_text: String,
    pub mode: String,
    pub top_k: usize,
    pub retrieval_time_ms: u64,
    pub results: Vec<QueryHit>,
}

impl From<&SearchResponse> for QueryRecord {
    fn from(resp: &SearchResponse) -> Self {
        Self {
            query_id: resp.query_id.clone(),
            query_text: resp.query.clone(),
            mode: resp.mode.as_str().to_string(),
            top_k: resp.top_k,
            retrieval_time_ms: resp.duration_ms,
            results: resp
                .results
                .iter()
                .map(|r| QueryHit {
                    document_id: r.document_id.clone(),
                    page: r.page,
                    title: r.title.clone(),
                    url: r.url.clone(),
                    score: r.scores.combined.or(r.scores.semantic),
                })
                .collect(),
        }
    }
}

pub async fn append_query_record(path: &Path, record: &QueryRecord) -> Result<()> {
    append_line(path, &serde_json::to_string(record)?).await
}

#[derive(Debug, Deserialize)]
struct TextMetadataLine {
    document_id: Option<String>,
    title: Option<String>,
    url: Option<String>,
}

/// Title and url recorded by the extraction step for `document_id`, taken
/// from the first matching line of `text_metadata.jsonl`.
pub async fn lookup_title_url(path: &Path, document_id: &str) -> (Option<String>, Option<String>) {
    let lines = match read_lines(path).await {
        Ok(lines) => lines,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read extraction metadata");
            return (None, None);
        }
    };
    lines
        .iter()
        .filter_map(|line| serde_json::from_str::<TextMetadataLine>(line).ok())
        .find(|rec| rec.document_id.as_deref() == Some(document_id))
        .map_or((None, None), |rec| (rec.title, rec.url))
}

/// Append `line` plus a newline, creating parent directories as needed.
async fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let mut file = fs::OpenOptions::new().create(true).append(true).open(path).await?;
    file.write_all(format!("{line}\n").as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

/// Non-blank lines of `path`; a missing file reads as empty.
async fn read_lines(path: &Path) -> Result<Vec<String>> {
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    Ok(raw.lines().filter(|l| !l.trim().is_empty()).map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn index_journal_keeps_latest_record_per_document() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("nested/index_metadata.jsonl");
        append_index_record(&path, &IndexRecord::now("a", "/idx", 3, "hash-8", "memory", 8)).await.expect("append");
        append_index_record(&path, &IndexRecord::now("b", "/idx", 1, "hash-8", "memory", 8)).await.expect("append");
        append_index_record(&path, &IndexRecord::now("a", "/idx", 5, "hash-8", "memory", 8)).await.expect("append");

        let latest = latest_index_records(&path).await.expect("read");
        assert_eq!(latest.len(), 2);
        assert_eq!(latest["a"].chunk_count, 5);
        assert!(latest["a"].indexed_at.ends_with('Z'));

        let raw = fs::read_to_string(&path).expect("read raw");
        let first: serde_json::Value = serde_json::from_str(raw.lines().next().expect("line")).expect("json");
        for key in ["document_id", "index_path", "chunk_count", "embedding_model", "vector_db", "vector_dimension", "indexed_at"] {
            assert!(first.get(key).is_some(), "missing {key}");
        }
    }

    #[tokio::test]
    async fn missing_journal_reads_empty() {
        let tmp = tempfile::tempdir().expect("tempdir");
        assert!(latest_index_records(&tmp.path().join("none.jsonl")).await.expect("read").is_empty());
    }

    #[tokio::test]
    async fn title_lookup_takes_first_match_and_skips_junk() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("text_metadata.jsonl");
        fs::write(
            &path,
            "not json\n\
             {\"document_id\":\"other\",\"title\":\"Nope\"}\n\
             {\"document_id\":\"doc\",\"title\":\"Handbook\",\"url\":\"https://example.org/h.pdf\",\"page_count\":3}\n\
             {\"document_id\":\"doc\",\"title\":\"Later\"}\n",
        )
        .expect("write");
        let (title, url) = lookup_title_url(&path, "doc").await;
        assert_eq!(title.as_deref(), Some("Handbook"));
        assert_eq!(url.as_deref(), Some("https://example.org/h.pdf"));
        assert_eq!(lookup_title_url(&path, "absent").await, (None, None));
    }
}
