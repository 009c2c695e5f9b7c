//! Event payloads exchanged with the surrounding pipeline and the sinks that
//! publish them. Transport is out of scope; a sink only sees envelopes.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{Component, Error, Result};

pub const EVENT_VERSION: &str = "1.0";

/// A payload with a fixed `eventType` name.
pub trait Event: Serialize + DeserializeOwned {
    const EVENT_TYPE: &'static str;
}

/// Wire envelope shared by every event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope<P> {
    pub event_type: String,
    pub event_id: String,
    pub timestamp: String,
    pub correlation_id: Option<String>,
    pub source: String,
    pub version: String,
    pub payload: P,
}

impl<P: Event> EventEnvelope<P> {
    pub fn new(payload: P, source: &str, correlation_id: Option<String>) -> Self {
        Self {
            event_type: P::EVENT_TYPE.to_string(),
            event_id: Uuid::new_v4().to_string(),
            timestamp: utc_now(),
            correlation_id,
            source: source.to_string(),
            version: EVENT_VERSION.to_string(),
            payload,
        }
    }

    /// Erase the payload type for publishing.
    pub fn into_value(self) -> Result<EventEnvelope<serde_json::Value>> {
        Ok(EventEnvelope {
            event_type: self.event_type,
            event_id: self.event_id,
            timestamp: self.timestamp,
            correlation_id: self.correlation_id,
            source: self.source,
            version: self.version,
            payload: serde_json::to_value(self.payload)?,
        })
    }

    /// Parse an envelope, rejecting one that carries a different event type.
    pub fn from_json(raw: &str) -> Result<Self> {
        let envelope: Self = serde_json::from_str(raw)?;
        if envelope.event_type != P::EVENT_TYPE {
            return Err(Error::InvalidInput(format!(
                "expected {} event, got {}",
                P::EVENT_TYPE,
                envelope.event_type
            )));
        }
        Ok(envelope)
    }
}

/// UTC timestamp with a `Z` suffix, second precision.
pub fn utc_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedMetadata {
    pub title: Option<String>,
    pub extracted_by: Option<String>,
    pub extracted_at: Option<String>,
}

/// Inbound: the extraction step wrote a text file for a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentExtracted {
    pub document_id: String,
    pub text_path: String,
    #[serde(default)]
    pub page_count: Option<u32>,
    #[serde(default)]
    pub token_count: Option<u64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub metadata: Option<ExtractedMetadata>,
}

impl DocumentExtracted {
    pub fn title(&self) -> Option<&str> {
        self.title
            .as_deref()
            .or_else(|| self.metadata.as_ref().and_then(|m| m.title.as_deref()))
    }
}

impl Event for DocumentExtracted {
    const EVENT_TYPE: &'static str = "DocumentExtracted";
}

/// Outbound: a document's chunks were written to the vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunksIndexed {
    pub document_id: String,
    pub chunk_count: usize,
    pub embedding_model: String,
    pub vector_db: String,
    pub vector_dimension: usize,
    pub index_path: String,
}

impl Event for ChunksIndexed {
    const EVENT_TYPE: &'static str = "ChunksIndexed";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedHit {
    pub doc_id: String,
    pub page: u32,
    pub title: Option<String>,
    pub url: Option<String>,
    pub score: Option<f32>,
}

/// Outbound: a search finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalCompleted {
    pub query_id: String,
    pub query: String,
    pub results_count: usize,
    pub top_score: Option<f32>,
    pub latency_ms: u64,
    pub results: Vec<RetrievedHit>,
}

impl Event for RetrievalCompleted {
    const EVENT_TYPE: &'static str = "RetrievalCompleted";
}

/// Destination for outbound events.
pub trait EventSink: Send + Sync {
    fn publish(&self, envelope: EventEnvelope<serde_json::Value>) -> Result<()>;
}

/// Typed convenience over [`EventSink::publish`].
pub fn publish<P: Event>(sink: &dyn EventSink, envelope: EventEnvelope<P>) -> Result<()> {
    sink.publish(envelope.into_value()?)
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _envelope: EventEnvelope<serde_json::Value>) -> Result<()> { Ok(()) }
}

/// Emits events as structured log records.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, envelope: EventEnvelope<serde_json::Value>) -> Result<()> {
        info!(
            event_type = %envelope.event_type,
            event_id = %envelope.event_id,
            correlation_id = envelope.correlation_id.as_deref().unwrap_or(""),
            payload = %envelope.payload,
            "Event published"
        );
        Ok(())
    }
}

/// Appends one JSON envelope per line to a file.
#[derive(Debug)]
pub struct JsonlSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path { &self.path }
}

impl EventSink for JsonlSink {
    fn publish(&self, envelope: EventEnvelope<serde_json::Value>) -> Result<()> {
        let line = serde_json::to_string(&envelope)?;
        let _guard = self
            .lock
            .lock()
            .map_err(|_| Error::unavailable(Component::EventSink, "event log lock poisoned"))?;
        append_line(&self.path, &line)
    }
}

/// Append `line` plus a newline, creating parent directories as needed.
fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_uses_camel_case_wire_names() {
        let payload = ChunksIndexed {
            document_id: "doc".into(),
            chunk_count: 3,
            embedding_model: "hash-64".into(),
            vector_db: "memory".into(),
            vector_dimension: 64,
            index_path: "/tmp/idx".into(),
        };
        let env = EventEnvelope::new(payload, "indexing", Some("corr-1".into()));
        let json = serde_json::to_value(env.into_value().expect("value")).expect("json");
        assert_eq!(json["eventType"], "ChunksIndexed");
        assert_eq!(json["correlationId"], "corr-1");
        assert_eq!(json["version"], "1.0");
        assert_eq!(json["payload"]["chunkCount"], 3);
        assert!(json["timestamp"].as_str().expect("ts").ends_with('Z'));
    }

    #[test]
    fn extracted_event_parses_and_checks_type() {
        let raw = r#"{"eventType":"DocumentExtracted","eventId":"e1","timestamp":"2025-01-01T00:00:00Z",
            "correlationId":null,"source":"extraction","version":"1.0",
            "payload":{"documentId":"doc","textPath":"/data/doc.txt","pageCount":2,
            "metadata":{"title":"Handbook","extractedBy":"pdfminer","extractedAt":"2025-01-01"}}}"#;
        let env = EventEnvelope::<DocumentExtracted>::from_json(raw).expect("parse");
        assert_eq!(env.payload.title(), Some("Handbook"));
        assert_eq!(env.payload.page_count, Some(2));

        let wrong = raw.replace("\"DocumentExtracted\"", "\"ChunksIndexed\"");
        assert!(EventEnvelope::<DocumentExtracted>::from_json(&wrong).is_err());
    }

    #[test]
    fn jsonl_sink_appends_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sink = JsonlSink::new(dir.path().join("events/out.jsonl"));
        for i in 0..2 {
            let payload = RetrievalCompleted {
                query_id: format!("q{i}"),
                query: "appeal".into(),
                results_count: 0,
                top_score: None,
                latency_ms: 1,
                results: vec![],
            };
            publish(&sink, EventEnvelope::new(payload, "retrieval", None)).expect("publish");
        }
        let body = fs::read_to_string(sink.path()).expect("read");
        assert_eq!(body.lines().count(), 2);
        assert!(body.contains("\"queryId\":\"q1\""));
    }
}
