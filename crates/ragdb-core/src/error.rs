use std::fmt;

use thiserror::Error;

use crate::types::SearchMode;

/// External collaborator a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Embedder,
    VectorStore,
    Tokenizer,
    EventSink,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Embedder => "embedder",
            Self::VectorStore => "vector store",
            Self::Tokenizer => "tokenizer",
            Self::EventSink => "event sink",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{component} unavailable: {reason}")]
    Unavailable { component: Component, reason: String },

    #[error("{component} timed out after {after_ms} ms")]
    Timeout { component: Component, after_ms: u64 },

    #[error("Tokenization failed: {0}")]
    Tokenize(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query {query_id} ({mode}) failed: {source}")]
    Query {
        query_id: String,
        mode: SearchMode,
        #[source]
        source: Box<Error>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Operation failed: {0}")]
    Operation(String),
}

impl Error {
    pub fn unavailable(component: Component, reason: impl fmt::Display) -> Self {
        Self::Unavailable { component, reason: reason.to_string() }
    }

    pub fn storage(reason: impl fmt::Display) -> Self {
        Self::Storage(reason.to_string())
    }

    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable { .. } | Self::Timeout { .. } => true,
            Self::Query { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Attach query context to a failure that escapes the retrieval engine.
    pub fn in_query(self, query_id: &str, mode: SearchMode) -> Self {
        match self {
            Self::Query { .. } => self,
            other => Self::Query { query_id: query_id.to_string(), mode, source: Box::new(other) },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(Error::unavailable(Component::Embedder, "connection refused").is_retryable());
        assert!(Error::Timeout { component: Component::VectorStore, after_ms: 10 }.is_retryable());
        assert!(!Error::InvalidInput("empty query".into()).is_retryable());

        let wrapped = Error::Timeout { component: Component::Embedder, after_ms: 5 }
            .in_query("q-1", SearchMode::Hybrid);
        assert!(wrapped.is_retryable());
        assert!(wrapped.to_string().contains("q-1"));
        assert!(wrapped.to_string().contains("hybrid"));
    }
}
