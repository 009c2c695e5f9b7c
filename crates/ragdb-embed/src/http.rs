use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use ragdb_core::error::{Component, Error, Result};
use ragdb_core::traits::Embedder;
use ragdb_core::types::Embedding;

/// Client for an OpenAI compatible `/embeddings` endpoint.
pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    dim: usize,
    api_key: Option<String>,
    timeout_ms: u64,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

impl HttpEmbedder {
    pub fn new(base_url: &str, model: &str, dim: usize, api_key: Option<String>, timeout_ms: u64) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
            model: model.to_string(),
            dim,
            api_key: api_key.filter(|k| !k.is_empty()),
            timeout_ms,
        })
    }

    /// Resolve the embeddings endpoint from the base URL.
    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/embeddings") {
            base.to_string()
        } else if base.ends_with("/v1") {
            format!("{base}/embeddings")
        } else {
            format!("{base}/v1/embeddings")
        }
    }

    fn transport_error(&self, e: &reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout { component: Component::Embedder, after_ms: self.timeout_ms }
        } else {
            Error::unavailable(Component::Embedder, e)
        }
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = EmbeddingRequest { model: &self.model, input: texts };
        let mut req = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.map_err(|e| self.transport_error(&e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::unavailable(Component::Embedder, format!("embeddings endpoint returned {status}")));
        }
        let mut parsed: EmbeddingResponse = resp.json().await.map_err(|e| self.transport_error(&e))?;
        parsed.data.sort_by_key(|d| d.index);

        if parsed.data.len() != texts.len() {
            return Err(Error::unavailable(
                Component::Embedder,
                format!("expected {} embeddings, got {}", texts.len(), parsed.data.len()),
            ));
        }
        let vectors: Vec<Vec<f32>> = parsed.data.into_iter().map(|d| d.embedding).collect();
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dim) {
            return Err(Error::unavailable(
                Component::Embedder,
                format!("embedding has {} dims, configured {}", bad.len(), self.dim),
            ));
        }
        debug!(count = vectors.len(), model = %self.model, "Embeddings received");
        Ok(vectors)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model(&self) -> &str { &self.model }

    fn dim(&self) -> usize { self.dim }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        let mut vectors = self.request(&[text.to_string()]).await?;
        let vector = vectors.pop().ok_or_else(|| Error::unavailable(Component::Embedder, "empty response"))?;
        Ok(Embedding::model(vector))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.request(texts).await?.into_iter().map(Embedding::model).collect())
    }
}
