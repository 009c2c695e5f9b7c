use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use ragdb_core::config::FallbackPosture;
use ragdb_core::error::{Component, Error, Result};
use ragdb_core::traits::Embedder;
use ragdb_core::types::Embedding;

use crate::hash::HashEmbedder;

/// Wraps a primary embedder and decides what happens when it fails.
///
/// With [`FallbackPosture::Placeholder`] a failed call yields a hash vector
/// tagged as a placeholder and the embedder reports itself degraded from then
/// on. With [`FallbackPosture::FailClosed`] the failure surfaces as a
/// retryable `Unavailable` error.
pub struct FallbackEmbedder {
    primary: Arc<dyn Embedder>,
    placeholder: HashEmbedder,
    posture: FallbackPosture,
    degraded: AtomicBool,
    fallbacks: AtomicU64,
}

impl FallbackEmbedder {
    pub fn new(primary: Arc<dyn Embedder>, posture: FallbackPosture) -> Result<Self> {
        let placeholder = HashEmbedder::new(primary.dim())?;
        Ok(Self { primary, placeholder, posture, degraded: AtomicBool::new(false), fallbacks: AtomicU64::new(0) })
    }

    pub fn posture(&self) -> FallbackPosture { self.posture }

    /// Number of placeholder vectors handed out so far.
    pub fn fallback_count(&self) -> u64 { self.fallbacks.load(Ordering::Relaxed) }

    fn recover(&self, err: Error, count: usize) -> Result<()> {
        match self.posture {
            FallbackPosture::FailClosed => {
                warn!(model = self.primary.model(), error = %err, "Embedding model unavailable, failing closed");
                Err(match err {
                    e @ (Error::Unavailable { .. } | Error::Timeout { .. }) => e,
                    other => Error::unavailable(Component::Embedder, other),
                })
            }
            FallbackPosture::Placeholder => {
                self.degraded.store(true, Ordering::Relaxed);
                let total = self.fallbacks.fetch_add(count as u64, Ordering::Relaxed) + count as u64;
                warn!(model = self.primary.model(), error = %err, fallbacks = total, "Embedding model unavailable, serving placeholder vectors");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Embedder for FallbackEmbedder {
    fn model(&self) -> &str { self.primary.model() }

    fn dim(&self) -> usize { self.primary.dim() }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        match self.primary.embed(text).await {
            Ok(e) => Ok(e),
            Err(err) => {
                self.recover(err, 1)?;
                Ok(Embedding::placeholder(self.placeholder.vector(text)))
            }
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        match self.primary.embed_batch(texts).await {
            Ok(e) => Ok(e),
            Err(err) => {
                self.recover(err, texts.len())?;
                Ok(texts.iter().map(|t| Embedding::placeholder(self.placeholder.vector(t))).collect())
            }
        }
    }

    async fn probe(&self) -> bool { self.primary.probe().await }

    fn degraded(&self) -> bool { self.degraded.load(Ordering::Relaxed) }
}
