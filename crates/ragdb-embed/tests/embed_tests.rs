use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ragdb_core::config::{EmbeddingBackend, EmbeddingConfig, FallbackPosture};
use ragdb_core::error::{Component, Error, Result};
use ragdb_core::traits::Embedder;
use ragdb_core::types::Embedding;
use ragdb_embed::{build_embedder, FallbackEmbedder, HashEmbedder};

/// Primary embedder that can be switched off mid-test.
struct Flaky {
    up: AtomicBool,
}

#[async_trait]
impl Embedder for Flaky {
    fn model(&self) -> &str { "flaky" }

    fn dim(&self) -> usize { 16 }

    async fn embed(&self, _text: &str) -> Result<Embedding> {
        if self.up.load(Ordering::SeqCst) {
            Ok(Embedding::model(vec![0.25; 16]))
        } else {
            Err(Error::unavailable(Component::Embedder, "connection refused"))
        }
    }
}

#[tokio::test]
async fn hash_embedder_is_normalized_and_deterministic() {
    let embedder = HashEmbedder::new(64).expect("embedder");
    let texts = vec!["Appeal deadline".to_string(), "appeal DEADLINE".to_string()];
    let embs = embedder.embed_batch(&texts).await.expect("embed_batch");

    assert_eq!(embs[0].vector.len(), 64);
    let norm: f32 = embs[0].vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");
    for (a, b) in embs[0].vector.iter().zip(&embs[1].vector) {
        assert!((a - b).abs() <= 1e-6);
    }
    assert!(embs.iter().all(|e| e.is_placeholder()));
    assert!(embedder.degraded());
    assert_eq!(embedder.model(), "hash-64");
}

#[tokio::test]
async fn placeholder_posture_flags_vectors_and_degrades() {
    let primary = Arc::new(Flaky { up: AtomicBool::new(true) });
    let embedder = FallbackEmbedder::new(primary.clone(), FallbackPosture::Placeholder).expect("wrap");

    let real = embedder.embed("fees").await.expect("embed");
    assert!(!real.is_placeholder());
    assert!(!embedder.degraded());

    primary.up.store(false, Ordering::SeqCst);
    let fake = embedder.embed("fees").await.expect("placeholder");
    assert!(fake.is_placeholder());
    assert_eq!(fake.vector.len(), 16);
    assert!(embedder.degraded());
    assert_eq!(embedder.fallback_count(), 1);
    assert!(!embedder.probe().await);
}

#[tokio::test]
async fn fail_closed_posture_returns_retryable_error() {
    let primary = Arc::new(Flaky { up: AtomicBool::new(false) });
    let embedder = FallbackEmbedder::new(primary, FallbackPosture::FailClosed).expect("wrap");

    let err = embedder.embed("fees").await.expect_err("must fail");
    assert!(err.is_retryable());
    assert!(!embedder.degraded());
    assert_eq!(embedder.fallback_count(), 0);
}

#[test]
fn default_config_expects_a_real_model() {
    let config = EmbeddingConfig::default();
    assert_eq!(config.backend, EmbeddingBackend::Candle);
    assert_eq!(config.dim, 1024);
}

#[tokio::test]
async fn configured_hash_backend_reports_degraded() {
    let config = EmbeddingConfig { backend: EmbeddingBackend::Hash, dim: 32, ..Default::default() };
    let embedder = build_embedder(&config).expect("build");
    assert_eq!(embedder.dim(), 32);
    assert!(embedder.probe().await);
    assert!(embedder.degraded());
    assert!(embedder.embed("appeal deadline").await.expect("embed").is_placeholder());
}
