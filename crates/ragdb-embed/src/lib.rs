//! Embedding backends behind the `ragdb_core::Embedder` trait: a local candle
//! model, an HTTP endpoint and a deterministic hash embedder, plus the
//! fallback wrapper that decides what a failed call turns into.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::{info, warn};

use ragdb_core::config::{expand_path, EmbeddingBackend, EmbeddingConfig};
use ragdb_core::traits::Embedder;

pub mod candle;
pub mod device;
pub mod fallback;
pub mod hash;
pub mod http;
pub mod pool;
pub mod tokenize;

pub use candle::CandleEmbedder;
pub use fallback::FallbackEmbedder;
pub use hash::HashEmbedder;
pub use http::HttpEmbedder;
pub use pool::masked_mean_l2;
pub use tokenize::HfTokenizer;

/// Build the configured embedder. Model-backed embedders are wrapped in a
/// [`FallbackEmbedder`] carrying the configured posture.
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let primary: Arc<dyn Embedder> = match config.backend {
        EmbeddingBackend::Hash => {
            warn!(dim = config.dim, "Using hash embedder; vectors are placeholders and results report degraded");
            return Ok(Arc::new(HashEmbedder::new(config.dim)?));
        }
        EmbeddingBackend::Http => {
            let endpoint = config.endpoint.as_deref().ok_or_else(|| anyhow!("embedding.endpoint is not set"))?;
            let api_key = config.api_key_env.as_deref().and_then(|var| std::env::var(var).ok());
            info!(endpoint, model = %config.model, "Using HTTP embedder");
            Arc::new(HttpEmbedder::new(endpoint, &config.model, config.dim, api_key, config.timeout_ms)?)
        }
        EmbeddingBackend::Candle => {
            let dir = resolve_model_dir(config.model_dir.as_deref())?;
            let embedder = CandleEmbedder::load(&dir, &config.model)?;
            if embedder.dim() != config.dim {
                return Err(anyhow!("model at {} has {} dims, embedding.dim is {}", dir.display(), embedder.dim(), config.dim));
            }
            Arc::new(embedder)
        }
    };
    Ok(Arc::new(FallbackEmbedder::new(primary, config.posture)?))
}

/// Configured directory first, then `APP_MODEL_DIR` / `MODEL_DIR`, then the
/// conventional `models/bge-m3` locations.
fn resolve_model_dir(configured: Option<&str>) -> Result<PathBuf> {
    let candidates = configured
        .map(expand_path)
        .into_iter()
        .chain(std::env::var("APP_MODEL_DIR").ok().map(PathBuf::from))
        .chain(std::env::var("MODEL_DIR").ok().map(PathBuf::from))
        .chain([Path::new("../models/bge-m3").to_path_buf(), Path::new("models/bge-m3").to_path_buf()]);
    for dir in candidates {
        if dir.exists() {
            info!(model_dir = %dir.display(), "Resolved model directory");
            return Ok(dir);
        }
    }
    Err(anyhow!("Could not locate embedding model directory"))
}
