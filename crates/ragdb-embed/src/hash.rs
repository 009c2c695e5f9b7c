use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use twox_hash::XxHash64;

use ragdb_core::error::{Error, Result};
use ragdb_core::traits::Embedder;
use ragdb_core::types::Embedding;

/// Deterministic feature-hashing embedder. Needs no model, so it serves as the
/// development backend and as the placeholder behind [`crate::FallbackEmbedder`].
/// Its output is never mistaken for model output: every vector is tagged as a
/// placeholder and the embedder always reports itself degraded.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
    name: String,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(Error::InvalidConfig("hash embedder dimension must be positive".into()));
        }
        Ok(Self { dim, name: format!("hash-{dim}") })
    }

    /// L2-normalized bag of lowercased words, hashed into `dim` buckets.
    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model(&self) -> &str { &self.name }

    fn dim(&self) -> usize { self.dim }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        Ok(Embedding::placeholder(self.vector(text)))
    }

    async fn probe(&self) -> bool { true }

    fn degraded(&self) -> bool { true }
}
