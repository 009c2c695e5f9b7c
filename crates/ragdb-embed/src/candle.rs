use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use ragdb_core::error::{Component, Error, Result};
use ragdb_core::traits::Embedder;
use ragdb_core::types::Embedding;

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::tokenize_on_device;

const MAX_LEN: usize = 256;
const SLOW_EMBED_MS: u128 = 100;

struct Model {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
}

impl Model {
    fn embed_sync(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_on_device(&self.tokenizer, text, MAX_LEN, &self.device)?;
        let token_type_ids = Tensor::zeros((1, MAX_LEN), DType::I64, &self.device)?;
        let hidden = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let v: Vec<f32> = pooled.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1()?;
        if v.len() != self.dim {
            return Err(anyhow!("model produced {} dims, expected {}", v.len(), self.dim));
        }
        if start.elapsed().as_millis() > SLOW_EMBED_MS {
            debug!(elapsed_ms = start.elapsed().as_millis() as u64, "Slow embedding");
        }
        Ok(v)
    }
}

/// Local XLM-RoBERTa family encoder (BGE-M3 by default) run through candle,
/// with masked mean pooling and L2 normalization.
#[derive(Clone)]
pub struct CandleEmbedder {
    inner: Arc<Model>,
    name: String,
}

impl CandleEmbedder {
    /// Load `config.json`, `tokenizer.json` and weights (`model.safetensors`
    /// or `pytorch_model.bin`) from `model_dir`.
    pub fn load(model_dir: &Path, name: &str) -> anyhow::Result<Self> {
        let device = select_device();
        info!(model_dir = %model_dir.display(), "Loading embedding model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;

        let config_path = model_dir.join("config.json");
        let raw = std::fs::read_to_string(&config_path).with_context(|| format!("reading {}", config_path.display()))?;
        let config: XLMRobertaConfig = serde_json::from_str(&raw).context("parsing model config")?;

        let vb = load_weights(model_dir, &device)?;
        let model = XLMRobertaModel::new(&config, vb)?;
        let dim = config.hidden_size;
        info!(model = name, dim, "Embedding model loaded");
        Ok(Self { inner: Arc::new(Model { model, tokenizer, device, dim }), name: name.to_string() })
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> anyhow::Result<VarBuilder<'static>> {
    let safetensors: PathBuf = model_dir.join("model.safetensors");
    if safetensors.exists() {
        // SAFETY: the weights file is not modified while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[safetensors], DType::F32, device)? };
        return Ok(vb);
    }
    let pickle = model_dir.join("pytorch_model.bin");
    if !pickle.exists() {
        return Err(anyhow!("no model.safetensors or pytorch_model.bin in {}", model_dir.display()));
    }
    warn!(path = %pickle.display(), "Loading pickled weights; convert to safetensors for faster startup");
    let weights: HashMap<String, Tensor> = candle_core::pickle::read_all(&pickle)?.into_iter().collect();
    Ok(VarBuilder::from_tensors(weights, DType::F32, device))
}

#[async_trait]
impl Embedder for CandleEmbedder {
    fn model(&self) -> &str { &self.name }

    fn dim(&self) -> usize { self.inner.dim }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        let inner = Arc::clone(&self.inner);
        let text = text.to_string();
        let vector = tokio::task::spawn_blocking(move || inner.embed_sync(&text))
            .await
            .map_err(|e| Error::unavailable(Component::Embedder, e))?
            .map_err(|e| Error::unavailable(Component::Embedder, format!("{e:#}")))?;
        Ok(Embedding::model(vector))
    }

    async fn probe(&self) -> bool { true }
}
