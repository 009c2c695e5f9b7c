use std::ops::Range;
use std::path::Path;

use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

use ragdb_core::error::{Error, Result as CoreResult};
use ragdb_core::traits::TokenCounter;

/// Id used to pad XLM-RoBERTa inputs.
const PAD_ID: u32 = 1;

/// Encode `text` into fixed-length `(input_ids, attention_mask)` tensors of
/// shape `[1, max_len]`, truncating or padding as needed.
pub fn tokenize_on_device(tokenizer: &Tokenizer, text: &str, max_len: usize, device: &Device) -> Result<(Tensor, Tensor)> {
    let enc = tokenizer.encode(text, true).map_err(|e| anyhow!("Tokenization failed: {}", e))?;
    let mut ids = enc.get_ids().to_vec();
    let mut mask = enc.get_attention_mask().to_vec();
    ids.resize(max_len, PAD_ID);
    mask.resize(max_len, 0);
    let input_ids = Tensor::from_iter(ids, device)?.reshape((1, max_len))?;
    let attention_mask = Tensor::from_iter(mask, device)?.reshape((1, max_len))?;
    Ok((input_ids, attention_mask))
}

/// Token counter backed by a Hugging Face `tokenizer.json`, so chunk budgets
/// match the vocabulary of the embedding model.
pub struct HfTokenizer {
    inner: Tokenizer,
    name: String,
}

impl HfTokenizer {
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let inner = Tokenizer::from_file(path)
            .map_err(|e| Error::InvalidConfig(format!("failed to load tokenizer {}: {e}", path.display())))?;
        let name = path
            .parent()
            .and_then(|p| p.file_name())
            .map_or_else(|| "hf".to_string(), |n| n.to_string_lossy().into_owned());
        Ok(Self { inner, name })
    }
}

impl TokenCounter for HfTokenizer {
    fn name(&self) -> &str { &self.name }

    fn spans(&self, text: &str) -> CoreResult<Vec<Range<usize>>> {
        let enc = self.inner.encode(text, false).map_err(|e| Error::Tokenize(e.to_string()))?;
        Ok(enc.get_offsets().iter().map(|&(start, end)| start..end).collect())
    }
}
