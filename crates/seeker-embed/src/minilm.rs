use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig, DTYPE};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use seeker_core::config::ModelSettings;
use seeker_core::traits::Embedder;

use crate::device::select_device;
use crate::discovery::{resolve_model_dir, weights_path};
use crate::pool::masked_mean_l2;
use crate::tokenize::{configure_tokenizer, tokenize_batch_on_device};

/// Sentence-transformer with a BERT backbone (all-MiniLM-L6-v2 by default):
/// token embeddings → attention-masked mean pooling → L2 normalization.
pub struct MiniLmEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    model_id: String,
    dim: usize,
    max_len: usize,
}

impl MiniLmEmbedder {
    pub fn load(settings: &ModelSettings) -> Result<Self> {
        let model_dir = resolve_model_dir(settings)?;
        Self::from_dir(&model_dir, &settings.id, settings.max_seq_len, select_device())
    }

    pub fn from_dir(model_dir: &Path, model_id: &str, max_len: usize, device: Device) -> Result<Self> {
        let start = Instant::now();
        info!("🔄 Loading {} from {}", model_id, model_dir.display());

        let tokenizer_path = model_dir.join("tokenizer.json");
        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        configure_tokenizer(&mut tokenizer, max_len)?;

        let config_path = model_dir.join("config.json");
        let config_text = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let config: BertConfig = serde_json::from_str(&config_text)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;
        let dim = serde_json::from_str::<serde_json::Value>(&config_text)?
            .get("hidden_size")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| anyhow!("{} has no hidden_size", config_path.display()))? as usize;

        let weights_path = weights_path(model_dir)?;
        debug!("📥 Loading weights from {}", weights_path.display());
        let weights: HashMap<String, Tensor> = if weights_path.extension().is_some_and(|e| e == "safetensors") {
            candle_core::safetensors::load(&weights_path, &device)?
        } else {
            candle_core::pickle::read_all(&weights_path)?.into_iter().collect()
        };
        let vb = VarBuilder::from_tensors(weights, DTYPE, &device);
        let model = BertModel::load(vb, &config)
            .with_context(|| format!("Failed to build BERT model from {}", model_dir.display()))?;

        info!("✅ {} loaded in {:.2?} (dim={}, max_len={})", model_id, start.elapsed(), dim, max_len);
        Ok(Self { model, tokenizer, device, model_id: model_id.to_string(), dim, max_len })
    }
}

impl Embedder for MiniLmEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }
    fn model_id(&self) -> &str { &self.model_id }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() { return Ok(vec![]); }
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_batch_on_device(&self.tokenizer, texts, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let vectors: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_vec2()?;
        if let Some(v) = vectors.iter().find(|v| v.len() != self.dim) {
            return Err(anyhow!("Model produced {}-dim vector, expected {}", v.len(), self.dim));
        }
        let elapsed = start.elapsed();
        if elapsed.as_millis() > 100 * texts.len() as u128 { warn!("⚠️  Slow embedding: {} texts in {:.2?}", texts.len(), elapsed); }
        debug!("embedded {} texts in {:.2?}", texts.len(), elapsed);
        Ok(vectors)
    }
}
