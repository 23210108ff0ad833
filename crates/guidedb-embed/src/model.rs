use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use candle_core::{Device, Tensor, DType};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{XLMRobertaModel, Config as XLMRobertaConfig};
use tokenizers::Tokenizer;
use tracing::{info, warn};

use guidedb_core::traits::EmbeddingProvider;
use guidedb_core::Error;

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::tokenize_on_device;
use crate::check_dim;

const MAX_LEN: usize = 256;

struct Inner { model: XLMRobertaModel, tokenizer: Tokenizer, device: Device }

/// BGE-M3 (XLM-RoBERTa) sentence embedder running on candle.
///
/// Inference is CPU/GPU bound, so async callers are moved onto the blocking pool.
pub struct BgeM3Embedder { inner: Arc<Inner>, dim: usize, id: String }

impl BgeM3Embedder {
    pub fn load(model_dir: Option<&Path>, dim: usize) -> Result<Self> {
        let device = select_device();
        let model_dir = resolve_model_dir(model_dir)?;
        info!(dir = %model_dir.display(), "loading BGE-M3 model");
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let config_path = model_dir.join("config.json");
        let raw_config = std::fs::read_to_string(&config_path)?;
        let config: XLMRobertaConfig = serde_json::from_str(&raw_config)?;
        let raw: serde_json::Value = serde_json::from_str(&raw_config)?;
        if let Some(hidden_size) = raw.get("hidden_size").and_then(|v| v.as_u64()) {
            if hidden_size as usize != dim {
                return Err(Error::DimensionMismatch { expected: dim, actual: hidden_size as usize }.into());
            }
        }
        let weights_path = model_dir.join("pytorch_model.bin");
        let weights = candle_core::pickle::read_all(&weights_path)?;
        let weights_map: std::collections::HashMap<String, Tensor> = weights.into_iter().collect();
        let vb = VarBuilder::from_tensors(weights_map, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb)?;
        info!(dim, "BGE-M3 model loaded");
        Ok(Self { inner: Arc::new(Inner { model, tokenizer, device }), dim, id: format!("bge-m3:d{dim}") })
    }
}

impl Inner {
    fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_on_device(&self.tokenizer, text, MAX_LEN, &self.device)?;
        let token_type_ids = Tensor::zeros((1, MAX_LEN), DType::I64, &self.device)?;
        let hidden_states = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden_states, &attention_mask)?;
        let emb = pooled.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1()?;
        let elapsed_ms = start.elapsed().as_millis();
        if elapsed_ms > 100 { warn!(elapsed_ms, "slow embedding"); }
        Ok(emb)
    }
}

#[async_trait]
impl EmbeddingProvider for BgeM3Embedder {
    fn model_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }

    async fn embed(&self, text: &str) -> guidedb_core::Result<Vec<f32>> {
        let inner = Arc::clone(&self.inner);
        let text = text.to_string();
        let v = tokio::task::spawn_blocking(move || inner.embed_text(&text))
            .await
            .map_err(|e| Error::Embed(format!("embedding task failed: {e}")))?
            .map_err(|e| Error::Embed(e.to_string()))?;
        check_dim(self.dim, &v)?;
        Ok(v)
    }
}

fn resolve_model_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = explicit { if p.exists() { return Ok(p.to_path_buf()); } }
    if let Ok(dir) = std::env::var("APP_MODEL_DIR") { let p = PathBuf::from(&dir); if p.exists() { return Ok(p); } }
    if let Ok(dir) = std::env::var("MODEL_DIR") { let p = PathBuf::from(&dir); if p.exists() { return Ok(p); } }
    let root = Path::new("../models/bge-m3"); if root.exists() { return Ok(root.to_path_buf()); }
    let local = Path::new("models/bge-m3"); if local.exists() { return Ok(local.to_path_buf()); }
    Err(anyhow!("Could not locate BGE-M3 model directory"))
}
