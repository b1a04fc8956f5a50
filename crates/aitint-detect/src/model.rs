//! Causal language models used by the detectors.
//!
//! The detectors only need two things from a model: a tokenizer and, for a
//! token sequence, the log-probability distribution over the next token at
//! every position. [`LanguageModel`] captures exactly that so detectors can
//! share one read-only handle (`Arc<dyn LanguageModel>`) across threads.
//!
//! [`CandleLanguageModel`] is the production backend: a Qwen2-family causal
//! LM from `candle-transformers`, fetched from the HuggingFace Hub (or read
//! from a local directory) and run locally.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use aitint_core::{AitintError, Result};
use candle_core::{DType, Device, Module, Tensor, D};
use candle_nn::VarBuilder;
use candle_transformers::models::qwen2::{Config as Qwen2Config, Model as Qwen2Model};
use tokenizers::Tokenizer;

use crate::device::select_device;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A causal (left-to-right) language model.
///
/// Implementations must be safe to call from several threads at once. A
/// backend that cannot run concurrent forward passes serializes them
/// internally and reports so through [`max_concurrent_passes`].
///
/// [`max_concurrent_passes`]: LanguageModel::max_concurrent_passes
pub trait LanguageModel: Send + Sync {
    /// Identifier used in logs (e.g. the HuggingFace model ID).
    fn id(&self) -> &str;

    /// Size of the output vocabulary (the width of every log-prob row).
    fn vocab_size(&self) -> usize;

    /// Tokenize `text` without adding special tokens.
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Next-token log-probabilities for `tokens`.
    ///
    /// Returns an `F32` tensor of shape `[tokens.len() - 1, vocab_size]`
    /// where row `i` is `log p(· | tokens[..=i])`, i.e. the distribution
    /// the model assigns to `tokens[i + 1]`. Requires at least two tokens.
    fn next_token_log_probs(&self, tokens: &[u32]) -> Result<Tensor>;

    /// Forward passes this model can make progress on at once.
    ///
    /// Callers that put deadlines on scoring should admit no more work than
    /// this, otherwise time spent queued inside the model counts against
    /// the deadline. Stateless models are unbounded.
    fn max_concurrent_passes(&self) -> usize {
        usize::MAX
    }
}

/// Log-probability of each observed token under `log_probs`.
///
/// `log_probs` is the output of [`LanguageModel::next_token_log_probs`] for
/// `tokens`, so entry `i` is `log p(tokens[i + 1] | tokens[..=i])`.
pub(crate) fn observed_log_likelihoods(log_probs: &Tensor, tokens: &[u32]) -> Result<Vec<f32>> {
    let targets = Tensor::new(&tokens[1..], log_probs.device())
        .and_then(|t| t.unsqueeze(1))
        .map_err(|e| AitintError::Inference(format!("Tensor creation failed: {e}")))?;
    log_probs
        .gather(&targets, 1)
        .and_then(|t| t.squeeze(1))
        .and_then(|t| t.to_vec1::<f32>())
        .map_err(|e| AitintError::Inference(format!("Log-likelihood gather failed: {e}")))
}

// ---------------------------------------------------------------------------
// Candle backend
// ---------------------------------------------------------------------------

/// Where to find a model and how to cache it.
#[derive(Debug, Clone)]
pub struct ModelSource {
    /// HuggingFace model ID, or a path to a directory containing
    /// `config.json`, `tokenizer.json` and safetensors weights.
    pub model_id: String,
    /// Optional cache directory for downloaded model files.
    pub cache_dir: Option<String>,
}

impl ModelSource {
    pub fn new(model_id: impl Into<String>, cache_dir: Option<String>) -> Self {
        Self {
            model_id: model_id.into(),
            cache_dir,
        }
    }
}

/// Files making up a model on local disk.
struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: Vec<PathBuf>,
}

/// Qwen2-family causal LM run through Candle.
///
/// The Qwen2 implementation keeps a KV cache and therefore needs `&mut` for
/// a forward pass, so passes are serialized through a mutex and the cache
/// is cleared after each one. Weights are memory-mapped and never written.
pub struct CandleLanguageModel {
    id: String,
    tokenizer: Tokenizer,
    model: Mutex<Qwen2Model>,
    lm_head: candle_nn::Linear,
    vocab_size: usize,
    device: Device,
}

impl CandleLanguageModel {
    /// Download (or locate) and load a model.
    ///
    /// # Errors
    ///
    /// Returns [`AitintError::Model`] if any file cannot be fetched or
    /// parsed, or the weights do not match the architecture.
    pub async fn load(source: &ModelSource) -> Result<Self> {
        let files = fetch_model_files(source).await?;
        let device = select_device();
        let model = Self::from_files(&source.model_id, &files, device)?;
        tracing::info!(
            model_id = %source.model_id,
            vocab_size = model.vocab_size,
            "Language model loaded successfully"
        );
        Ok(model)
    }

    fn from_files(id: &str, files: &ModelFiles, device: Device) -> Result<Self> {
        let config_str = std::fs::read_to_string(&files.config)
            .map_err(|e| AitintError::Model(format!("Failed to read config.json: {e}")))?;
        let config_json: serde_json::Value = serde_json::from_str(&config_str)
            .map_err(|e| AitintError::Model(format!("Failed to parse config.json: {e}")))?;

        let model_type = config_json
            .get("model_type")
            .and_then(|v| v.as_str())
            .unwrap_or("qwen2");
        if model_type != "qwen2" {
            return Err(AitintError::Model(format!(
                "Unsupported model architecture '{model_type}' (expected qwen2)"
            )));
        }
        let config: Qwen2Config = serde_json::from_value(config_json.clone())
            .map_err(|e| AitintError::Model(format!("Invalid Qwen2 config: {e}")))?;

        let tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| AitintError::Model(format!("Failed to load tokenizer: {e}")))?;

        // SAFETY: memory-mapping safetensors is the standard candle pattern.
        // The files are read-only and remain valid for the lifetime of VarBuilder.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&files.weights, DType::F32, &device)
                .map_err(|e| AitintError::Model(format!("Failed to load weights: {e}")))?
        };

        let model = Qwen2Model::new(&config, vb.clone())
            .map_err(|e| AitintError::Model(format!("Failed to build Qwen2 model: {e}")))?;

        let tied = config_json
            .get("tie_word_embeddings")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let lm_head = if tied || !vb.contains_tensor("lm_head.weight") {
            let weight = vb
                .pp("model.embed_tokens")
                .get((config.vocab_size, config.hidden_size), "weight")
                .map_err(|e| AitintError::Model(format!("Failed to load tied LM head: {e}")))?;
            candle_nn::Linear::new(weight, None)
        } else {
            candle_nn::linear_no_bias(config.hidden_size, config.vocab_size, vb.pp("lm_head"))
                .map_err(|e| AitintError::Model(format!("Failed to load LM head: {e}")))?
        };

        Ok(Self {
            id: id.to_string(),
            tokenizer,
            model: Mutex::new(model),
            lm_head,
            vocab_size: config.vocab_size,
            device,
        })
    }
}

impl LanguageModel for CandleLanguageModel {
    fn id(&self) -> &str {
        &self.id
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| AitintError::Inference(format!("Tokenization failed: {e}")))?;
        Ok(encoding.get_ids().to_vec())
    }

    /// The KV cache mutex admits one pass at a time.
    fn max_concurrent_passes(&self) -> usize {
        1
    }

    fn next_token_log_probs(&self, tokens: &[u32]) -> Result<Tensor> {
        if tokens.len() < 2 {
            return Err(AitintError::Inference(format!(
                "need at least 2 tokens for next-token prediction, got {}",
                tokens.len()
            )));
        }
        let input_ids = Tensor::new(tokens, &self.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(|e| AitintError::Inference(format!("Tensor creation failed: {e}")))?;

        let hidden = {
            let mut model = self.model.lock().unwrap_or_else(|e| e.into_inner());
            let out = model.forward(&input_ids, 0, None);
            model.clear_kv_cache();
            out.map_err(|e| AitintError::Inference(format!("Model inference failed: {e}")))?
        };

        let logits = self
            .lm_head
            .forward(&hidden)
            .and_then(|t| t.squeeze(0))
            .and_then(|t| t.narrow(0, 0, tokens.len() - 1))
            .and_then(|t| t.to_dtype(DType::F32))
            .map_err(|e| AitintError::Inference(format!("LM head failed: {e}")))?;

        candle_nn::ops::log_softmax(&logits, D::Minus1)
            .map_err(|e| AitintError::Inference(format!("Log-softmax failed: {e}")))
    }
}

// ---------------------------------------------------------------------------
// File acquisition
// ---------------------------------------------------------------------------

/// Resolve model files from a local directory or the HuggingFace Hub.
async fn fetch_model_files(source: &ModelSource) -> Result<ModelFiles> {
    let local = Path::new(&source.model_id);
    if local.is_dir() {
        return local_model_files(local);
    }

    use hf_hub::api::tokio::{Api, ApiBuilder};

    let api = match &source.cache_dir {
        Some(dir) => ApiBuilder::new().with_cache_dir(PathBuf::from(dir)).build(),
        None => Api::new(),
    }
    .map_err(|e| AitintError::Model(format!("Failed to create HF API client: {e}")))?;

    let repo = api.model(source.model_id.clone());

    let config = repo
        .get("config.json")
        .await
        .map_err(|e| AitintError::Model(format!("Failed to download config.json: {e}")))?;
    let tokenizer = repo
        .get("tokenizer.json")
        .await
        .map_err(|e| AitintError::Model(format!("Failed to download tokenizer.json: {e}")))?;

    let weights = match repo.get("model.safetensors").await {
        Ok(path) => vec![path],
        Err(single_err) => {
            let index = repo.get("model.safetensors.index.json").await.map_err(|e| {
                AitintError::Model(format!(
                    "Failed to download model.safetensors ({single_err}) or its shard index ({e})"
                ))
            })?;
            let mut paths = Vec::new();
            for shard in shard_names(&index)? {
                let path = repo.get(&shard).await.map_err(|e| {
                    AitintError::Model(format!("Failed to download {shard}: {e}"))
                })?;
                paths.push(path);
            }
            paths
        }
    };

    Ok(ModelFiles {
        config,
        tokenizer,
        weights,
    })
}

fn local_model_files(dir: &Path) -> Result<ModelFiles> {
    let require = |name: &str| -> Result<PathBuf> {
        let path = dir.join(name);
        if path.is_file() {
            Ok(path)
        } else {
            Err(AitintError::Model(format!(
                "Missing {name} in {}",
                dir.display()
            )))
        }
    };

    let config = require("config.json")?;
    let tokenizer = require("tokenizer.json")?;
    let single = dir.join("model.safetensors");
    let weights = if single.is_file() {
        vec![single]
    } else {
        let index = require("model.safetensors.index.json")?;
        shard_names(&index)?
            .into_iter()
            .map(|name| dir.join(name))
            .collect()
    };

    Ok(ModelFiles {
        config,
        tokenizer,
        weights,
    })
}

/// Unique shard file names referenced by a safetensors index, in first-seen order.
fn shard_names(index_path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(index_path)
        .map_err(|e| AitintError::Model(format!("Failed to read shard index: {e}")))?;
    let json: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|e| AitintError::Model(format!("Failed to parse shard index: {e}")))?;
    parse_shard_names(&json)
}

fn parse_shard_names(json: &serde_json::Value) -> Result<Vec<String>> {
    let map = json
        .get("weight_map")
        .and_then(|v| v.as_object())
        .ok_or_else(|| AitintError::Model("Shard index has no weight_map".to_string()))?;
    let mut names: Vec<String> = Vec::new();
    for file in map.values().filter_map(|v| v.as_str()) {
        if !names.iter().any(|n| n == file) {
            names.push(file.to_string());
        }
    }
    if names.is_empty() {
        return Err(AitintError::Model("Shard index lists no files".to_string()));
    }
    Ok(names)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
