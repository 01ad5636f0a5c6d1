use std::path::{Path, PathBuf};

use candle_core::quantized::gguf_file;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::llama::{self, Llama, LlamaConfig, LlamaEosToks};
use candle_transformers::models::quantized_llama::ModelWeights;
use hf_hub::api::sync::{Api, ApiBuilder, ApiRepo};
use tokenizers::{PaddingParams, Tokenizer};

use crate::error::LlmError;

const SHARD_INDEX: &str = "model.safetensors.index.json";

#[derive(Debug, Clone)]
pub enum ModelSource {
    /// A `.gguf` file (tokenizer beside it) or a directory holding
    /// `config.json`, `tokenizer.json` and safetensors weights.
    Local { path: PathBuf },
    HuggingFace {
        repo_id: String,
        /// `*.gguf` selects the quantized loader; `None` loads safetensors.
        filename: Option<String>,
        /// Repo to fetch `tokenizer.json` from when the weights repo lacks one.
        tokenizer_repo: Option<String>,
    },
}

/// Weights of a causal decoder, either full precision or quantized.
pub enum ChatModel {
    Llama {
        model: Llama,
        config: llama::Config,
        dtype: DType,
    },
    Quantized(ModelWeights),
}

impl ChatModel {
    /// Fresh KV cache for one generation. Quantized weights keep their own
    /// cache and reset it when a forward pass starts at position 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache tensors cannot be allocated.
    pub fn new_cache(&self, device: &Device) -> Result<Option<llama::Cache>, LlmError> {
        match self {
            Self::Llama { config, dtype, .. } => {
                Ok(Some(llama::Cache::new(true, *dtype, config, device)?))
            }
            Self::Quantized(_) => Ok(None),
        }
    }

    /// Logits for the last position of `input` (`[1, seq]`), shaped `[1, vocab]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the forward pass fails or a llama model is run
    /// without a cache.
    pub fn forward(
        &mut self,
        input: &Tensor,
        pos: usize,
        cache: Option<&mut llama::Cache>,
    ) -> Result<Tensor, LlmError> {
        match self {
            Self::Llama { model, .. } => {
                let cache = cache.ok_or_else(|| {
                    LlmError::Inference("llama forward requires a KV cache".into())
                })?;
                Ok(model.forward(input, pos, cache)?)
            }
            Self::Quantized(weights) => Ok(weights.forward(input, pos)?),
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Llama { .. } => "safetensors",
            Self::Quantized(_) => "gguf",
        }
    }
}

pub struct LoadedModel {
    pub model: ChatModel,
    pub tokenizer: Tokenizer,
    pub eos_token_ids: Vec<u32>,
}

/// Build a sync hub client, authenticated when `token` is set.
///
/// # Errors
///
/// Returns an error if the client cannot be constructed.
pub fn hub_api(token: Option<&str>) -> Result<Api, LlmError> {
    ApiBuilder::new()
        .with_token(token.map(str::to_owned))
        .build()
        .map_err(|e| LlmError::ModelLoad(format!("failed to create HuggingFace API client: {e}")))
}

/// Load a chat model and its tokenizer.
///
/// # Errors
///
/// Returns [`LlmError::ModelLoad`] if any file cannot be fetched or parsed.
pub fn load_chat_model(
    source: &ModelSource,
    hub_token: Option<&str>,
    device: &Device,
) -> Result<LoadedModel, LlmError> {
    match source {
        ModelSource::Local { path } => {
            if is_gguf(path) {
                let tokenizer_path = path
                    .parent()
                    .map(|p| p.join("tokenizer.json"))
                    .ok_or_else(|| LlmError::ModelLoad("invalid model path".into()))?;
                let tokenizer = load_tokenizer(&tokenizer_path)?;
                let weights = load_gguf_weights(path, device)?;
                Ok(finish(ChatModel::Quantized(weights), tokenizer, &[]))
            } else {
                let weights = local_safetensors(path)?;
                load_llama(
                    &path.join("config.json"),
                    &path.join("tokenizer.json"),
                    &weights,
                    device,
                )
            }
        }
        ModelSource::HuggingFace {
            repo_id,
            filename,
            tokenizer_repo,
        } => {
            let api = hub_api(hub_token)?;
            let repo = api.model(repo_id.clone());
            let tokenizer_path = match tokenizer_repo {
                Some(other) => fetch(&api.model(other.clone()), other, "tokenizer.json")?,
                None => fetch(&repo, repo_id, "tokenizer.json")?,
            };

            match filename.as_deref() {
                Some(name) if is_gguf(Path::new(name)) => {
                    let model_path = fetch(&repo, repo_id, name)?;
                    let tokenizer = load_tokenizer(&tokenizer_path)?;
                    let weights = load_gguf_weights(&model_path, device)?;
                    Ok(finish(ChatModel::Quantized(weights), tokenizer, &[]))
                }
                Some(name) => {
                    let config_path = fetch(&repo, repo_id, "config.json")?;
                    let weights = vec![fetch(&repo, repo_id, name)?];
                    load_llama(&config_path, &tokenizer_path, &weights, device)
                }
                None => {
                    let config_path = fetch(&repo, repo_id, "config.json")?;
                    let weights = hub_safetensors(&repo, repo_id)?;
                    load_llama(&config_path, &tokenizer_path, &weights, device)
                }
            }
        }
    }
}

fn is_gguf(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gguf"))
}

fn fetch(repo: &ApiRepo, repo_id: &str, filename: &str) -> Result<PathBuf, LlmError> {
    repo.get(filename).map_err(|e| {
        LlmError::ModelLoad(format!("failed to download {filename} from {repo_id}: {e}"))
    })
}

fn hub_safetensors(repo: &ApiRepo, repo_id: &str) -> Result<Vec<PathBuf>, LlmError> {
    if let Ok(index_path) = repo.get(SHARD_INDEX) {
        let index = std::fs::read_to_string(&index_path)
            .map_err(|e| LlmError::ModelLoad(format!("failed to read {SHARD_INDEX}: {e}")))?;
        return shard_filenames(&index)?
            .iter()
            .map(|name| fetch(repo, repo_id, name))
            .collect();
    }
    Ok(vec![fetch(repo, repo_id, "model.safetensors")?])
}

fn local_safetensors(dir: &Path) -> Result<Vec<PathBuf>, LlmError> {
    let index_path = dir.join(SHARD_INDEX);
    if index_path.is_file() {
        let index = std::fs::read_to_string(&index_path)
            .map_err(|e| LlmError::ModelLoad(format!("failed to read {SHARD_INDEX}: {e}")))?;
        return Ok(shard_filenames(&index)?
            .into_iter()
            .map(|name| dir.join(name))
            .collect());
    }
    let single = dir.join("model.safetensors");
    if single.is_file() {
        return Ok(vec![single]);
    }
    Err(LlmError::ModelLoad(format!(
        "no safetensors weights found in {}",
        dir.display()
    )))
}

/// Distinct shard file names from a `model.safetensors.index.json` body, sorted.
///
/// # Errors
///
/// Returns an error if the index is not JSON or has no `weight_map`.
pub fn shard_filenames(index_json: &str) -> Result<Vec<String>, LlmError> {
    let value: serde_json::Value = serde_json::from_str(index_json)?;
    let map = value
        .get("weight_map")
        .and_then(serde_json::Value::as_object)
        .ok_or_else(|| LlmError::ModelLoad(format!("{SHARD_INDEX} has no weight_map")))?;
    let mut files: Vec<String> = map
        .values()
        .filter_map(serde_json::Value::as_str)
        .map(str::to_owned)
        .collect();
    files.sort();
    files.dedup();
    Ok(files)
}

fn load_llama(
    config_path: &Path,
    tokenizer_path: &Path,
    weights: &[PathBuf],
    device: &Device,
) -> Result<LoadedModel, LlmError> {
    let raw = std::fs::read_to_string(config_path)
        .map_err(|e| LlmError::ModelLoad(format!("failed to read llama config: {e}")))?;
    let llama_config: LlamaConfig = serde_json::from_str(&raw)?;
    let config = llama_config.into_config(false);

    let dtype = if device.is_cpu() {
        DType::F32
    } else {
        DType::BF16
    };
    // SAFETY: weights are read-only safetensors files that are not modified
    // while the VarBuilder is alive
    let vb = unsafe { VarBuilder::from_mmaped_safetensors(weights, dtype, device) }
        .map_err(|e| LlmError::ModelLoad(format!("failed to map safetensors: {e}")))?;
    let model = Llama::load(vb, &config)
        .map_err(|e| LlmError::ModelLoad(format!("failed to build llama model: {e}")))?;

    let configured_eos = match &config.eos_token_id {
        Some(LlamaEosToks::Single(id)) => vec![*id],
        Some(LlamaEosToks::Multiple(ids)) => ids.clone(),
        None => Vec::new(),
    };
    let tokenizer = load_tokenizer(tokenizer_path)?;
    Ok(finish(
        ChatModel::Llama {
            model,
            config,
            dtype,
        },
        tokenizer,
        &configured_eos,
    ))
}

fn finish(model: ChatModel, mut tokenizer: Tokenizer, configured_eos: &[u32]) -> LoadedModel {
    let eos_token_ids = resolve_eos_tokens(&tokenizer, configured_eos);
    if let Some(&eos) = eos_token_ids.first() {
        ensure_pad_token(&mut tokenizer, eos);
    }
    tracing::debug!(kind = model.kind(), ?eos_token_ids, "chat model loaded");
    LoadedModel {
        model,
        tokenizer,
        eos_token_ids,
    }
}

fn load_gguf_weights(path: &Path, device: &Device) -> Result<ModelWeights, LlmError> {
    let mut file = std::fs::File::open(path).map_err(|e| {
        LlmError::ModelLoad(format!("failed to open GGUF file {}: {e}", path.display()))
    })?;
    let content = gguf_file::Content::read(&mut file)
        .map_err(|e| LlmError::ModelLoad(format!("failed to parse GGUF file: {e}")))?;
    ModelWeights::from_gguf(content, &mut file, device)
        .map_err(|e| LlmError::ModelLoad(format!("failed to load weights from GGUF: {e}")))
}

pub(crate) fn load_tokenizer(path: &Path) -> Result<Tokenizer, LlmError> {
    Tokenizer::from_file(path).map_err(|e| {
        LlmError::ModelLoad(format!(
            "failed to load tokenizer from {}: {e}",
            path.display()
        ))
    })
}

/// Stop tokens for generation: the model config's ids when present, else the
/// first well-known EOS token the vocabulary contains.
pub fn resolve_eos_tokens(tokenizer: &Tokenizer, configured: &[u32]) -> Vec<u32> {
    const EOS_CANDIDATES: &[&str] = &[
        "<|eot_id|>",
        "<|end_of_text|>",
        "</s>",
        "<|endoftext|>",
        "<|im_end|>",
        "<|end|>",
    ];

    if !configured.is_empty() {
        return configured.to_vec();
    }
    for candidate in EOS_CANDIDATES {
        if let Some(id) = tokenizer.token_to_id(candidate) {
            return vec![id];
        }
    }
    // token id 2 is EOS in most sentencepiece vocabularies
    vec![2]
}

/// Use the EOS token for padding when the tokenizer defines none.
pub fn ensure_pad_token(tokenizer: &mut Tokenizer, eos_token_id: u32) {
    if tokenizer.get_padding().is_some() {
        return;
    }
    let pad_token = tokenizer.id_to_token(eos_token_id).unwrap_or_default();
    tracing::debug!(%pad_token, "tokenizer has no pad token, using EOS");
    tokenizer.with_padding(Some(PaddingParams {
        pad_id: eos_token_id,
        pad_token,
        ..PaddingParams::default()
    }));
}
