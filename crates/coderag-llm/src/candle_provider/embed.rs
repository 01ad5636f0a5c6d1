use std::path::PathBuf;
use std::sync::Arc;

use candle_core::{DType, Device, Module, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use candle_transformers::models::jina_bert;
use tokenizers::{Tokenizer, TruncationParams};

use crate::error::LlmError;

use super::loader::{hub_api, load_tokenizer};

pub use crate::architecture::EmbedArchitecture;

#[derive(Debug, Clone)]
pub struct EmbedOptions {
    pub architecture: EmbedArchitecture,
    pub normalize: bool,
    pub max_seq_len: usize,
    pub trust_remote_code: bool,
}

impl Default for EmbedOptions {
    fn default() -> Self {
        Self {
            architecture: EmbedArchitecture::Auto,
            normalize: true,
            max_seq_len: 8192,
            trust_remote_code: false,
        }
    }
}

enum Encoder {
    Bert(BertModel),
    JinaBert(jina_bert::BertModel),
}

impl Encoder {
    fn forward(&self, input_ids: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            Self::Bert(model) => {
                let token_type_ids = input_ids.zeros_like()?;
                model.forward(input_ids, &token_type_ids, Some(attention_mask))
            }
            Self::JinaBert(model) => model.forward(input_ids),
        }
    }
}

#[derive(Clone)]
pub struct EmbedModel {
    encoder: Arc<Encoder>,
    tokenizer: Tokenizer,
    architecture: EmbedArchitecture,
    normalize: bool,
    device: Device,
}

impl std::fmt::Debug for EmbedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbedModel")
            .field("architecture", &self.architecture)
            .field("normalize", &self.normalize)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl EmbedModel {
    /// Load an encoder from the `HuggingFace` Hub.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Config`] when the checkpoint needs custom modelling
    /// code and `trust_remote_code` is off, and [`LlmError::ModelLoad`] when a
    /// download or parse fails.
    pub fn load(
        repo_id: &str,
        options: &EmbedOptions,
        hub_token: Option<&str>,
        device: &Device,
    ) -> Result<Self, LlmError> {
        let api = hub_api(hub_token)?;
        let repo = api.model(repo_id.to_owned());
        let get = |name: &str| {
            repo.get(name).map_err(|e| {
                LlmError::ModelLoad(format!("failed to download {name} from {repo_id}: {e}"))
            })
        };

        let config_path = get("config.json")?;
        let tokenizer_path = get("tokenizer.json")?;
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| LlmError::ModelLoad(format!("failed to read encoder config: {e}")))?;
        let config_value: serde_json::Value = serde_json::from_str(&raw)?;

        let architecture = resolve_architecture(options, &config_value)?;
        let weights = match get("model.safetensors") {
            Ok(path) => Weights::SafeTensors(path),
            Err(_) => Weights::Pytorch(get("pytorch_model.bin")?),
        };
        let vb = weights.var_builder(device)?;

        let encoder = match architecture {
            EmbedArchitecture::JinaBert => {
                let config: jina_bert::Config = serde_json::from_value(config_value)?;
                Encoder::JinaBert(jina_bert::BertModel::new(vb, &config)?)
            }
            EmbedArchitecture::Bert | EmbedArchitecture::Auto => {
                let config: BertConfig = serde_json::from_value(config_value)?;
                Encoder::Bert(BertModel::load(vb, &config)?)
            }
        };

        let mut tokenizer = load_tokenizer(&tokenizer_path)?;
        tokenizer.with_padding(None);
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: options.max_seq_len,
                ..TruncationParams::default()
            }))
            .map_err(|e| LlmError::Config(format!("invalid truncation settings: {e}")))?;

        tracing::info!(repo_id, ?architecture, "embedding model loaded");
        Ok(Self {
            encoder: Arc::new(encoder),
            tokenizer,
            architecture,
            normalize: options.normalize,
            device: device.clone(),
        })
    }

    #[must_use]
    pub fn architecture(&self) -> EmbedArchitecture {
        self.architecture
    }

    /// Embed one text: encoder forward, masked mean pooling, optional L2 norm.
    ///
    /// # Errors
    ///
    /// Returns an error if tokenization or the model forward pass fails.
    pub fn embed_sync(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| LlmError::Inference(format!("tokenizer encode failed: {e}")))?;

        let input_ids = Tensor::new(encoding.get_ids(), &self.device)?.unsqueeze(0)?;
        let mask = Tensor::new(encoding.get_attention_mask(), &self.device)?.unsqueeze(0)?;

        let hidden = self.encoder.forward(&input_ids, &mask)?;
        let mut pooled = mean_pool(&hidden, &mask)?;
        if self.normalize {
            pooled = l2_normalize(&pooled)?;
        }
        pooled.squeeze(0)?.to_vec1::<f32>().map_err(LlmError::Candle)
    }
}

enum Weights {
    SafeTensors(PathBuf),
    Pytorch(PathBuf),
}

impl Weights {
    fn var_builder(&self, device: &Device) -> Result<VarBuilder<'static>, LlmError> {
        match self {
            Self::SafeTensors(path) => {
                // SAFETY: file is a safetensors blob from the hub cache, not
                // modified during the VarBuilder lifetime
                let vb = unsafe {
                    VarBuilder::from_mmaped_safetensors(
                        std::slice::from_ref(path),
                        DType::F32,
                        device,
                    )
                };
                vb.map_err(|e| LlmError::ModelLoad(format!("failed to map safetensors: {e}")))
            }
            Self::Pytorch(path) => VarBuilder::from_pth(path, DType::F32, device)
                .map_err(|e| LlmError::ModelLoad(format!("failed to read pytorch weights: {e}"))),
        }
    }
}

fn resolve_architecture(
    options: &EmbedOptions,
    config: &serde_json::Value,
) -> Result<EmbedArchitecture, LlmError> {
    let architecture = match options.architecture {
        EmbedArchitecture::Auto => EmbedArchitecture::detect(config),
        explicit => explicit,
    };
    if architecture.requires_remote_code() && !options.trust_remote_code {
        return Err(LlmError::Config(
            "embedding model uses custom modelling code; set trust_remote_code = true".into(),
        ));
    }
    Ok(architecture)
}

/// Mean of `hidden` (`[batch, seq, dim]`) over positions where `mask` (`[batch, seq]`) is set.
///
/// # Errors
///
/// Returns an error on shape mismatch.
pub fn mean_pool(hidden: &Tensor, mask: &Tensor) -> Result<Tensor, LlmError> {
    let mask = mask.to_dtype(hidden.dtype())?.unsqueeze(2)?;
    let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
    let counts = mask.sum(1)?.clamp(1e-9, f64::MAX)?;
    Ok(summed.broadcast_div(&counts)?)
}

/// Scale each row of `[batch, dim]` to unit L2 norm.
///
/// # Errors
///
/// Returns an error on tensor failures.
pub fn l2_normalize(v: &Tensor) -> Result<Tensor, LlmError> {
    let norm = v.sqr()?.sum_keepdim(1)?.sqrt()?.clamp(1e-12, f64::MAX)?;
    Ok(v.broadcast_div(&norm)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jina_requires_trust_remote_code() {
        let cfg = serde_json::json!({"position_embedding_type": "alibi"});
        let options = EmbedOptions::default();
        let err = resolve_architecture(&options, &cfg).unwrap_err();
        assert!(matches!(err, LlmError::Config(_)));

        let trusted = EmbedOptions {
            trust_remote_code: true,
            ..EmbedOptions::default()
        };
        assert_eq!(
            resolve_architecture(&trusted, &cfg).unwrap(),
            EmbedArchitecture::JinaBert
        );
    }

    #[test]
    fn explicit_architecture_overrides_detection() {
        let cfg = serde_json::json!({"position_embedding_type": "alibi"});
        let options = EmbedOptions {
            architecture: EmbedArchitecture::Bert,
            ..EmbedOptions::default()
        };
        assert_eq!(
            resolve_architecture(&options, &cfg).unwrap(),
            EmbedArchitecture::Bert
        );
    }

    #[test]
    fn mean_pool_ignores_masked_positions() {
        let hidden =
            Tensor::new(&[[[1.0_f32, 2.0], [3.0, 4.0], [100.0, 100.0]]], &Device::Cpu).unwrap();
        let mask = Tensor::new(&[[1_u32, 1, 0]], &Device::Cpu).unwrap();
        let pooled: Vec<Vec<f32>> = mean_pool(&hidden, &mask).unwrap().to_vec2().unwrap();
        assert_eq!(pooled, vec![vec![2.0, 3.0]]);
    }

    #[test]
    fn l2_normalize_yields_unit_rows() {
        let v = Tensor::new(&[[3.0_f32, 4.0]], &Device::Cpu).unwrap();
        let n: Vec<Vec<f32>> = l2_normalize(&v).unwrap().to_vec2().unwrap();
        assert!((n[0][0] - 0.6).abs() < 1e-6);
        assert!((n[0][1] - 0.8).abs() < 1e-6);
    }
}
