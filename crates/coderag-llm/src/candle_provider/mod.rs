pub mod embed;
pub mod generate;
pub mod loader;

use std::sync::{Arc, Mutex};

pub use candle_core::Device;

use tokenizers::Tokenizer;

use crate::error::LlmError;
use crate::provider::{EmbeddingProvider, LlmProvider};

use self::embed::{EmbedModel, EmbedOptions};
use self::generate::{GenerationConfig, GenerationOutput, generate_tokens};
use self::loader::{ChatModel, LoadedModel, ModelSource, load_chat_model};
use crate::template::ChatTemplate;

#[derive(Clone)]
pub struct CandleProvider {
    // std::sync::Mutex serializes inference; the batch runs one generation at a time
    model: Arc<Mutex<ChatModel>>,
    tokenizer: Arc<Tokenizer>,
    eos_token_ids: Vec<u32>,
    template: ChatTemplate,
    generation_config: GenerationConfig,
    device: Device,
}

impl std::fmt::Debug for CandleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandleProvider")
            .field("template", &self.template)
            .field("generation_config", &self.generation_config)
            .field("device", &format!("{:?}", self.device))
            .finish_non_exhaustive()
    }
}

impl CandleProvider {
    /// Load weights and tokenizer from `source`.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ModelLoad`] if the model or tokenizer cannot be loaded.
    pub fn new(
        source: &ModelSource,
        template: ChatTemplate,
        generation_config: GenerationConfig,
        hub_token: Option<&str>,
        device: Device,
    ) -> Result<Self, LlmError> {
        let LoadedModel {
            model,
            tokenizer,
            eos_token_ids,
        } = load_chat_model(source, hub_token, &device)?;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            tokenizer: Arc::new(tokenizer),
            eos_token_ids,
            template,
            generation_config,
            device,
        })
    }

    #[must_use]
    pub fn device_name(&self) -> &'static str {
        device_name(&self.device)
    }

    fn generate_sync(&self, prompt: &str) -> Result<String, LlmError> {
        let formatted = self.template.format_prompt(prompt);
        let encoding = self
            .tokenizer
            .encode(formatted.as_str(), false)
            .map_err(|e| LlmError::Inference(format!("tokenizer encode failed: {e}")))?;
        let input_tokens = encoding.get_ids();

        let mut model = self
            .model
            .lock()
            .map_err(|e| LlmError::Inference(format!("model lock poisoned: {e}")))?;
        let mut cache = model.new_cache(&self.device)?;
        let mut forward_fn = |input: &candle_core::Tensor, pos: usize| {
            model.forward(input, pos, cache.as_mut())
        };

        let GenerationOutput {
            text,
            tokens_generated,
        } = generate_tokens(
            &mut forward_fn,
            &self.tokenizer,
            input_tokens,
            &self.generation_config,
            &self.eos_token_ids,
            &self.device,
        )?;

        tracing::debug!(
            prompt_tokens = input_tokens.len(),
            tokens_generated,
            "generation finished"
        );
        Ok(text)
    }
}

impl LlmProvider for CandleProvider {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let provider = self.clone();
        let prompt = prompt.to_owned();
        tokio::task::spawn_blocking(move || provider.generate_sync(&prompt))
            .await
            .map_err(|e| LlmError::Inference(format!("candle generation task failed: {e}")))?
    }

    fn name(&self) -> &'static str {
        "candle"
    }
}

/// Sentence embedder backed by a candle encoder.
#[derive(Debug, Clone)]
pub struct CandleEmbedder {
    model: Arc<EmbedModel>,
    device: Device,
}

impl CandleEmbedder {
    /// # Errors
    ///
    /// See [`EmbedModel::load`].
    pub fn new(
        repo_id: &str,
        options: &EmbedOptions,
        hub_token: Option<&str>,
        device: Device,
    ) -> Result<Self, LlmError> {
        let model = EmbedModel::load(repo_id, options, hub_token, &device)?;
        Ok(Self {
            model: Arc::new(model),
            device,
        })
    }

    #[must_use]
    pub fn device_name(&self) -> &'static str {
        device_name(&self.device)
    }
}

impl EmbeddingProvider for CandleEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let model = self.model.clone();
        let text = text.to_owned();
        tokio::task::spawn_blocking(move || model.embed_sync(&text))
            .await
            .map_err(|e| LlmError::Inference(format!("candle embedding task failed: {e}")))?
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        let model = self.model.clone();
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || {
            texts
                .iter()
                .map(|t| model.embed_sync(t))
                .collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(|e| LlmError::Inference(format!("candle embedding task failed: {e}")))?
    }

    fn name(&self) -> &'static str {
        "candle"
    }
}

fn device_name(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "cpu",
        Device::Cuda(_) => "cuda",
        Device::Metal(_) => "metal",
    }
}
