//! Construction of the model, embedder and vector store handles from config.

use std::sync::Arc;

#[cfg(feature = "candle")]
use anyhow::Context;
#[cfg(feature = "candle")]
use anyhow::bail;
use coderag_memory::{InMemoryVectorStore, LocalVectorStore, QdrantOps, VectorStore};

use crate::config::{Config, StoreBackend};
#[cfg(feature = "candle")]
use crate::config::{DeviceKind, EmbeddingConfig, GenerationConfig, ModelOrigin};

#[cfg(feature = "candle")]
use coderag_llm::candle_provider::{
    CandleEmbedder, CandleProvider, Device, embed::EmbedOptions,
    generate::GenerationConfig as DecodeConfig, loader::ModelSource,
};

/// Open the vector store selected by `index.backend`.
///
/// # Errors
///
/// Returns an error if the local storage path cannot be opened or the Qdrant
/// client cannot be built.
pub fn create_store(config: &Config) -> anyhow::Result<Arc<dyn VectorStore>> {
    let index = &config.index;
    let store: Arc<dyn VectorStore> = match index.backend {
        StoreBackend::Local => {
            let store = LocalVectorStore::open(&config.paths.vector_db_dir)?;
            tracing::info!(
                "local vector store at {}",
                config.paths.vector_db_dir.display()
            );
            Arc::new(store)
        }
        StoreBackend::Qdrant => {
            if !index.prefer_grpc {
                tracing::warn!("prefer_grpc = false has no effect, qdrant is reached over gRPC");
            }
            let ops = QdrantOps::new(&index.qdrant_url, index.api_key.as_deref())?;
            tracing::info!(url = %index.qdrant_url, "qdrant vector store");
            Arc::new(ops)
        }
        StoreBackend::Memory => {
            tracing::info!("in-memory vector store, nothing is persisted");
            Arc::new(InMemoryVectorStore::new())
        }
    };
    Ok(store)
}

#[cfg(feature = "candle")]
pub fn select_device(preference: DeviceKind) -> anyhow::Result<Device> {
    match preference {
        DeviceKind::Metal => {
            #[cfg(feature = "metal")]
            return Ok(Device::new_metal(0)?);
            #[cfg(not(feature = "metal"))]
            bail!("candle compiled without metal feature");
        }
        DeviceKind::Cuda => {
            #[cfg(feature = "cuda")]
            return Ok(Device::new_cuda(0)?);
            #[cfg(not(feature = "cuda"))]
            bail!("candle compiled without cuda feature");
        }
        DeviceKind::Auto => {
            #[cfg(feature = "metal")]
            if let Ok(device) = Device::new_metal(0) {
                return Ok(device);
            }
            #[cfg(feature = "cuda")]
            if let Ok(device) = Device::new_cuda(0) {
                return Ok(device);
            }
            Ok(Device::Cpu)
        }
        DeviceKind::Cpu => Ok(Device::Cpu),
    }
}

#[cfg(feature = "candle")]
#[must_use]
pub fn model_source(generation: &GenerationConfig) -> ModelSource {
    match (generation.source, &generation.local_path) {
        (ModelOrigin::Local, Some(path)) => ModelSource::Local { path: path.clone() },
        _ => ModelSource::HuggingFace {
            repo_id: generation.model.clone(),
            filename: generation.filename.clone(),
            tokenizer_repo: generation.tokenizer_repo.clone(),
        },
    }
}

#[cfg(feature = "candle")]
#[must_use]
pub fn decode_config(generation: &GenerationConfig) -> DecodeConfig {
    let sampling = &generation.sampling;
    DecodeConfig {
        temperature: sampling.temperature,
        top_p: sampling.top_p,
        top_k: sampling.top_k,
        max_new_tokens: generation.max_new_tokens,
        seed: sampling.seed,
        repeat_penalty: sampling.repeat_penalty,
        repeat_last_n: sampling.repeat_last_n,
    }
}

#[cfg(feature = "candle")]
#[must_use]
pub fn embed_options(embedding: &EmbeddingConfig) -> EmbedOptions {
    EmbedOptions {
        architecture: embedding.architecture,
        normalize: embedding.normalize,
        max_seq_len: embedding.max_seq_len,
        trust_remote_code: embedding.trust_remote_code,
    }
}

/// Load the causal language model described by `[generation]`.
///
/// # Errors
///
/// Returns an error if the device is unavailable or the weights or tokenizer
/// cannot be loaded.
#[cfg(feature = "candle")]
pub fn create_provider(config: &Config, hub_token: Option<&str>) -> anyhow::Result<CandleProvider> {
    let generation = &config.generation;
    let device = select_device(generation.device)?;
    let provider = CandleProvider::new(
        &model_source(generation),
        generation.chat_template,
        decode_config(generation),
        hub_token,
        device,
    )
    .with_context(|| format!("failed to load generation model {}", generation.model))?;
    tracing::info!(
        model = %generation.model,
        device = provider.device_name(),
        max_new_tokens = generation.max_new_tokens,
        "generation model ready"
    );
    Ok(provider)
}

/// Load the embedding model described by `[embedding]`.
///
/// # Errors
///
/// Returns an error if the device is unavailable, the architecture needs
/// `trust_remote_code`, or the model cannot be loaded.
#[cfg(feature = "candle")]
pub fn create_embedder(config: &Config, hub_token: Option<&str>) -> anyhow::Result<CandleEmbedder> {
    let embedding = &config.embedding;
    let device = select_device(embedding.device)?;
    let options = embed_options(embedding);
    let embedder = CandleEmbedder::new(&embedding.model, &options, hub_token, device)
        .with_context(|| format!("failed to load embedding model {}", embedding.model))?;
    tracing::info!(
        model = %embedding.model,
        device = embedder.device_name(),
        "embedding model ready"
    );
    Ok(embedder)
}
