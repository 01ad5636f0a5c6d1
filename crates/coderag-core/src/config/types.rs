use std::path::PathBuf;

use coderag_llm::{ChatTemplate, EmbedArchitecture};
use coderag_memory::HnswParams;
use coderag_memory::document::converter::DEFAULT_EXCLUDED_EXTENSIONS;
use coderag_memory::document::{ConverterConfig, DEFAULT_MAX_FILE_SIZE, SplitterConfig};
use serde::{Deserialize, Serialize};

pub(crate) const TEXT_GENERATION_TASK: &str = "text-generation";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub conversion: ConversionConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    /// Codebase to convert.
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,
    /// Text mirror written by the converter and read by the chunker.
    #[serde(default = "default_text_dir")]
    pub text_dir: PathBuf,
    /// Storage path of the local vector store.
    #[serde(default = "default_vector_db_dir")]
    pub vector_db_dir: PathBuf,
}

fn default_source_dir() -> PathBuf {
    PathBuf::from("../codebase")
}

fn default_text_dir() -> PathBuf {
    PathBuf::from("../data/codebase_txt")
}

fn default_vector_db_dir() -> PathBuf {
    PathBuf::from("../data/vector_db")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            text_dir: default_text_dir(),
            vector_db_dir: default_vector_db_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConversionConfig {
    #[serde(default = "default_excluded_extensions")]
    pub excluded_extensions: Vec<String>,
    #[serde(default)]
    pub respect_ignore_files: bool,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

fn default_excluded_extensions() -> Vec<String> {
    DEFAULT_EXCLUDED_EXTENSIONS
        .iter()
        .map(|e| (*e).to_owned())
        .collect()
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            excluded_extensions: default_excluded_extensions(),
            respect_ignore_files: false,
            max_file_size: default_max_file_size(),
        }
    }
}

impl ConversionConfig {
    #[must_use]
    pub fn converter_config(&self) -> ConverterConfig {
        ConverterConfig {
            excluded_extensions: self.excluded_extensions.clone(),
            respect_ignore_files: self.respect_ignore_files,
            max_file_size: self.max_file_size,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_separators")]
    pub separators: Vec<String>,
    /// Print chunks after metadata normalization.
    #[serde(default)]
    pub print_chunks: bool,
    /// How many chunks to print; all when unset.
    #[serde(default)]
    pub print_limit: Option<usize>,
}

fn default_chunk_size() -> usize {
    1500
}

fn default_chunk_overlap() -> usize {
    150
}

fn default_separators() -> Vec<String> {
    SplitterConfig::default().separators
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            separators: default_separators(),
            print_chunks: false,
            print_limit: None,
        }
    }
}

impl ChunkingConfig {
    #[must_use]
    pub fn splitter_config(&self) -> SplitterConfig {
        SplitterConfig {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            separators: self.separators.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_device")]
    pub device: DeviceKind,
    /// Allow architectures that ship custom modelling code (JinaBERT).
    #[serde(default = "default_true")]
    pub trust_remote_code: bool,
    #[serde(default = "default_true")]
    pub normalize: bool,
    #[serde(default)]
    pub architecture: EmbedArchitecture,
    #[serde(default = "default_max_seq_len")]
    pub max_seq_len: usize,
}

fn default_embedding_model() -> String {
    "jinaai/jina-embeddings-v2-base-code".into()
}

fn default_embedding_device() -> DeviceKind {
    DeviceKind::Cpu
}

fn default_true() -> bool {
    true
}

fn default_max_seq_len() -> usize {
    8192
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            device: default_embedding_device(),
            trust_remote_code: true,
            normalize: true,
            architecture: EmbedArchitecture::Auto,
            max_seq_len: default_max_seq_len(),
        }
    }
}

/// Vector store backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Local,
    Qdrant,
    Memory,
}

impl StoreBackend {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Qdrant => "qdrant",
            Self::Memory => "memory",
        }
    }
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IndexConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Kept for config compatibility; the Qdrant client always speaks gRPC.
    #[serde(default = "default_true")]
    pub prefer_grpc: bool,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default)]
    pub hnsw: HnswParams,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub force_recreate: bool,
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".into()
}

fn default_collection() -> String {
    "codebase".into()
}

fn default_batch_size() -> usize {
    64
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            qdrant_url: default_qdrant_url(),
            api_key: None,
            prefer_grpc: true,
            collection: default_collection(),
            hnsw: HnswParams::default(),
            batch_size: default_batch_size(),
            force_recreate: false,
        }
    }
}

impl IndexConfig {
    #[must_use]
    pub fn index_config(&self) -> coderag_memory::IndexConfig {
        coderag_memory::IndexConfig {
            collection: self.collection.clone(),
            hnsw: self.hnsw,
            batch_size: self.batch_size,
            force_recreate: self.force_recreate,
        }
    }
}

/// Where generation weights come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelOrigin {
    #[default]
    HuggingFace,
    Local,
}

/// Compute device preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    #[default]
    Auto,
    Cpu,
    Cuda,
    Metal,
}

impl DeviceKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
            Self::Metal => "metal",
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GenerationConfig {
    /// Hub repository id, or a label when `source = "local"`.
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_task")]
    pub task: String,
    #[serde(default)]
    pub source: ModelOrigin,
    #[serde(default)]
    pub local_path: Option<PathBuf>,
    /// GGUF file inside the repository; safetensors are used when unset.
    #[serde(default)]
    pub filename: Option<String>,
    /// Repository holding `tokenizer.json` when it differs from `model`.
    #[serde(default)]
    pub tokenizer_repo: Option<String>,
    #[serde(default)]
    pub device: DeviceKind,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: usize,
    #[serde(default)]
    pub chat_template: ChatTemplate,
    #[serde(default)]
    pub sampling: SamplingParams,
}

fn default_generation_model() -> String {
    "meta-llama/Llama-3.2-1B-Instruct".into()
}

fn default_task() -> String {
    TEXT_GENERATION_TASK.into()
}

fn default_max_new_tokens() -> usize {
    1000
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_generation_model(),
            task: default_task(),
            source: ModelOrigin::HuggingFace,
            local_path: None,
            filename: None,
            tokenizer_repo: None,
            device: DeviceKind::Auto,
            max_new_tokens: default_max_new_tokens(),
            chat_template: ChatTemplate::Llama3,
            sampling: SamplingParams::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SamplingParams {
    /// Zero or below selects greedy decoding.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f32,
    #[serde(default = "default_repeat_last_n")]
    pub repeat_last_n: usize,
}

fn default_temperature() -> f64 {
    0.6
}

#[allow(clippy::unnecessary_wraps)]
fn default_top_p() -> Option<f64> {
    Some(0.9)
}

fn default_seed() -> u64 {
    42
}

fn default_repeat_penalty() -> f32 {
    1.1
}

fn default_repeat_last_n() -> usize {
    64
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            top_k: None,
            seed: default_seed(),
            repeat_penalty: default_repeat_penalty(),
            repeat_last_n: default_repeat_last_n(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetrievalConfig {
    #[serde(default = "default_query")]
    pub query: String,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default)]
    pub print_results: bool,
}

fn default_query() -> String {
    "What is the syntax to import text_splitter using LangChain?".into()
}

fn default_k() -> usize {
    3
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            query: default_query(),
            k: default_k(),
            print_results: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid chunking settings: {0}")]
    Chunking(String),

    #[error("unsupported generation task `{0}`, only `text-generation` is available")]
    UnsupportedTask(String),

    #[error("generation.local_path is required when source is `local`")]
    MissingLocalPath,

    #[error("index.batch_size must be greater than 0")]
    ZeroBatchSize,

    #[error("index.collection must not be empty")]
    EmptyCollection,
}

impl Config {
    /// Check cross-field constraints that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chunking
            .splitter_config()
            .validate()
            .map_err(|e| ConfigError::Chunking(e.to_string()))?;

        let generation = &self.generation;
        if generation.task != TEXT_GENERATION_TASK {
            return Err(ConfigError::UnsupportedTask(generation.task.clone()));
        }
        if generation.source == ModelOrigin::Local && generation.local_path.is_none() {
            return Err(ConfigError::MissingLocalPath);
        }

        if self.index.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.index.collection.trim().is_empty() {
            return Err(ConfigError::EmptyCollection);
        }
        Ok(())
    }
}
