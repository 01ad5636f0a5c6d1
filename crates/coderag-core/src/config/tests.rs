use std::io::Write;
use std::path::PathBuf;

use coderag_llm::{ChatTemplate, EmbedArchitecture};
use serial_test::serial;

use super::*;

const ENV_KEYS: [&str; 20] = [
    "CODERAG_SOURCE_DIR",
    "CODERAG_TEXT_DIR",
    "CODERAG_VECTOR_DB_DIR",
    "CODERAG_CHUNK_SIZE",
    "CODERAG_CHUNK_OVERLAP",
    "CODERAG_QUERY",
    "CODERAG_RETRIEVAL_K",
    "CODERAG_EMBEDDING_MODEL",
    "CODERAG_EMBEDDING_DEVICE",
    "CODERAG_GENERATION_MODEL",
    "CODERAG_GENERATION_DEVICE",
    "CODERAG_MAX_NEW_TOKENS",
    "CODERAG_CHAT_TEMPLATE",
    "CODERAG_INDEX_BACKEND",
    "CODERAG_QDRANT_URL",
    "CODERAG_QDRANT_API_KEY",
    "CODERAG_COLLECTION",
    "CODERAG_FORCE_RECREATE",
    "HUGGINGFACE_TOKEN",
    "HF_TOKEN",
];

fn clear_env() {
    for key in ENV_KEYS {
        unsafe { std::env::remove_var(key) };
    }
}

fn write_config(dir: &tempfile::TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("config.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    write!(f, "{body}").unwrap();
    path
}

#[test]
fn defaults_match_reference_pipeline() {
    let config = Config::default();
    assert_eq!(config.paths.source_dir, PathBuf::from("../codebase"));
    assert_eq!(config.paths.text_dir, PathBuf::from("../data/codebase_txt"));
    assert_eq!(config.paths.vector_db_dir, PathBuf::from("../data/vector_db"));
    assert_eq!(config.chunking.chunk_size, 1500);
    assert_eq!(config.chunking.chunk_overlap, 150);
    assert_eq!(config.embedding.model, "jinaai/jina-embeddings-v2-base-code");
    assert_eq!(config.embedding.device, DeviceKind::Cpu);
    assert!(config.embedding.trust_remote_code);
    assert!(config.embedding.normalize);
    assert_eq!(config.index.backend, StoreBackend::Local);
    assert_eq!(config.index.collection, "codebase");
    assert!(config.index.prefer_grpc);
    assert_eq!(config.generation.model, "meta-llama/Llama-3.2-1B-Instruct");
    assert_eq!(config.generation.task, "text-generation");
    assert_eq!(config.generation.device, DeviceKind::Auto);
    assert_eq!(config.generation.max_new_tokens, 1000);
    assert_eq!(config.retrieval.k, 3);
    assert!(!config.retrieval.print_results);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn missing_file_falls_back_to_defaults() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.retrieval.k, 3);
}

#[test]
#[serial]
fn parse_valid_toml() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
[paths]
source_dir = "./repo"
text_dir = "./mirror"

[chunking]
chunk_size = 500
chunk_overlap = 50
print_chunks = true
print_limit = 2

[index]
backend = "qdrant"
qdrant_url = "http://qdrant:6334"

[index.hnsw]
m = 32

[generation]
device = "cpu"
chat_template = "chatml"

[generation.sampling]
temperature = 0.0

[retrieval]
query = "how do I split text?"
k = 5
"#,
    );

    let config = Config::load(&path).unwrap();
    assert_eq!(config.paths.source_dir, PathBuf::from("./repo"));
    assert_eq!(config.paths.vector_db_dir, PathBuf::from("../data/vector_db"));
    assert_eq!(config.chunking.chunk_size, 500);
    assert_eq!(config.chunking.print_limit, Some(2));
    assert_eq!(config.index.backend, StoreBackend::Qdrant);
    assert_eq!(config.index.hnsw.m, 32);
    assert_eq!(config.index.hnsw.ef_construct, 200);
    assert_eq!(config.generation.device, DeviceKind::Cpu);
    assert!(config.generation.sampling.temperature.abs() < f64::EPSILON);
    assert_eq!(config.generation.sampling.seed, 42);
    assert_eq!(config.retrieval.k, 5);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn unknown_fields_are_rejected() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[chunking]\nchunk_sise = 10\n");
    assert!(Config::load(&path).is_err());
}

#[test]
#[serial]
fn unknown_device_is_a_parse_error() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[generation]\ndevice = \"tpu\"\n");
    assert!(Config::load(&path).is_err());
}

#[test]
#[serial]
fn env_overrides_file_values() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[retrieval]\nk = 5\n");
    unsafe {
        std::env::set_var("CODERAG_RETRIEVAL_K", "7");
        std::env::set_var("CODERAG_SOURCE_DIR", "/tmp/src");
        std::env::set_var("CODERAG_INDEX_BACKEND", "Qdrant");
        std::env::set_var("CODERAG_QDRANT_API_KEY", "secret");
        std::env::set_var("CODERAG_GENERATION_DEVICE", "metal");
        std::env::set_var("CODERAG_MAX_NEW_TOKENS", "64");
        std::env::set_var("CODERAG_CHAT_TEMPLATE", "ChatML");
    }
    let config = Config::load(&path).unwrap();
    clear_env();

    assert_eq!(config.retrieval.k, 7);
    assert_eq!(config.paths.source_dir, PathBuf::from("/tmp/src"));
    assert_eq!(config.index.backend, StoreBackend::Qdrant);
    assert_eq!(config.index.api_key.as_deref(), Some("secret"));
    assert_eq!(config.generation.device, DeviceKind::Metal);
    assert_eq!(config.generation.max_new_tokens, 64);
    assert_eq!(config.generation.chat_template, ChatTemplate::ChatML);
}

#[test]
#[serial]
fn invalid_env_values_are_ignored() {
    clear_env();
    unsafe {
        std::env::set_var("CODERAG_CHUNK_SIZE", "lots");
        std::env::set_var("CODERAG_INDEX_BACKEND", "redis");
        std::env::set_var("CODERAG_EMBEDDING_DEVICE", "tpu");
        std::env::set_var("CODERAG_CHAT_TEMPLATE", "alpaca");
    }
    let mut config = Config::default();
    config.apply_env_overrides();
    clear_env();

    assert_eq!(config.chunking.chunk_size, 1500);
    assert_eq!(config.index.backend, StoreBackend::Local);
    assert_eq!(config.embedding.device, DeviceKind::Cpu);
    assert_eq!(config.generation.chat_template, ChatTemplate::Llama3);
}

#[test]
#[serial]
fn hub_token_prefers_huggingface_token() {
    clear_env();
    assert!(Config::hub_token().is_none());
    unsafe {
        std::env::set_var("HF_TOKEN", "hf-fallback");
    }
    assert_eq!(Config::hub_token().as_deref(), Some("hf-fallback"));
    unsafe {
        std::env::set_var("HUGGINGFACE_TOKEN", "hf-primary");
    }
    assert_eq!(Config::hub_token().as_deref(), Some("hf-primary"));
    unsafe {
        std::env::set_var("HUGGINGFACE_TOKEN", "  ");
    }
    assert_eq!(Config::hub_token().as_deref(), Some("hf-fallback"));
    clear_env();
}

#[test]
fn overlap_not_smaller_than_size_is_invalid() {
    let mut config = Config::default();
    config.chunking.chunk_size = 100;
    config.chunking.chunk_overlap = 100;
    assert!(matches!(config.validate(), Err(ConfigError::Chunking(_))));
}

#[test]
fn only_text_generation_task_is_accepted() {
    let mut config = Config::default();
    config.generation.task = "summarization".into();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::UnsupportedTask(t)) if t == "summarization"
    ));
}

#[test]
fn template_names_parse_with_aliases() {
    let parse = |body: &str| toml::from_str::<Config>(body).map(|c| c.generation.chat_template);
    assert_eq!(
        parse("[generation]\nchat_template = \"chat-ml\"\n").unwrap(),
        ChatTemplate::ChatML
    );
    assert_eq!(
        parse("[generation]\nchat_template = \"phi\"\n").unwrap(),
        ChatTemplate::Phi3
    );
    assert!(parse("[generation]\nchat_template = \"alpaca\"\n").is_err());
}

#[test]
fn local_source_requires_path() {
    let mut config = Config::default();
    config.generation.source = ModelOrigin::Local;
    assert!(matches!(config.validate(), Err(ConfigError::MissingLocalPath)));
    config.generation.local_path = Some(PathBuf::from("/models/llama"));
    assert!(config.validate().is_ok());
    assert!(toml::from_str::<Config>("[generation]\nsource = \"s3\"\n").is_err());
}

#[test]
fn zero_batch_size_is_invalid() {
    let mut config = Config::default();
    config.index.batch_size = 0;
    assert!(matches!(config.validate(), Err(ConfigError::ZeroBatchSize)));
}

#[test]
fn embed_architecture_is_typed() {
    let config: Config = toml::from_str("[embedding]\narchitecture = \"jina-bert\"\n").unwrap();
    assert_eq!(config.embedding.architecture, EmbedArchitecture::JinaBert);
    assert!(toml::from_str::<Config>("[embedding]\narchitecture = \"roberta\"\n").is_err());
}

