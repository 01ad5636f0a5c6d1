use std::path::PathBuf;

use coderag_llm::ChatTemplate;

use super::{Config, DeviceKind, StoreBackend};

fn parse_enum<T: serde::de::DeserializeOwned>(key: &str, value: &str) -> Option<T> {
    let parsed = serde_json::from_value(serde_json::Value::String(value.to_lowercase())).ok();
    if parsed.is_none() {
        tracing::warn!("ignoring invalid {key} value: {value}");
    }
    parsed
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_paths();
        self.apply_env_overrides_models();
        self.apply_env_overrides_index();
    }

    fn apply_env_overrides_paths(&mut self) {
        if let Ok(v) = std::env::var("CODERAG_SOURCE_DIR") {
            self.paths.source_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("CODERAG_TEXT_DIR") {
            self.paths.text_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("CODERAG_VECTOR_DB_DIR") {
            self.paths.vector_db_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("CODERAG_CHUNK_SIZE")
            && let Ok(size) = v.parse::<usize>()
        {
            self.chunking.chunk_size = size;
        }
        if let Ok(v) = std::env::var("CODERAG_CHUNK_OVERLAP")
            && let Ok(overlap) = v.parse::<usize>()
        {
            self.chunking.chunk_overlap = overlap;
        }
        if let Ok(v) = std::env::var("CODERAG_QUERY") {
            self.retrieval.query = v;
        }
        if let Ok(v) = std::env::var("CODERAG_RETRIEVAL_K")
            && let Ok(k) = v.parse::<usize>()
        {
            self.retrieval.k = k;
        }
    }

    fn apply_env_overrides_models(&mut self) {
        if let Ok(v) = std::env::var("CODERAG_EMBEDDING_MODEL") {
            self.embedding.model = v;
        }
        if let Ok(v) = std::env::var("CODERAG_EMBEDDING_DEVICE")
            && let Some(device) = parse_enum::<DeviceKind>("CODERAG_EMBEDDING_DEVICE", &v)
        {
            self.embedding.device = device;
        }
        if let Ok(v) = std::env::var("CODERAG_GENERATION_MODEL") {
            self.generation.model = v;
        }
        if let Ok(v) = std::env::var("CODERAG_GENERATION_DEVICE")
            && let Some(device) = parse_enum::<DeviceKind>("CODERAG_GENERATION_DEVICE", &v)
        {
            self.generation.device = device;
        }
        if let Ok(v) = std::env::var("CODERAG_MAX_NEW_TOKENS")
            && let Ok(n) = v.parse::<usize>()
        {
            self.generation.max_new_tokens = n;
        }
        if let Ok(v) = std::env::var("CODERAG_CHAT_TEMPLATE")
            && let Some(template) = parse_enum::<ChatTemplate>("CODERAG_CHAT_TEMPLATE", &v)
        {
            self.generation.chat_template = template;
        }
    }

    fn apply_env_overrides_index(&mut self) {
        if let Ok(v) = std::env::var("CODERAG_INDEX_BACKEND")
            && let Some(backend) = parse_enum::<StoreBackend>("CODERAG_INDEX_BACKEND", &v)
        {
            self.index.backend = backend;
        }
        if let Ok(v) = std::env::var("CODERAG_QDRANT_URL") {
            self.index.qdrant_url = v;
        }
        if let Ok(v) = std::env::var("CODERAG_QDRANT_API_KEY") {
            self.index.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("CODERAG_COLLECTION") {
            self.index.collection = v;
        }
        if let Ok(v) = std::env::var("CODERAG_FORCE_RECREATE")
            && let Ok(force) = v.parse::<bool>()
        {
            self.index.force_recreate = force;
        }
    }
}
