//! One batch run: convert, chunk, index, retrieve, generate.

use std::sync::Arc;

use coderag_llm::{EmbeddingProvider, LlmError, LlmProvider};
use coderag_memory::document::{
    ConversionReport, DirectoryLoader, DocumentError, TextLoader, chunk_directory, convert_tree,
    normalize_source_metadata, print_chunks,
};
use coderag_memory::{IndexError, ScoredChunk, VectorIndex, VectorStore, join_context, print_results};

use crate::config::{Config, ConfigError};
use crate::prompt::Prompter;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("conversion task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// What a run produced, for callers that want more than stdout.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub conversion: ConversionReport,
    pub chunk_count: usize,
    pub results: Vec<ScoredChunk>,
    pub answer: String,
}

/// Drive every stage in order. Each stage finishes before the next starts.
///
/// # Errors
///
/// Returns the first fatal error. Files that fail to decode or write during
/// conversion are logged and counted instead.
pub async fn run<P, E>(
    config: &Config,
    provider: &P,
    embedder: E,
    store: Arc<dyn VectorStore>,
) -> Result<PipelineOutput, PipelineError>
where
    P: LlmProvider,
    E: EmbeddingProvider,
{
    config.validate()?;
    let paths = &config.paths;

    tracing::info!(
        "converting {} into {}",
        paths.source_dir.display(),
        paths.text_dir.display()
    );
    let conversion = {
        let src = paths.source_dir.clone();
        let dst = paths.text_dir.clone();
        let converter = config.conversion.converter_config();
        tokio::task::spawn_blocking(move || convert_tree(&src, &dst, &converter)).await??
    };

    let loader = DirectoryLoader {
        loader: TextLoader {
            max_file_size: config.conversion.max_file_size,
        },
        include_hidden: false,
    };
    let mut chunks =
        chunk_directory(&paths.text_dir, &loader, &config.chunking.splitter_config()).await?;
    normalize_source_metadata(&mut chunks);
    if config.chunking.print_chunks {
        print_chunks(&chunks, config.chunking.print_limit);
    }

    let index =
        VectorIndex::build(&chunks, &config.index.index_config(), store, embedder).await?;

    let retrieval = &config.retrieval;
    tracing::info!(query = %retrieval.query, k = retrieval.k, "running test query");
    let results = index.query(&retrieval.query, retrieval.k).await?;
    if retrieval.print_results {
        print_results(&results);
    }
    let context = join_context(&results);

    let answer = Prompter::new()
        .generate(&retrieval.query, provider, &context)
        .await?;
    println!("{answer}");

    Ok(PipelineOutput {
        conversion,
        chunk_count: chunks.len(),
        results,
        answer,
    })
}

#[cfg(test)]
mod tests {
    use coderag_llm::mock::{MockEmbedder, MockProvider};
    use coderag_memory::InMemoryVectorStore;

    use super::*;

    fn config_for(root: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.paths.source_dir = root.join("codebase");
        config.paths.text_dir = root.join("mirror");
        config.paths.vector_db_dir = root.join("vector_db");
        config.chunking.chunk_size = 200;
        config.chunking.chunk_overlap = 20;
        config
    }

    fn seed_codebase(root: &std::path::Path) {
        let src = root.join("codebase");
        std::fs::create_dir_all(src.join("pkg")).unwrap();
        std::fs::write(
            src.join("split.py"),
            "from langchain.text_splitter import RecursiveCharacterTextSplitter\n",
        )
        .unwrap();
        std::fs::write(src.join("pkg/server.rs"), "fn serve() { loop {} }\n").unwrap();
        std::fs::write(src.join("logo.png"), [0x89, b'P', b'N', b'G']).unwrap();
        std::fs::write(src.join("blob.bin"), [0xff, 0xfe, 0x00, 0x80]).unwrap();
    }

    #[tokio::test]
    async fn runs_every_stage() {
        let dir = tempfile::tempdir().unwrap();
        seed_codebase(dir.path());
        let mut config = config_for(dir.path());
        config.retrieval.k = 1;
        config.retrieval.query =
            "from langchain.text_splitter import RecursiveCharacterTextSplitter".into();

        let provider = MockProvider::with_responses(vec!["  from langchain import x  \n".into()]);
        let store = Arc::new(InMemoryVectorStore::new());
        let output = run(&config, &provider, MockEmbedder::new(64), store.clone())
            .await
            .unwrap();

        assert_eq!(output.conversion.converted, 2);
        assert_eq!(output.conversion.skipped_excluded, 1);
        assert_eq!(output.conversion.decode_failures, 1);
        assert_eq!(output.chunk_count, 2);
        assert_eq!(store.point_count("codebase"), Some(2));
        assert_eq!(output.results.len(), 1);
        assert_eq!(output.results[0].chunk.metadata.source, "split");
        assert_eq!(output.answer, "from langchain import x");

        let prompts = provider.prompts();
        assert!(prompts[0].contains("RecursiveCharacterTextSplitter"));
        assert!(!prompts[0].contains("fn serve"));
    }

    #[tokio::test]
    async fn invalid_config_fails_before_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        seed_codebase(dir.path());
        let mut config = config_for(dir.path());
        config.generation.task = "summarization".into();

        let err = run(
            &config,
            &MockProvider::default(),
            MockEmbedder::new(8),
            Arc::new(InMemoryVectorStore::new()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        assert!(!dir.path().join("mirror").exists());
    }

    #[tokio::test]
    async fn codebase_without_text_files_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("codebase");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("only.jpg"), [0u8; 4]).unwrap();

        let embedder = MockEmbedder::new(8);
        let err = run(
            &config_for(dir.path()),
            &MockProvider::default(),
            embedder.clone(),
            Arc::new(InMemoryVectorStore::new()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::Document(DocumentError::NoDocuments(_))));
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn generation_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        seed_codebase(dir.path());
        let err = run(
            &config_for(dir.path()),
            &MockProvider::failing(),
            MockEmbedder::new(8),
            Arc::new(InMemoryVectorStore::new()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::Llm(_)));
    }
}
