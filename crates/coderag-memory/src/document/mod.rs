pub mod converter;
pub mod error;
pub mod loader;
pub mod metadata;
pub mod splitter;
pub mod types;

use std::path::Path;

pub use converter::{ConversionReport, ConverterConfig, convert_tree};
pub use error::DocumentError;
pub use loader::{DirectoryLoader, TextLoader};
pub use metadata::{format_chunks, normalize_source_metadata, print_chunks};
pub use splitter::{LengthFn, SplitterConfig, TextSplitter};
pub use types::{Chunk, Document, DocumentMetadata};

/// Default maximum file size: 50 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

pub trait DocumentLoader: Send + Sync {
    fn load(
        &self,
        path: &std::path::Path,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Vec<Document>, DocumentError>> + Send + '_>,
    >;
}

/// Load every file under `dir` and split it into chunks.
///
/// Chunk `source` metadata still carries the text-mirror extension; run
/// [`normalize_source_metadata`] afterwards.
///
/// # Errors
///
/// Returns an error if the splitter config is invalid, any file fails to load,
/// or `dir` holds no documents.
pub async fn chunk_directory(
    dir: &Path,
    loader: &DirectoryLoader,
    config: &SplitterConfig,
) -> Result<Vec<Chunk>, DocumentError> {
    let splitter = TextSplitter::new(config.clone())?;
    let documents = loader.load_dir(dir).await?;
    let chunks = splitter.split_documents(&documents);
    tracing::info!(
        documents = documents.len(),
        chunks = chunks.len(),
        chunk_size = config.chunk_size,
        chunk_overlap = config.chunk_overlap,
        "chunked {}",
        dir.display()
    );
    Ok(chunks)
}
