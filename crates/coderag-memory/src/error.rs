#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("no documents to index")]
    NoDocuments,

    #[error("embedding failed: {0}")]
    Embedding(#[from] coderag_llm::LlmError),

    #[error("vector store error: {0}")]
    Store(#[from] crate::vector_store::VectorStoreError),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedder returned {actual} vectors for {expected} texts")]
    BatchSize { expected: usize, actual: usize },
}
