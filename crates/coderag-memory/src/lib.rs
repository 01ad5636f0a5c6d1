//! Codebase text mirroring, chunking and vector indexing.

pub mod document;
pub mod error;
pub mod in_memory_store;
pub mod index;
pub mod local_store;
pub mod qdrant_ops;
pub mod vector_store;

pub use error::IndexError;
pub use in_memory_store::InMemoryVectorStore;
pub use index::{IndexConfig, ScoredChunk, VectorIndex, format_results, join_context, print_results};
pub use local_store::LocalVectorStore;
pub use qdrant_ops::QdrantOps;
pub use vector_store::{HnswParams, VectorPoint, VectorStore, VectorStoreError};
