//! Embedding index over a [`VectorStore`].

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::sync::Arc;

use coderag_llm::EmbeddingProvider;
use uuid::Uuid;

use crate::document::{Chunk, DocumentMetadata};
use crate::error::IndexError;
use crate::vector_store::{HnswParams, ScoredVectorPoint, VectorPoint, VectorStore};

const CONTENT_KEY: &str = "page_content";
const METADATA_KEY: &str = "metadata";

#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub collection: String,
    pub hnsw: HnswParams,
    /// Chunks embedded and upserted per round trip.
    pub batch_size: usize,
    /// Drop an existing collection before indexing.
    pub force_recreate: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            collection: "codebase".into(),
            hnsw: HnswParams::default(),
            batch_size: 64,
            force_recreate: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

pub struct VectorIndex<E> {
    store: Arc<dyn VectorStore>,
    embedder: E,
    collection: String,
}

impl<E> std::fmt::Debug for VectorIndex<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

impl<E: EmbeddingProvider> VectorIndex<E> {
    /// Embed `chunks` and upsert them into the configured collection.
    ///
    /// The vector size is taken from the first embedding. Point ids are
    /// derived from source, chunk index and content, so re-indexing the same
    /// chunks overwrites rather than duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::NoDocuments`] for an empty input before any
    /// embedding call, or the first embedding or store failure.
    pub async fn build(
        chunks: &[Chunk],
        config: &IndexConfig,
        store: Arc<dyn VectorStore>,
        embedder: E,
    ) -> Result<Self, IndexError> {
        if chunks.is_empty() {
            return Err(IndexError::NoDocuments);
        }

        let collection = config.collection.clone();
        if config.force_recreate && store.collection_exists(&collection).await? {
            tracing::info!(%collection, "dropping existing collection");
            store.delete_collection(&collection).await?;
        }

        let mut dim: Option<usize> = None;
        let batch_size = config.batch_size.max(1);
        for (batch_no, batch) in chunks.chunks(batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = embedder.embed_batch(&texts).await?;
            if vectors.len() != texts.len() {
                return Err(IndexError::BatchSize {
                    expected: texts.len(),
                    actual: vectors.len(),
                });
            }

            let expected = match dim {
                Some(d) => d,
                None => {
                    let d = vectors[0].len();
                    store
                        .ensure_collection(&collection, d as u64, config.hnsw)
                        .await?;
                    dim = Some(d);
                    d
                }
            };

            let mut points = Vec::with_capacity(batch.len());
            for (chunk, vector) in batch.iter().zip(vectors) {
                if vector.len() != expected {
                    return Err(IndexError::DimensionMismatch {
                        expected,
                        actual: vector.len(),
                    });
                }
                points.push(VectorPoint {
                    id: point_id(chunk),
                    vector,
                    payload: chunk_payload(chunk),
                });
            }
            store.upsert(&collection, points).await?;
            tracing::debug!(batch = batch_no, size = batch.len(), "upserted batch");
        }
        store.flush().await?;

        tracing::info!(
            %collection,
            chunks = chunks.len(),
            dim = dim.unwrap_or_default(),
            embedder = embedder.name(),
            "index built"
        );
        Ok(Self {
            store,
            embedder,
            collection,
        })
    }

    /// Wrap an already populated collection.
    #[must_use]
    pub fn open(collection: impl Into<String>, store: Arc<dyn VectorStore>, embedder: E) -> Self {
        Self {
            store,
            embedder,
            collection: collection.into(),
        }
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Up to `k` chunks most similar to `text`, best first.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding the query or searching fails.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let vector = self.embedder.embed(text).await?;
        let hits = self
            .store
            .search(&self.collection, vector, k as u64)
            .await?;
        tracing::debug!(k, hits = hits.len(), "similarity search");
        Ok(hits.into_iter().map(scored_chunk).collect())
    }
}

fn point_id(chunk: &Chunk) -> String {
    let digest = blake3::hash(chunk.content.as_bytes());
    let name = format!(
        "{}\0{}\0{}",
        chunk.metadata.source,
        chunk.chunk_index,
        digest.to_hex()
    );
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

fn chunk_payload(chunk: &Chunk) -> HashMap<String, serde_json::Value> {
    let mut metadata = chunk.metadata.to_json();
    if let Some(map) = metadata.as_object_mut() {
        map.insert("chunk_index".into(), chunk.chunk_index.into());
    }
    HashMap::from([
        (CONTENT_KEY.to_owned(), chunk.content.clone().into()),
        (METADATA_KEY.to_owned(), metadata),
    ])
}

fn scored_chunk(point: ScoredVectorPoint) -> ScoredChunk {
    let mut payload = point.payload;
    let content = match payload.remove(CONTENT_KEY) {
        Some(serde_json::Value::String(s)) => s,
        _ => String::new(),
    };
    let mut fields = match payload.remove(METADATA_KEY) {
        Some(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };

    let mut take_str = |key: &str| match fields.remove(key) {
        Some(serde_json::Value::String(s)) => s,
        _ => String::new(),
    };
    let source = take_str("source");
    let content_type = take_str("content_type");
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let chunk_index = fields
        .remove("chunk_index")
        .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f as u64)))
        .unwrap_or_default() as usize;
    let extra: BTreeMap<String, String> = fields
        .into_iter()
        .map(|(k, v)| match v {
            serde_json::Value::String(s) => (k, s),
            other => (k, other.to_string()),
        })
        .collect();

    ScoredChunk {
        chunk: Chunk {
            content,
            metadata: DocumentMetadata {
                source,
                content_type,
                extra,
            },
            chunk_index,
        },
        score: point.score,
    }
}

/// Render search results with score, metadata and content.
#[must_use]
pub fn format_results(results: &[ScoredChunk]) -> String {
    let mut out = String::from("\n--- Retrieved Documents ---\n\n");
    for r in results {
        let _ = writeln!(out, "Score: {:.4}", r.score);
        let _ = writeln!(out, "Metadata: {}", r.chunk.metadata.to_json());
        let _ = writeln!(out, "{}", "-".repeat(100));
        let _ = writeln!(out, "Content:\n{}\n", r.chunk.content);
    }
    out.push_str("--- End of Results ---\n");
    out
}

pub fn print_results(results: &[ScoredChunk]) {
    println!("{}", format_results(results));
}

/// Join retrieved chunk contents into a prompt context block.
#[must_use]
pub fn join_context(results: &[ScoredChunk]) -> String {
    results
        .iter()
        .map(|r| r.chunk.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
