use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::vector_store::{
    BoxFuture, HnswParams, ScoredVectorPoint, VectorPoint, VectorStore, VectorStoreError,
    cosine_similarity, rank,
};

/// Points of one collection in insertion order; re-upserting an id replaces
/// it in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CollectionData {
    pub vector_size: u64,
    pub hnsw: HnswParams,
    pub points: Vec<VectorPoint>,
    #[serde(skip)]
    positions: HashMap<String, usize>,
}

impl CollectionData {
    pub fn new(vector_size: u64, hnsw: HnswParams) -> Self {
        Self {
            vector_size,
            hnsw,
            points: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// Rebuild the id index after deserialization.
    pub fn reindex(&mut self) {
        self.positions = self
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id.clone(), i))
            .collect();
    }

    fn check_dim(&self, len: usize) -> bool {
        u64::try_from(len).is_ok_and(|len| len == self.vector_size)
    }

    pub fn upsert(&mut self, points: Vec<VectorPoint>) -> Result<(), VectorStoreError> {
        for p in points {
            if !self.check_dim(p.vector.len()) {
                return Err(VectorStoreError::Upsert(format!(
                    "point {} has dimension {}, collection expects {}",
                    p.id,
                    p.vector.len(),
                    self.vector_size
                )));
            }
            if let Some(&i) = self.positions.get(&p.id) {
                self.points[i] = p;
            } else {
                self.positions.insert(p.id.clone(), self.points.len());
                self.points.push(p);
            }
        }
        Ok(())
    }

    pub fn search(
        &self,
        vector: &[f32],
        limit: u64,
    ) -> Result<Vec<ScoredVectorPoint>, VectorStoreError> {
        if !self.check_dim(vector.len()) {
            return Err(VectorStoreError::Search(format!(
                "query has dimension {}, collection expects {}",
                vector.len(),
                self.vector_size
            )));
        }
        let scored = self
            .points
            .iter()
            .map(|p| ScoredVectorPoint {
                id: p.id.clone(),
                score: cosine_similarity(vector, &p.vector),
                payload: p.payload.clone(),
            })
            .collect();
        Ok(rank(scored, limit))
    }
}

/// Volatile exact-search store.
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, CollectionData>>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Number of points in `collection`, `None` if it does not exist.
    #[must_use]
    pub fn point_count(&self, collection: &str) -> Option<usize> {
        self.collections
            .read()
            .ok()?
            .get(collection)
            .map(|c| c.points.len())
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorStore")
            .finish_non_exhaustive()
    }
}

impl VectorStore for InMemoryVectorStore {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
        hnsw: HnswParams,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            cols.entry(collection)
                .or_insert_with(|| CollectionData::new(vector_size, hnsw));
            Ok(())
        })
    }

    fn collection_exists(&self, collection: &str) -> BoxFuture<'_, Result<bool, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            Ok(cols.contains_key(&collection))
        })
    }

    fn delete_collection(&self, collection: &str) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            cols.remove(&collection);
            Ok(())
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
            let col = cols.get_mut(&collection).ok_or_else(|| {
                VectorStoreError::Upsert(format!("collection {collection} not found"))
            })?;
            col.upsert(points)
        })
    }

    fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        limit: u64,
    ) -> BoxFuture<'_, Result<Vec<ScoredVectorPoint>, VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Search(e.to_string()))?;
            let col = cols.get(&collection).ok_or_else(|| {
                VectorStoreError::Search(format!("collection {collection} not found"))
            })?;
            col.search(&vector, limit)
        })
    }
}
