//! File-backed vector store for single-process use.
//!
//! Each collection lives in `<storage_path>/collection/<name>.json` and is
//! held fully in memory. Search is exact cosine similarity; HNSW parameters
//! are recorded with the collection so a later migration to Qdrant can reuse
//! them.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use serde::{Deserialize, Serialize};

use crate::in_memory_store::CollectionData;
use crate::vector_store::{
    BoxFuture, HnswParams, ScoredVectorPoint, VectorPoint, VectorStore, VectorStoreError,
};

const COLLECTION_DIR: &str = "collection";

#[derive(Serialize, Deserialize)]
struct CollectionFile {
    name: String,
    distance: String,
    #[serde(flatten)]
    data: CollectionData,
}

pub struct LocalVectorStore {
    dir: PathBuf,
    collections: RwLock<HashMap<String, CollectionData>>,
    dirty: Mutex<HashSet<String>>,
}

impl std::fmt::Debug for LocalVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalVectorStore")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

impl LocalVectorStore {
    /// Open (or create) a store under `storage_path`, loading every persisted
    /// collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or a collection
    /// file is unreadable.
    pub fn open(storage_path: &Path) -> Result<Self, VectorStoreError> {
        let dir = storage_path.join(COLLECTION_DIR);
        std::fs::create_dir_all(&dir).map_err(|e| {
            VectorStoreError::Connection(format!("cannot create {}: {e}", dir.display()))
        })?;

        let mut collections = HashMap::new();
        let entries = std::fs::read_dir(&dir).map_err(|e| {
            VectorStoreError::Connection(format!("cannot read {}: {e}", dir.display()))
        })?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let file = read_collection(&path)?;
            tracing::debug!(
                collection = %file.name,
                points = file.data.points.len(),
                "loaded local collection"
            );
            collections.insert(file.name, file.data);
        }

        Ok(Self {
            dir,
            collections: RwLock::new(collections),
            dirty: Mutex::new(HashSet::new()),
        })
    }

    fn collection_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    fn mark_dirty(&self, name: &str) {
        if let Ok(mut dirty) = self.dirty.lock() {
            dirty.insert(name.to_owned());
        }
    }
}

fn read_collection(path: &Path) -> Result<CollectionFile, VectorStoreError> {
    let raw = std::fs::read(path).map_err(|e| {
        VectorStoreError::Connection(format!("cannot read {}: {e}", path.display()))
    })?;
    let mut file: CollectionFile = serde_json::from_slice(&raw).map_err(|e| {
        VectorStoreError::Serialization(format!("corrupt collection {}: {e}", path.display()))
    })?;
    file.data.reindex();
    Ok(file)
}

fn validate_name(name: &str) -> Result<(), VectorStoreError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !name.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(VectorStoreError::Collection(format!(
            "invalid collection name: {name:?}"
        )))
    }
}

impl VectorStore for LocalVectorStore {
    fn ensure_collection(
        &self,
        collection: &str,
        vector_size: u64,
        hnsw: HnswParams,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            validate_name(&collection)?;
            let created = {
                let mut cols = self
                    .collections
                    .write()
                    .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
                if cols.contains_key(&collection) {
                    false
                } else {
                    cols.insert(collection.clone(), CollectionData::new(vector_size, hnsw));
                    true
                }
            };
            if created {
                tracing::info!(
                    %collection,
                    vector_size,
                    m = hnsw.m,
                    ef_construct = hnsw.ef_construct,
                    "created local collection"
                );
                self.mark_dirty(&collection);
            }
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
            {
                let mut cols = self
                    .collections
                    .write()
                    .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
                cols.remove(&collection);
            }
            if let Ok(mut dirty) = self.dirty.lock() {
                dirty.remove(&collection);
            }
            match tokio::fs::remove_file(self.collection_path(&collection)).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(VectorStoreError::Collection(format!(
                    "cannot remove collection {collection}: {e}"
                ))),
            }
        })
    }

    fn upsert(
        &self,
        collection: &str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        let collection = collection.to_owned();
        Box::pin(async move {
            {
                let mut cols = self
                    .collections
                    .write()
                    .map_err(|e| VectorStoreError::Upsert(e.to_string()))?;
                let col = cols.get_mut(&collection).ok_or_else(|| {
                    VectorStoreError::Upsert(format!("collection {collection} not found"))
                })?;
                col.upsert(points)?;
            }
            self.mark_dirty(&collection);
            Ok(())
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

    fn flush(&self) -> BoxFuture<'_, Result<(), VectorStoreError>> {
        Box::pin(async move {
            let names: Vec<String> = match self.dirty.lock() {
                Ok(dirty) => dirty.iter().cloned().collect(),
                Err(e) => return Err(VectorStoreError::Collection(e.to_string())),
            };
            for name in names {
                if let Ok(mut dirty) = self.dirty.lock() {
                    dirty.remove(&name);
                }
                if let Err(e) = self.persist(&name).await {
                    self.mark_dirty(&name);
                    return Err(e);
                }
            }
            Ok(())
        })
    }
}

impl LocalVectorStore {
    async fn persist(&self, name: &str) -> Result<(), VectorStoreError> {
        let bytes = {
            let cols = self
                .collections
                .read()
                .map_err(|e| VectorStoreError::Collection(e.to_string()))?;
            let Some(data) = cols.get(name) else {
                return Ok(());
            };
            let file = CollectionFile {
                name: name.to_owned(),
                distance: "cosine".to_owned(),
                data: data.clone(),
            };
            serde_json::to_vec(&file).map_err(|e| VectorStoreError::Serialization(e.to_string()))?
        };
        let path = self.collection_path(name);
        let tmp = path.with_extension("json.tmp");
        let persist_err = |e: std::io::Error| {
            VectorStoreError::Upsert(format!("cannot persist {}: {e}", path.display()))
        };
        tokio::fs::write(&tmp, &bytes).await.map_err(persist_err)?;
        tokio::fs::rename(&tmp, &path).await.map_err(persist_err)?;
        tracing::debug!(collection = %name, bytes = bytes.len(), "persisted collection");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(id: &str, vector: Vec<f32>, content: &str) -> VectorPoint {
        VectorPoint {
            id: id.to_owned(),
            vector,
            payload: HashMap::from([("page_content".to_owned(), serde_json::json!(content))]),
        }
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = LocalVectorStore::open(dir.path()).unwrap();
            store
                .ensure_collection("codebase", 2, HnswParams::default())
                .await
                .unwrap();
            store
                .upsert(
                    "codebase",
                    vec![
                        point("a", vec![1.0, 0.0], "alpha"),
                        point("b", vec![0.0, 1.0], "beta"),
                    ],
                )
                .await
                .unwrap();
            store.flush().await.unwrap();
        }
        assert!(dir.path().join("collection/codebase.json").is_file());

        let reopened = LocalVectorStore::open(dir.path()).unwrap();
        assert!(reopened.collection_exists("codebase").await.unwrap());
        let results = reopened.search("codebase", vec![0.0, 1.0], 1).await.unwrap();
        assert_eq!(results[0].id, "b");
        assert_eq!(results[0].payload["page_content"], "beta");
    }

    #[tokio::test]
    async fn reopened_collection_replaces_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalVectorStore::open(dir.path()).unwrap();
        store
            .ensure_collection("c", 2, HnswParams::default())
            .await
            .unwrap();
        store
            .upsert("c", vec![point("a", vec![1.0, 0.0], "v1")])
            .await
            .unwrap();
        store.flush().await.unwrap();

        let reopened = LocalVectorStore::open(dir.path()).unwrap();
        reopened
            .upsert("c", vec![point("a", vec![1.0, 0.0], "v2")])
            .await
            .unwrap();
        let results = reopened.search("c", vec![1.0, 0.0], 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].payload["page_content"], "v2");
    }

    #[tokio::test]
    async fn hnsw_params_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalVectorStore::open(dir.path()).unwrap();
        let hnsw = HnswParams {
            m: 32,
            ef_construct: 100,
        };
        store.ensure_collection("c", 4, hnsw).await.unwrap();
        store.flush().await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join("collection/c.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["hnsw"]["m"], 32);
        assert_eq!(json["hnsw"]["ef_construct"], 100);
        assert_eq!(json["distance"], "cosine");
        assert_eq!(json["vector_size"], 4);
    }

    #[tokio::test]
    async fn delete_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalVectorStore::open(dir.path()).unwrap();
        store
            .ensure_collection("c", 2, HnswParams::default())
            .await
            .unwrap();
        store.flush().await.unwrap();
        store.delete_collection("c").await.unwrap();
        assert!(!dir.path().join("collection/c.json").exists());
        assert!(!store.collection_exists("c").await.unwrap());
    }

    #[tokio::test]
    async fn unflushed_writes_are_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalVectorStore::open(dir.path()).unwrap();
        store
            .ensure_collection("c", 2, HnswParams::default())
            .await
            .unwrap();
        drop(store);
        let reopened = LocalVectorStore::open(dir.path()).unwrap();
        assert!(!reopened.collection_exists("c").await.unwrap());
    }

    #[tokio::test]
    async fn failed_flush_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalVectorStore::open(dir.path()).unwrap();
        store
            .ensure_collection("c", 2, HnswParams::default())
            .await
            .unwrap();
        store
            .upsert("c", vec![point("a", vec![1.0, 0.0], "alpha")])
            .await
            .unwrap();

        // a directory in place of the temp file makes the write fail
        let blocker = dir.path().join("collection/c.json.tmp");
        std::fs::create_dir_all(&blocker).unwrap();
        assert!(matches!(
            store.flush().await,
            Err(VectorStoreError::Upsert(_))
        ));
        assert!(!dir.path().join("collection/c.json").exists());

        std::fs::remove_dir(&blocker).unwrap();
        store.flush().await.unwrap();
        let reopened = LocalVectorStore::open(dir.path()).unwrap();
        let results = reopened.search("c", vec![1.0, 0.0], 1).await.unwrap();
        assert_eq!(results[0].id, "a");
    }

    #[tokio::test]
    async fn path_like_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalVectorStore::open(dir.path()).unwrap();
        let err = store
            .ensure_collection("../escape", 2, HnswParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::Collection(_)));
    }

    #[test]
    fn corrupt_file_is_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(COLLECTION_DIR)).unwrap();
        std::fs::write(dir.path().join("collection/bad.json"), "{not json").unwrap();
        let err = LocalVectorStore::open(dir.path()).unwrap_err();
        assert!(matches!(err, VectorStoreError::Serialization(_)));
    }
}
