//! In-process vector store with brute-force nearest-neighbour search.
//!
//! Behaves like the hosted store for everything the pipeline relies on:
//! name uniqueness, upsert-by-id keeping first insertion position, metric
//! recorded in `hnsw:space` (l2 when absent), dimension fixed by the first
//! insert. Used for offline runs and tests.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use ragline_core::error::{RaglineError, Result};
use ragline_core::traits::VectorStore;
use ragline_core::types::{
    CollectionInfo, Embedding, Metadata, MetadataFilter, SearchHit, StoredRecord, UpsertBatch,
};

struct Record {
    id: String,
    document: String,
    metadata: Metadata,
    embedding: Embedding,
}

struct MemCollection {
    info: CollectionInfo,
    records: Vec<Record>,
    /// id → position in `records`.
    index: HashMap<String, usize>,
}

#[derive(Default)]
pub struct InMemoryVectorStore {
    /// Keyed by collection id; names are unique across values.
    collections: RwLock<HashMap<String, MemCollection>>,
    next_id: AtomicU64,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, MemCollection>>> {
        self.collections
            .read()
            .map_err(|_| RaglineError::fatal("memory", "store lock poisoned"))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, MemCollection>>> {
        self.collections
            .write()
            .map_err(|_| RaglineError::fatal("memory", "store lock poisoned"))
    }
}

fn find_by_name<'a>(
    map: &'a HashMap<String, MemCollection>,
    name: &str,
) -> Option<&'a MemCollection> {
    map.values().find(|c| c.info.name == name)
}

fn id_for_name(map: &HashMap<String, MemCollection>, name: &str) -> Option<String> {
    find_by_name(map, name).map(|c| c.info.id.clone())
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let map = self.read()?;
        let mut infos: Vec<CollectionInfo> = map.values().map(|c| c.info.clone()).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    async fn get_collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let map = self.read()?;
        Ok(find_by_name(&map, name).map(|c| c.info.clone()))
    }

    async fn create_collection(&self, name: &str, metadata: &Metadata) -> Result<CollectionInfo> {
        let mut map = self.write()?;
        if find_by_name(&map, name).is_some() {
            return Err(RaglineError::CollectionConflict {
                name: name.to_string(),
                message: "collection already exists".into(),
            });
        }
        let id = format!("mem-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let info = CollectionInfo {
            id: id.clone(),
            name: name.to_string(),
            metadata: metadata.clone(),
            dimension: None,
        };
        map.insert(
            id,
            MemCollection {
                info: info.clone(),
                records: Vec::new(),
                index: HashMap::new(),
            },
        );
        Ok(info)
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut map = self.write()?;
        let id = id_for_name(&map, name)
            .ok_or_else(|| RaglineError::CollectionNotFound(name.to_string()))?;
        map.remove(&id);
        Ok(())
    }

    async fn rename_collection(&self, name: &str, new_name: &str) -> Result<()> {
        let mut map = self.write()?;
        if find_by_name(&map, new_name).is_some() {
            return Err(RaglineError::CollectionConflict {
                name: new_name.to_string(),
                message: "rename target already exists".into(),
            });
        }
        let id = id_for_name(&map, name)
            .ok_or_else(|| RaglineError::CollectionNotFound(name.to_string()))?;
        if let Some(c) = map.get_mut(&id) {
            c.info.name = new_name.to_string();
        }
        Ok(())
    }

    async fn upsert(&self, collection: &CollectionInfo, batch: &UpsertBatch) -> Result<()> {
        batch.check_lengths()?;
        let mut map = self.write()?;
        let c = map
            .get_mut(&collection.id)
            .ok_or_else(|| RaglineError::CollectionNotFound(collection.name.clone()))?;

        for i in 0..batch.len() {
            let record = Record {
                id: batch.ids[i].clone(),
                document: batch.documents[i].clone(),
                metadata: batch.metadatas[i].clone(),
                embedding: batch.embeddings[i].clone(),
            };
            if c.info.dimension.is_none() {
                c.info.dimension = Some(record.embedding.len());
            }
            match c.index.get(&record.id) {
                Some(&pos) => c.records[pos] = record,
                None => {
                    c.index.insert(record.id.clone(), c.records.len());
                    c.records.push(record);
                }
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &CollectionInfo,
        embedding: &[f32],
        n_results: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>> {
        let map = self.read()?;
        let c = map
            .get(&collection.id)
            .ok_or_else(|| RaglineError::CollectionNotFound(collection.name.clone()))?;
        if let Some(dim) = c.info.dimension
            && dim != embedding.len()
        {
            return Err(RaglineError::Validation(format!(
                "query embedding has dimension {}, collection '{}' has {dim}",
                embedding.len(),
                c.info.name
            )));
        }

        let metric = c.info.metric();
        let mut hits: Vec<SearchHit> = c
            .records
            .iter()
            .filter(|r| filter.is_none_or(|f| f.matches(&r.metadata)))
            .map(|r| SearchHit {
                id: r.id.clone(),
                document: r.document.clone(),
                metadata: r.metadata.clone(),
                distance: metric.distance(embedding, &r.embedding),
            })
            .collect();
        // stable: ties keep insertion order
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(n_results);
        Ok(hits)
    }

    async fn peek(&self, collection: &CollectionInfo, limit: usize) -> Result<Vec<StoredRecord>> {
        let map = self.read()?;
        let c = map
            .get(&collection.id)
            .ok_or_else(|| RaglineError::CollectionNotFound(collection.name.clone()))?;
        Ok(c.records
            .iter()
            .take(limit)
            .map(|r| StoredRecord {
                id: r.id.clone(),
                document: Some(r.document.clone()),
                metadata: r.metadata.clone(),
                embedding: Some(r.embedding.clone()),
            })
            .collect())
    }

    async fn count(&self, collection: &CollectionInfo) -> Result<usize> {
        let map = self.read()?;
        map.get(&collection.id)
            .map(|c| c.records.len())
            .ok_or_else(|| RaglineError::CollectionNotFound(collection.name.clone()))
    }
}
