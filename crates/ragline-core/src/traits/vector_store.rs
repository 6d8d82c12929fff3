//! Vector store boundary (external managed service or in-process stand-in).

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{CollectionInfo, Metadata, MetadataFilter, SearchHit, StoredRecord, UpsertBatch};

/// Collection CRUD and data operations, one collection per call.
///
/// Implementations do not enforce dimension consistency; that is the
/// collection manager's job.
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn name(&self) -> &str;

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>>;

    /// `Ok(None)` when no collection has that name.
    async fn get_collection(&self, name: &str) -> Result<Option<CollectionInfo>>;

    /// Fails with `CollectionConflict` when the name is taken.
    async fn create_collection(&self, name: &str, metadata: &Metadata) -> Result<CollectionInfo>;

    /// Fails with `CollectionNotFound` when absent.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    async fn rename_collection(&self, name: &str, new_name: &str) -> Result<()>;

    /// Insert or overwrite records by id.
    async fn upsert(&self, collection: &CollectionInfo, batch: &UpsertBatch) -> Result<()>;

    /// Up to `n_results` records closest to `embedding`, ascending distance.
    async fn query(
        &self,
        collection: &CollectionInfo,
        embedding: &[f32],
        n_results: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>>;

    /// First `limit` records in insertion order, embeddings included.
    async fn peek(&self, collection: &CollectionInfo, limit: usize) -> Result<Vec<StoredRecord>>;

    async fn count(&self, collection: &CollectionInfo) -> Result<usize>;
}
