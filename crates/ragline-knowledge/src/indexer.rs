//! Embeds chunks with one backend and writes them through the collection manager.

use std::sync::Arc;

use ragline_core::error::Result;
use ragline_core::traits::EmbeddingBackend;
use ragline_core::types::{Chunk, CollectionSpec, DistanceMetric, EmbedIntent, Embedding};
use ragline_providers::{EmbedOptions, embed_all};
use ragline_store::{CollectionManager, ReindexOptions, ReindexReport};

use crate::vectors::VectorSet;

pub struct Indexer {
    backend: Arc<dyn EmbeddingBackend>,
    manager: Arc<CollectionManager>,
    metric: DistanceMetric,
    embed_options: EmbedOptions,
}

impl Indexer {
    pub fn new(
        backend: Arc<dyn EmbeddingBackend>,
        manager: Arc<CollectionManager>,
        metric: DistanceMetric,
    ) -> Self {
        Self {
            backend,
            manager,
            metric,
            embed_options: EmbedOptions::default(),
        }
    }

    pub fn with_embed_options(mut self, options: EmbedOptions) -> Self {
        self.embed_options = options;
        self
    }

    pub fn backend(&self) -> &Arc<dyn EmbeddingBackend> {
        &self.backend
    }

    pub fn manager(&self) -> &Arc<CollectionManager> {
        &self.manager
    }

    /// Collection configuration this indexer writes.
    pub fn spec(&self) -> CollectionSpec {
        CollectionSpec::for_backend(self.metric, self.backend.identifier(), self.backend.dimension())
    }

    pub async fn embed_documents(&self, chunks: &[Chunk]) -> Result<Vec<Embedding>> {
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        embed_all(self.backend.as_ref(), &texts, EmbedIntent::Document, &self.embed_options).await
    }

    /// Embed `chunks` as documents, tagged with this backend's identifier.
    pub async fn vectorize(&self, chunks: &[Chunk]) -> Result<VectorSet> {
        let embeddings = self.embed_documents(chunks).await?;
        VectorSet::from_embeddings(self.backend.identifier(), chunks, &embeddings)
    }

    /// Full reindex from pre-computed vectors. Chunks without a vector are
    /// skipped; vectors from another backend are refused before the
    /// collection is touched.
    pub async fn reindex_from_vectors(
        &self,
        collection: &str,
        chunks: &[Chunk],
        vectors: &VectorSet,
        options: &ReindexOptions,
    ) -> Result<ReindexReport> {
        let spec = self.spec();
        vectors.check_compatible(&spec)?;
        let aligned = vectors.align(chunks);
        if !aligned.missing.is_empty() {
            tracing::warn!(
                "⚠️ {} of {} chunks have no pre-computed vector and are skipped",
                aligned.missing.len(),
                chunks.len()
            );
        }
        self.manager
            .reindex(collection, &spec, &aligned.chunks, &aligned.embeddings, options)
            .await
    }

    /// Full reindex of `collection` from `chunks`.
    ///
    /// Every vector is computed before the collection is touched, so an
    /// embedding failure leaves the existing collection as it was.
    pub async fn reindex(
        &self,
        collection: &str,
        chunks: &[Chunk],
        options: &ReindexOptions,
    ) -> Result<ReindexReport> {
        let embeddings = self.embed_documents(chunks).await?;
        self.manager
            .reindex(collection, &self.spec(), chunks, &embeddings, options)
            .await
    }

    /// Add or overwrite `chunks` in `collection` without dropping it.
    /// The collection is created when absent and must match `spec()` otherwise.
    pub async fn upsert(&self, collection: &str, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let embeddings = self.embed_documents(chunks).await?;
        let info = self.manager.create(collection, &self.spec()).await?;
        Ok(self.manager.upsert_all(&info, chunks, &embeddings, 0).await?.upserted)
    }
}
