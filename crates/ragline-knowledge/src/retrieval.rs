//! Query-time nearest-neighbour retrieval.

use std::sync::Arc;

use ragline_core::error::{RaglineError, Result};
use ragline_core::traits::{EmbeddingBackend, VectorStore};
use ragline_core::types::{EmbedIntent, MetadataFilter, SearchHit};

pub struct Retriever {
    backend: Arc<dyn EmbeddingBackend>,
    store: Arc<dyn VectorStore>,
    max_query_chars: usize,
    normalize: bool,
}

impl Retriever {
    pub fn new(backend: Arc<dyn EmbeddingBackend>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            backend,
            store,
            max_query_chars: 500,
            normalize: true,
        }
    }

    pub fn with_max_query_chars(mut self, max: usize) -> Self {
        self.max_query_chars = max;
        self
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn backend(&self) -> &Arc<dyn EmbeddingBackend> {
        &self.backend
    }

    /// Up to `k` records of `collection` closest to `query`, ascending distance.
    ///
    /// The collection must have been populated by this retriever's backend;
    /// anything else is refused with `BackendMismatch`. A `k` larger than the
    /// collection simply returns everything that matches.
    pub async fn search(
        &self,
        collection: &str,
        query: &str,
        k: usize,
        language: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RaglineError::Validation("query must not be empty".into()));
        }
        let chars = query.chars().count();
        if chars > self.max_query_chars {
            return Err(RaglineError::Validation(format!(
                "query is {chars} characters, limit is {}",
                self.max_query_chars
            )));
        }
        if k == 0 {
            return Err(RaglineError::Validation("k must be at least 1".into()));
        }

        let info = self
            .store
            .get_collection(collection)
            .await?
            .ok_or_else(|| RaglineError::CollectionNotFound(collection.to_string()))?;
        if let Some(indexed) = info.embedding_backend()
            && indexed != self.backend.identifier()
        {
            return Err(RaglineError::BackendMismatch {
                collection: collection.to_string(),
                indexed: indexed.to_string(),
                requested: self.backend.identifier().to_string(),
            });
        }
        if let Some(dim) = info.established_dimension()
            && dim != self.backend.dimension()
        {
            return Err(RaglineError::BackendMismatch {
                collection: collection.to_string(),
                indexed: format!("{dim}-dimension vectors"),
                requested: format!("{} ({} dimensions)", self.backend.identifier(), self.backend.dimension()),
            });
        }

        let count = self.store.count(&info).await?;
        if count == 0 {
            tracing::debug!("Collection '{collection}' is empty");
            return Ok(Vec::new());
        }

        let vector = self
            .backend
            .embed_batch(&[query.to_string()], EmbedIntent::Query, self.normalize)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RaglineError::fatal(self.backend.identifier(), "no query embedding returned"))?;

        let filter = language.map(MetadataFilter::language);
        let mut hits = self
            .store
            .query(&info, &vector, k.min(count), filter.as_ref())
            .await?;
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        tracing::debug!(
            "🔎 {} hits for {chars}-char query in '{collection}'{}",
            hits.len(),
            language.map(|l| format!(" (language={l})")).unwrap_or_default()
        );
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::Indexer;
    use crate::testing::Keywords;
    use ragline_core::types::{Chunk, DistanceMetric};
    use ragline_store::memory::InMemoryVectorStore;
    use ragline_store::{CollectionManager, ReindexOptions};

    async fn indexed(chunks: &[Chunk]) -> (Arc<dyn VectorStore>, Retriever) {
        let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
        let backend: Arc<dyn EmbeddingBackend> = Arc::new(Keywords::new(4));
        let manager = Arc::new(CollectionManager::new(store.clone(), 100));
        Indexer::new(backend.clone(), manager, DistanceMetric::Cosine)
            .reindex("docs", chunks, &ReindexOptions::default())
            .await
            .unwrap();
        (store.clone(), Retriever::new(backend, store))
    }

    fn abc() -> Vec<Chunk> {
        vec![
            Chunk::new("a", "water bill payment").with_meta("language", "en"),
            Chunk::new("b", "park opening hours").with_meta("language", "en"),
            Chunk::new("c", "pago de agua").with_meta("language", "es"),
        ]
    }

    #[tokio::test]
    async fn test_reindex_then_search_top_two() {
        let (_, retriever) = indexed(&abc()).await;
        let hits = retriever.search("docs", "water bill", 2, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| ["a", "b", "c"].contains(&h.id.as_str())));
        assert!(hits[0].distance <= hits[1].distance);
        assert_eq!(hits[0].id, "a");
    }

    #[tokio::test]
    async fn test_language_filter() {
        let (_, retriever) = indexed(&abc()).await;
        let hits = retriever.search("docs", "water", 10, Some("es")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits.iter().all(|h| h.metadata["language"] == "es"));
    }

    #[tokio::test]
    async fn test_k_larger_than_collection_is_truncated() {
        let (_, retriever) = indexed(&abc()).await;
        let hits = retriever.search("docs", "water", 50, None).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[tokio::test]
    async fn test_query_validation() {
        let (_, retriever) = indexed(&abc()).await;
        let retriever = retriever.with_max_query_chars(10);
        for (query, k) in [("   ", 1), ("a very long query indeed", 1), ("water", 0)] {
            assert!(matches!(
                retriever.search("docs", query, k, None).await,
                Err(RaglineError::Validation(_))
            ));
        }
        assert!(matches!(
            retriever.search("missing", "water", 1, None).await,
            Err(RaglineError::CollectionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_backend_mismatch_refused() {
        let (store, _) = indexed(&abc()).await;
        let other = Retriever::new(Arc::new(Keywords::new(8)), store);
        let err = other.search("docs", "water", 1, None).await.unwrap_err();
        match err {
            RaglineError::BackendMismatch { indexed, requested, .. } => {
                assert_eq!(indexed, "keywords/4");
                assert_eq!(requested, "keywords/8");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_collection() {
        let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
        let manager = CollectionManager::new(store.clone(), 10);
        manager
            .create("docs", &ragline_core::types::CollectionSpec::new(DistanceMetric::Cosine))
            .await
            .unwrap();
        let retriever = Retriever::new(Arc::new(Keywords::new(4)), store);
        assert!(retriever.search("docs", "water", 3, None).await.unwrap().is_empty());
    }
}
