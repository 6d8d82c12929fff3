//! Query-facing contract: embedding requests, retrieval requests, health.
//!
//! Wire shapes match the embedding service (`POST /embed`, `GET /health`),
//! so a ragline server can stand in for it.

use std::sync::Arc;

use ragline_core::error::{RaglineError, Result};
use ragline_core::traits::embedder::validate_texts;
use ragline_core::types::{EmbedIntent, Embedding, SearchHit};
use serde::{Deserialize, Serialize};

use crate::retrieval::Retriever;

#[derive(Debug, Clone, Deserialize)]
pub struct EmbedRequest {
    pub texts: Vec<String>,
    #[serde(default)]
    pub normalize: Option<bool>,
    /// Defaults to `query`.
    #[serde(default)]
    pub input_type: Option<EmbedIntent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedResponse {
    pub embeddings: Vec<Embedding>,
    pub model: String,
    pub dimension: usize,
    pub count: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query_text: String,
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub language_filter: Option<String>,
    /// Defaults to the configured collection.
    #[serde(default)]
    pub collection: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub count: usize,
    pub collection: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// `healthy` or `unhealthy`.
    pub status: String,
    pub model: String,
    pub model_name: String,
    pub model_loaded: bool,
    pub dimension: usize,
    pub embedding_dimension: usize,
    pub api_key_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

pub struct RagService {
    retriever: Retriever,
    collection: String,
    default_k: usize,
    normalize: bool,
    api_key_configured: bool,
}

impl RagService {
    pub fn new(retriever: Retriever, collection: &str) -> Self {
        Self {
            retriever,
            collection: collection.to_string(),
            default_k: 5,
            normalize: true,
            api_key_configured: true,
        }
    }

    pub fn with_default_k(mut self, k: usize) -> Self {
        self.default_k = k.max(1);
        self
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    /// Whether the embedding backend's credential is set (reported by `health`).
    pub fn with_api_key_configured(mut self, configured: bool) -> Self {
        self.api_key_configured = configured;
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// One backend call; more texts than the backend accepts is a validation error.
    pub async fn embed(&self, request: EmbedRequest) -> Result<EmbedResponse> {
        let backend = self.retriever.backend();
        validate_texts(&request.texts, backend.max_batch_size())?;
        let intent = request.input_type.unwrap_or(EmbedIntent::Query);
        let embeddings = backend
            .embed_batch(&request.texts, intent, request.normalize.unwrap_or(self.normalize))
            .await?;
        tracing::info!("Embedded {} texts ({intent})", embeddings.len());
        Ok(EmbedResponse {
            dimension: embeddings.first().map(Vec::len).unwrap_or(0),
            count: embeddings.len(),
            embeddings,
            model: backend.identifier().to_string(),
        })
    }

    pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        let collection = request
            .collection
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| self.collection.clone());
        let k = request.k.unwrap_or(self.default_k);
        let language = request.language_filter.as_deref().filter(|l| !l.is_empty());
        let results = self
            .retriever
            .search(&collection, &request.query_text, k, language)
            .await?;
        Ok(SearchResponse {
            count: results.len(),
            results,
            collection,
            model: self.retriever.backend().identifier().to_string(),
        })
    }

    /// Never fails; backend problems are reported as `unhealthy`.
    pub async fn health(&self) -> HealthReport {
        let backend = self.retriever.backend();
        let identifier = backend.identifier().to_string();
        let (loaded, dimension, error) = match backend.health().await {
            Ok(h) if h.healthy => (true, h.dimension, None),
            Ok(h) => (false, h.dimension, h.detail.or(Some("backend reported unhealthy".into()))),
            Err(e) => (false, backend.dimension(), Some(e.to_string())),
        };
        let error = error.or_else(|| {
            (!self.api_key_configured).then(|| "embedding API key not configured".to_string())
        });
        HealthReport {
            status: if error.is_none() { "healthy" } else { "unhealthy" }.into(),
            model: identifier.clone(),
            model_name: identifier,
            model_loaded: loaded,
            dimension,
            embedding_dimension: dimension,
            api_key_configured: self.api_key_configured,
            error,
        }
    }
}

/// HTTP status for an error surfaced through the query contract.
pub fn status_for(err: &RaglineError) -> u16 {
    match err.root_cause() {
        RaglineError::Validation(_) => 400,
        RaglineError::CollectionNotFound(_) => 404,
        RaglineError::BackendMismatch { .. } | RaglineError::CollectionConflict { .. } => 409,
        RaglineError::Transient { .. } | RaglineError::Config(_) => 503,
        RaglineError::FatalService { .. } => 502,
        _ => 500,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::Indexer;
    use crate::testing::Keywords;
    use ragline_core::traits::{EmbeddingBackend, VectorStore};
    use ragline_core::types::{Chunk, DistanceMetric};
    use ragline_store::memory::InMemoryVectorStore;
    use ragline_store::{CollectionManager, ReindexOptions};

    async fn service() -> RagService {
        let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::new());
        let backend: Arc<dyn EmbeddingBackend> = Arc::new(Keywords::new(4));
        let manager = Arc::new(CollectionManager::new(store.clone(), 100));
        let chunks = vec![
            Chunk::new("a", "water bill payment").with_meta("language", "en"),
            Chunk::new("c", "pago de agua").with_meta("language", "es"),
        ];
        Indexer::new(backend.clone(), manager, DistanceMetric::Cosine)
            .reindex("docs", &chunks, &ReindexOptions::default())
            .await
            .unwrap();
        RagService::new(Retriever::new(backend, store), "docs").with_default_k(2)
    }

    fn request(texts: &[&str]) -> EmbedRequest {
        serde_json::from_value(serde_json::json!({ "texts": texts })).unwrap()
    }

    #[tokio::test]
    async fn test_embed_contract() {
        let service = service().await;
        let response = service.embed(request(&["water", "park"])).await.unwrap();
        assert_eq!(response.count, 2);
        assert_eq!(response.dimension, 4);
        assert_eq!(response.model, "keywords/4");

        assert!(matches!(service.embed(request(&[])).await, Err(RaglineError::Validation(_))));
        let too_many = service.embed(request(&["a", "b", "c", "d"])).await.unwrap_err();
        assert_eq!(status_for(&too_many), 400);
    }

    #[tokio::test]
    async fn test_search_contract() {
        let service = service().await;
        let request: SearchRequest =
            serde_json::from_value(serde_json::json!({"query_text": "water", "language_filter": "es"})).unwrap();
        let response = service.search(request).await.unwrap();
        assert_eq!(response.collection, "docs");
        assert_eq!(response.count, 1);
        assert_eq!(response.results[0].id, "c");

        let request: SearchRequest =
            serde_json::from_value(serde_json::json!({"query_text": "water", "collection": "nope"})).unwrap();
        let err = service.search(request).await.unwrap_err();
        assert_eq!(status_for(&err), 404);
    }

    #[tokio::test]
    async fn test_health() {
        let report = service().await.health().await;
        assert!(report.is_healthy());
        assert_eq!(report.embedding_dimension, 4);

        let report = service().await.with_api_key_configured(false).health().await;
        assert_eq!(report.status, "unhealthy");
        assert!(!report.api_key_configured);
    }
}
