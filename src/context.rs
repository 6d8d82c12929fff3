//! Process-scoped state built once on first use.

use std::sync::Arc;

use ragline_core::config::RaglineConfig;
use ragline_core::error::Result;
use ragline_core::throttle::Throttle;
use ragline_core::traits::{EmbeddingBackend, Translator, VectorStore};
use ragline_core::types::DistanceMetric;
use ragline_knowledge::{Indexer, MirrorPipeline, RagService, Retriever};
use ragline_providers::EmbedOptions;
use ragline_store::CollectionManager;
use tokio::sync::OnceCell;

pub struct AppContext {
    config: RaglineConfig,
    backend: OnceCell<Arc<dyn EmbeddingBackend>>,
    store: OnceCell<Arc<dyn VectorStore>>,
}

impl AppContext {
    pub fn new(config: RaglineConfig) -> Self {
        Self {
            config,
            backend: OnceCell::new(),
            store: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &RaglineConfig {
        &self.config
    }

    pub async fn backend(&self) -> Result<Arc<dyn EmbeddingBackend>> {
        self.backend
            .get_or_try_init(|| async {
                ragline_providers::create_embedder(&self.config)
                    .await
                    .map(Arc::from)
            })
            .await
            .cloned()
    }

    pub async fn store(&self) -> Result<Arc<dyn VectorStore>> {
        self.store
            .get_or_try_init(|| ragline_store::create_store(&self.config))
            .await
            .cloned()
    }

    pub async fn manager(&self) -> Result<Arc<CollectionManager>> {
        Ok(Arc::new(CollectionManager::new(
            self.store().await?,
            self.config.reindex.batch_size,
        )))
    }

    pub fn metric(&self) -> Result<DistanceMetric> {
        self.config.vector_store.distance.parse()
    }

    pub async fn indexer(&self) -> Result<Indexer> {
        let options = EmbedOptions::from_config(&self.config.embedding, self.config.reindex.embed_interval_ms);
        Ok(Indexer::new(self.backend().await?, self.manager().await?, self.metric()?)
            .with_embed_options(options))
    }

    pub async fn retriever(&self) -> Result<Retriever> {
        Ok(Retriever::new(self.backend().await?, self.store().await?)
            .with_max_query_chars(self.config.retrieval.max_query_chars)
            .with_normalize(self.config.embedding.normalize))
    }

    /// Mirroring requires a multilingual embedding model; this is checked
    /// before any backend or translator is built.
    pub async fn mirror(&self) -> Result<MirrorPipeline> {
        ragline_providers::require_multilingual(&self.config.embedding)?;
        let translator: Arc<dyn Translator> = Arc::from(ragline_providers::create_translator(&self.config)?);
        Ok(MirrorPipeline::new(translator, self.indexer().await?)
            .with_throttle(Throttle::from_millis(self.config.translation.min_interval_ms)))
    }

    pub async fn service(&self) -> Result<RagService> {
        Ok(RagService::new(self.retriever().await?, &self.config.vector_store.collection)
            .with_default_k(self.config.retrieval.top_k)
            .with_normalize(self.config.embedding.normalize)
            .with_api_key_configured(self.api_key_configured()))
    }

    /// Whether the selected embedding backend has the credential it needs.
    pub fn api_key_configured(&self) -> bool {
        match self.config.embedding.backend.as_str() {
            "cohere" => !self.config.embedding.resolved_api_key().is_empty(),
            _ => true,
        }
    }
}
