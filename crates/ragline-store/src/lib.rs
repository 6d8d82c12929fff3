//! # Ragline Store
//!
//! Vector store clients and the collection manager.
//!
//! - `chroma`: hosted or self-hosted Chroma over its v2 REST API
//! - `memory`: in-process store with brute-force search
//! - `manager`: dimension checks, batched upsert, verify, reindex protocols

pub mod chroma;
pub mod manager;
pub mod memory;

use std::sync::Arc;

use ragline_core::config::RaglineConfig;
use ragline_core::error::{RaglineError, Result};
use ragline_core::retry::RetryPolicy;
use ragline_core::traits::VectorStore;

pub use manager::{
    CollectionManager, ReindexOptions, ReindexReport, ReindexStrategy, UpsertSummary, VerifyReport,
};

/// Create the configured vector store.
pub async fn create_store(config: &RaglineConfig) -> Result<Arc<dyn VectorStore>> {
    let store: Arc<dyn VectorStore> = match config.vector_store.backend.as_str() {
        "chroma" => Arc::new(
            chroma::ChromaStore::connect(&config.vector_store, RetryPolicy::from_config(&config.retry))
                .await?,
        ),
        "memory" => Arc::new(memory::InMemoryVectorStore::new()),
        other => {
            return Err(RaglineError::Config(format!(
                "unknown vector store '{other}' (expected chroma or memory)"
            )));
        }
    };
    tracing::info!("🗄️ Vector store: {}", store.name());
    Ok(store)
}

/// Collection manager over the configured store, using `reindex.batch_size`.
pub async fn create_manager(config: &RaglineConfig) -> Result<CollectionManager> {
    let store = create_store(config).await?;
    Ok(CollectionManager::new(store, config.reindex.batch_size))
}
