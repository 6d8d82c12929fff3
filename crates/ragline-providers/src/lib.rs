//! # Ragline Providers
//!
//! Embedding backends and translation providers.
//!
//! Remote embedding: Cohere (`cohere`) and a self-hosted sentence-transformers
//! service (`service`). Local embedding: static token vectors (`local`) and
//! deterministic feature hashing (`hashing`). Translation goes through any
//! OpenAI-compatible chat API listed in the registry.

pub mod batching;
pub mod cohere;
pub mod hashing;
pub mod local;
pub mod registry;
pub mod service;
pub mod translate;

use ragline_core::config::{EmbeddingConfig, RaglineConfig};
use ragline_core::error::{RaglineError, Result};
use ragline_core::retry::RetryPolicy;
use ragline_core::traits::{EmbeddingBackend, Translator};

pub use batching::{EmbedOptions, embed_all};

/// Create the configured embedding backend.
///
/// Remote backends whose dimension is not known up front embed one sample
/// text here, so `dimension()` is fixed before the backend is handed out.
pub async fn create_embedder(config: &RaglineConfig) -> Result<Box<dyn EmbeddingBackend>> {
    let retry = RetryPolicy::from_config(&config.retry);
    create_embedder_with(&config.embedding, retry).await
}

pub async fn create_embedder_with(
    config: &EmbeddingConfig,
    retry: RetryPolicy,
) -> Result<Box<dyn EmbeddingBackend>> {
    let backend: Box<dyn EmbeddingBackend> = match config.backend.as_str() {
        "cohere" => {
            let embedder = cohere::CohereEmbedder::new(config, retry)?;
            if embedder.needs_dimension() {
                embedder.discover_dimension().await?;
            }
            Box::new(embedder)
        }
        "service" => Box::new(service::ServiceEmbedder::connect(config, retry).await?),
        "local" => Box::new(local::LocalEmbedder::load(config).await?),
        "hashing" => Box::new(hashing::HashingEmbedder::new(config.dimension.unwrap_or(0))?),
        other => {
            return Err(RaglineError::Config(format!(
                "unknown embedding backend '{other}' (expected one of: {})",
                available_backends().join(", ")
            )));
        }
    };
    tracing::info!(
        "🔌 Embedding backend: {} ({} dims, batches of ≤{})",
        backend.identifier(),
        backend.dimension(),
        backend.max_batch_size()
    );
    Ok(backend)
}

/// Fail when the configured embedding model is known to be English-only.
///
/// Mirrored content is embedded alongside the source language, so the model
/// must place both languages in one space. Models missing from the registry
/// (local files, hashing, unlisted remote models) pass with a warning.
pub fn require_multilingual(config: &EmbeddingConfig) -> Result<()> {
    let known = registry::get_embedding_provider(&config.backend).and_then(|p| p.model(&config.model));
    match known {
        Some(model) if !model.multilingual => Err(RaglineError::Config(format!(
            "embedding model '{}' is English-only; mirroring needs a multilingual model (e.g. embed-multilingual-v3.0)",
            model.id
        ))),
        Some(_) => Ok(()),
        None => {
            tracing::warn!(
                "⚠️ Cannot confirm that {} model '{}' is multilingual",
                config.backend,
                config.model
            );
            Ok(())
        }
    }
}

/// Create the configured translator.
///
/// `translation.provider` is a registry name or `custom:<base url>`.
pub fn create_translator(config: &RaglineConfig) -> Result<Box<dyn Translator>> {
    let retry = RetryPolicy::from_config(&config.retry);
    let provider = config.translation.provider.as_str();
    if provider.starts_with("custom:") {
        return Ok(Box::new(translate::ChatTranslator::custom(
            provider,
            &config.translation,
            retry,
        )?));
    }
    let registry = registry::get_chat_provider(provider).ok_or_else(|| {
        RaglineError::Config(format!(
            "unknown translation provider '{provider}' (known: {})",
            registry::all_chat_provider_names().join(", ")
        ))
    })?;
    Ok(Box::new(translate::ChatTranslator::from_registry(
        registry,
        &config.translation,
        retry,
    )?))
}

/// List all embedding backend names.
pub fn available_backends() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = registry::all_embedding_providers()
        .iter()
        .map(|p| p.name)
        .collect();
    names.push("local");
    names.push("hashing");
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_hashing_embedder() {
        let mut config = RaglineConfig::default();
        config.embedding.backend = "hashing".into();
        config.embedding.dimension = Some(16);
        let backend = create_embedder(&config).await.unwrap();
        assert_eq!(backend.dimension(), 16);
        assert_eq!(backend.identifier(), "hashing/sha256-16");
    }

    #[tokio::test]
    async fn test_unknown_backend() {
        let mut config = RaglineConfig::default();
        config.embedding.backend = "word2vec".into();
        let err = create_embedder(&config).await.err().unwrap();
        assert!(matches!(err, RaglineError::Config(_)));
        assert!(err.to_string().contains("hashing"));
    }

    #[test]
    fn test_create_translator() {
        let mut config = RaglineConfig::default();
        config.translation.provider = "ollama".into();
        assert_eq!(create_translator(&config).unwrap().name(), "ollama");

        config.translation.provider = "custom:http://127.0.0.1:9/v1".into();
        assert_eq!(create_translator(&config).unwrap().name(), "custom");

        config.translation.provider = "babelfish".into();
        assert!(matches!(create_translator(&config), Err(RaglineError::Config(_))));
    }

    #[test]
    fn test_require_multilingual() {
        let mut config = EmbeddingConfig {
            backend: "cohere".into(),
            model: "embed-english-v3.0".into(),
            ..Default::default()
        };
        assert!(matches!(require_multilingual(&config), Err(RaglineError::Config(_))));

        config.model = "embed-multilingual-v3.0".into();
        assert!(require_multilingual(&config).is_ok());

        config.backend = "service".into();
        config.model = "all-MiniLM-L6-v2".into();
        assert!(require_multilingual(&config).is_err());

        config.backend = "hashing".into();
        assert!(require_multilingual(&config).is_ok());
    }

    #[test]
    fn test_available_backends() {
        assert_eq!(available_backends(), vec!["cohere", "service", "local", "hashing"]);
    }
}
