//! Client for a self-hosted sentence-transformers embedding service.
//!
//! Contract: `POST /embed {texts, normalize}` returns
//! `{embeddings, model, dimension, count}`; `GET /health` reports the loaded
//! model and its `embedding_dimension`. The service embeds documents and
//! queries identically, so `intent` does not change the request.

use std::time::Duration;

use async_trait::async_trait;
use ragline_core::config::EmbeddingConfig;
use ragline_core::error::{RaglineError, Result};
use ragline_core::retry::RetryPolicy;
use ragline_core::traits::EmbeddingBackend;
use ragline_core::traits::embedder::{finish_vectors, validate_texts};
use ragline_core::types::{BackendHealth, EmbedIntent, Embedding};
use serde::{Deserialize, Serialize};

use crate::registry;

#[derive(Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [String],
    normalize: bool,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Embedding>,
    #[serde(default)]
    count: Option<usize>,
}

#[derive(Deserialize)]
struct HealthResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    model_name: Option<String>,
    #[serde(default)]
    embedding_dimension: Option<usize>,
}

pub struct ServiceEmbedder {
    identifier: String,
    base_url: String,
    embed_path: &'static str,
    health_path: &'static str,
    api_key: String,
    dimension: usize,
    max_batch: usize,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl ServiceEmbedder {
    /// Connect to the service and read the model and dimension from `/health`.
    ///
    /// The identifier names the model the service reports, falling back to
    /// `embedding.model` only when health omits it. The reported dimension
    /// must agree with the registry (or with `embedding.dimension` when set);
    /// disagreement is a `Config` error.
    pub async fn connect(config: &EmbeddingConfig, retry: RetryPolicy) -> Result<Self> {
        let provider = registry::get_embedding_provider("service")
            .ok_or_else(|| RaglineError::Config("service provider missing from registry".into()))?;
        let known = provider.model(&config.model);
        let ceiling = known.map(|m| m.max_batch).unwrap_or(provider.default_max_batch);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| RaglineError::Config(format!("failed to build HTTP client: {e}")))?;

        let mut embedder = Self {
            identifier: format!("service/{}", config.model),
            base_url: provider.resolve_base_url(&config.endpoint),
            embed_path: provider.embed_path,
            health_path: provider.health_path.unwrap_or("/health"),
            api_key: config.resolved_api_key(),
            dimension: 0,
            max_batch: config.batch_size.map_or(ceiling, |b| b.clamp(1, ceiling)),
            retry,
            client,
        };

        let health = embedder.fetch_health().await?;
        let reported = health.embedding_dimension.ok_or_else(|| {
            RaglineError::fatal("embedding-service", "health response has no embedding_dimension")
        })?;
        let expected = config.dimension.or(known.map(|m| m.dimension));
        if let Some(expected) = expected
            && expected != reported
        {
            return Err(RaglineError::Config(format!(
                "embedding service reports dimension {reported}, configured model expects {expected}"
            )));
        }
        let served = health
            .model_name
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| config.model.clone());
        if provider.model(&served) != known || (known.is_none() && served != config.model) {
            tracing::warn!(
                "⚠️ Embedding service serves '{served}', configured model is '{}'",
                config.model
            );
        }
        embedder.identifier = format!("service/{served}");
        embedder.dimension = reported;
        tracing::info!(
            "🧠 Embedding service at {} ready: {served} ({reported} dims)",
            embedder.base_url
        );
        Ok(embedder)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.is_empty() {
            req
        } else {
            req.bearer_auth(&self.api_key)
        }
    }

    async fn fetch_health(&self) -> Result<HealthResponse> {
        let url = format!("{}{}", self.base_url, self.health_path);
        let url = url.as_str();
        self.retry
            .run("embedding-service health", |_| async move {
                let resp = self
                    .authorize(self.client.get(url))
                    .send()
                    .await
                    .map_err(|e| RaglineError::from_http("embedding-service", &e))?;
                let status = resp.status();
                if !status.is_success() {
                    let text = resp.text().await.unwrap_or_default();
                    return Err(RaglineError::from_status("embedding-service", status.as_u16(), &text));
                }
                resp.json::<HealthResponse>().await.map_err(|e| {
                    RaglineError::fatal("embedding-service", format!("malformed health response: {e}"))
                })
            })
            .await
    }

    async fn request(&self, texts: &[String], normalize: bool) -> Result<Vec<Embedding>> {
        let url = format!("{}{}", self.base_url, self.embed_path);
        let resp = self
            .authorize(self.client.post(&url))
            .json(&EmbedRequest { texts, normalize })
            .send()
            .await
            .map_err(|e| RaglineError::from_http("embedding-service", &e))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(RaglineError::from_status("embedding-service", status.as_u16(), &text));
        }
        let parsed: EmbedResponse = resp.json().await.map_err(|e| {
            RaglineError::fatal("embedding-service", format!("malformed embed response: {e}"))
        })?;
        if let Some(count) = parsed.count
            && count != parsed.embeddings.len()
        {
            return Err(RaglineError::fatal(
                "embedding-service",
                format!("count {count} disagrees with {} embeddings", parsed.embeddings.len()),
            ));
        }
        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl EmbeddingBackend for ServiceEmbedder {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        intent: EmbedIntent,
        normalize: bool,
    ) -> Result<Vec<Embedding>> {
        validate_texts(texts, self.max_batch)?;
        tracing::debug!("embedding-service: {} texts ({intent})", texts.len());
        let vectors = self
            .retry
            .run("embedding-service embed", |_| self.request(texts, normalize))
            .await?;
        // server-side normalization is re-applied locally
        finish_vectors("embedding-service", texts.len(), self.dimension, vectors, normalize)
    }

    async fn health(&self) -> Result<BackendHealth> {
        match self.fetch_health().await {
            Ok(h) => Ok(BackendHealth {
                healthy: h.status == "healthy",
                identifier: self.identifier.clone(),
                dimension: h.embedding_dimension.unwrap_or(self.dimension),
                detail: h.model_name,
            }),
            Err(e) => Ok(BackendHealth {
                healthy: false,
                identifier: self.identifier.clone(),
                dimension: self.dimension,
                detail: Some(e.to_string()),
            }),
        }
    }
}
