//! Remote embedding backend for the Cohere `/embed` API.
//!
//! Documents and queries are embedded with different `input_type`s; vectors
//! from one intent must not be compared with stored vectors of the other
//! model. Transient failures (429, 5xx, timeouts) are retried with backoff.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ragline_core::config::EmbeddingConfig;
use ragline_core::error::{RaglineError, Result};
use ragline_core::retry::RetryPolicy;
use ragline_core::traits::EmbeddingBackend;
use ragline_core::traits::embedder::{finish_vectors, validate_texts};
use ragline_core::types::{EmbedIntent, Embedding};
use serde::{Deserialize, Serialize};

use crate::registry::{self, AuthStyle};

/// How the provider handles texts longer than the model's context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Truncate {
    /// Reject over-long input.
    None,
    Start,
    #[default]
    End,
}

impl Truncate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Truncate::None => "NONE",
            Truncate::Start => "START",
            Truncate::End => "END",
        }
    }
}

impl std::str::FromStr for Truncate {
    type Err = RaglineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NONE" => Ok(Truncate::None),
            "START" => Ok(Truncate::Start),
            "END" | "" => Ok(Truncate::End),
            other => Err(RaglineError::Config(format!("unknown truncate policy '{other}'"))),
        }
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [String],
    model: &'a str,
    input_type: &'a str,
    truncate: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Embedding>,
}

pub struct CohereEmbedder {
    /// `cohere/<model>`.
    identifier: String,
    model: String,
    api_key: String,
    url: String,
    auth_style: AuthStyle,
    /// 0 until learned from the first response (models missing from the registry).
    dimension: AtomicUsize,
    max_batch: usize,
    truncate: Truncate,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl CohereEmbedder {
    /// Build from config. A missing API key is a `Config` error.
    pub fn new(config: &EmbeddingConfig, retry: RetryPolicy) -> Result<Self> {
        let provider = registry::get_embedding_provider("cohere")
            .ok_or_else(|| RaglineError::Config("cohere provider missing from registry".into()))?;

        let api_key = config.resolved_api_key();
        if api_key.is_empty() {
            return Err(RaglineError::Config(
                "COHERE_API_KEY is not set (embedding.api_key)".into(),
            ));
        }

        let known = provider.model(&config.model);
        let dimension = known.map(|m| m.dimension).or(config.dimension).unwrap_or(0);
        let ceiling = known.map(|m| m.max_batch).unwrap_or(provider.default_max_batch);
        let max_batch = config.batch_size.map_or(ceiling, |b| b.clamp(1, ceiling));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| RaglineError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            identifier: format!("cohere/{}", config.model),
            model: config.model.clone(),
            api_key,
            url: format!(
                "{}{}",
                provider.resolve_base_url(&config.endpoint),
                provider.embed_path
            ),
            auth_style: provider.auth_style,
            dimension: AtomicUsize::new(dimension),
            max_batch,
            truncate: config.truncate.parse()?,
            retry,
            client,
        })
    }

    /// Whether the dimension is still unknown.
    pub fn needs_dimension(&self) -> bool {
        self.dimension.load(Ordering::Relaxed) == 0
    }

    /// Embed one short text to learn the dimension of an unregistered model.
    pub async fn discover_dimension(&self) -> Result<usize> {
        if !self.needs_dimension() {
            return Ok(self.dimension());
        }
        tracing::info!("🔎 Probing embedding dimension of {}", self.identifier);
        self.embed_batch(&["dimension check".to_string()], EmbedIntent::Query, false)
            .await?;
        Ok(self.dimension())
    }

    async fn request(&self, texts: &[String], intent: EmbedIntent) -> Result<Vec<Embedding>> {
        let body = EmbedRequest {
            texts,
            model: &self.model,
            input_type: intent.input_type(),
            truncate: self.truncate.as_str(),
        };
        let mut req = self.client.post(&self.url).json(&body);
        if self.auth_style == AuthStyle::Bearer {
            req = req.bearer_auth(&self.api_key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| RaglineError::from_http("cohere", &e))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(RaglineError::from_status("cohere", status.as_u16(), &text));
        }

        let parsed: EmbedResponse = resp
            .json()
            .await
            .map_err(|e| RaglineError::fatal("cohere", format!("malformed embed response: {e}")))?;
        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl EmbeddingBackend for CohereEmbedder {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn dimension(&self) -> usize {
        self.dimension.load(Ordering::Relaxed)
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
        tracing::debug!("cohere embed: {} texts ({intent})", texts.len());

        let vectors = self
            .retry
            .run("cohere embed", |_| self.request(texts, intent))
            .await?;

        if let Some(first) = vectors.first()
            && self
                .dimension
                .compare_exchange(0, first.len(), Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
        {
            tracing::info!("📐 {} dimension learned: {}", self.identifier, first.len());
        }
        finish_vectors("cohere", texts.len(), self.dimension(), vectors, normalize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Json, State};
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Router;
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder {
        bodies: Arc<Mutex<Vec<Value>>>,
        /// Respond 429 this many times before succeeding.
        throttled: Arc<Mutex<u32>>,
    }

    async fn embed(State(rec): State<Recorder>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        rec.bodies.lock().unwrap().push(body.clone());
        {
            let mut left = rec.throttled.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return (StatusCode::TOO_MANY_REQUESTS, Json(json!({"message": "slow down"})));
            }
        }
        let n = body["texts"].as_array().map(|t| t.len()).unwrap_or(0);
        let offset = if body["input_type"] == "search_query" { 1.0 } else { 0.0 };
        let embeddings: Vec<Vec<f32>> = (0..n).map(|i| vec![3.0, 4.0 + offset, i as f32]).collect();
        (StatusCode::OK, Json(json!({"id": "x", "embeddings": embeddings})))
    }

    async fn spawn(rec: Recorder) -> String {
        let app = Router::new().route("/embed", post(embed)).with_state(rec);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    fn config(endpoint: &str, model: &str) -> EmbeddingConfig {
        EmbeddingConfig {
            api_key: "test-key".into(),
            endpoint: endpoint.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_truncate_parse() {
        assert_eq!("end".parse::<Truncate>().unwrap(), Truncate::End);
        assert_eq!("NONE".parse::<Truncate>().unwrap(), Truncate::None);
        assert!("middle".parse::<Truncate>().is_err());
    }

    #[test]
    fn test_registry_dimension_and_batch_clamp() {
        let mut cfg = config("http://127.0.0.1:1", "embed-multilingual-v2.0");
        cfg.batch_size = Some(500);
        let embedder = CohereEmbedder::new(&cfg, RetryPolicy::none()).unwrap();
        assert_eq!(embedder.dimension(), 768);
        assert_eq!(embedder.max_batch_size(), 96);
        assert_eq!(embedder.identifier(), "cohere/embed-multilingual-v2.0");
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let mut cfg = config("http://127.0.0.1:1", "embed-english-v3.0");
        cfg.api_key.clear();
        // env may carry a real key on developer machines
        if cfg.resolved_api_key().is_empty() {
            assert!(matches!(
                CohereEmbedder::new(&cfg, RetryPolicy::none()),
                Err(RaglineError::Config(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_embed_sends_intent_and_truncate() {
        let rec = Recorder::default();
        let url = spawn(rec.clone()).await;
        let mut cfg = config(&url, "custom-model");
        cfg.dimension = Some(3);
        let embedder = CohereEmbedder::new(&cfg, RetryPolicy::none()).unwrap();

        let docs = embedder
            .embed_batch(&texts(&["a", "b"]), EmbedIntent::Document, false)
            .await
            .unwrap();
        let query = embedder
            .embed_batch(&texts(&["a"]), EmbedIntent::Query, false)
            .await
            .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1], vec![3.0, 4.0, 1.0]);
        // same text, different intent, different vector
        assert_ne!(docs[0], query[0]);

        let bodies = rec.bodies.lock().unwrap();
        assert_eq!(bodies[0]["input_type"], "search_document");
        assert_eq!(bodies[0]["truncate"], "END");
        assert_eq!(bodies[0]["model"], "custom-model");
        assert_eq!(bodies[1]["input_type"], "search_query");
    }

    #[tokio::test]
    async fn test_normalize_and_dimension_learning() {
        let url = spawn(Recorder::default()).await;
        let embedder = CohereEmbedder::new(&config(&url, "custom-model"), RetryPolicy::none()).unwrap();
        assert!(embedder.needs_dimension());
        assert_eq!(embedder.discover_dimension().await.unwrap(), 3);

        let out = embedder
            .embed_batch(&texts(&["x"]), EmbedIntent::Document, true)
            .await
            .unwrap();
        let norm: f32 = out[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let rec = Recorder::default();
        *rec.throttled.lock().unwrap() = 2;
        let url = spawn(rec.clone()).await;
        let embedder =
            CohereEmbedder::new(&config(&url, "custom-model"), RetryPolicy::immediate(3)).unwrap();
        let out = embedder
            .embed_batch(&texts(&["x"]), EmbedIntent::Document, false)
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(rec.bodies.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_rate_limit_exhaustion_is_fatal() {
        let rec = Recorder::default();
        *rec.throttled.lock().unwrap() = 10;
        let url = spawn(rec).await;
        let embedder =
            CohereEmbedder::new(&config(&url, "custom-model"), RetryPolicy::immediate(2)).unwrap();
        let err = embedder
            .embed_batch(&texts(&["x"]), EmbedIntent::Document, false)
            .await
            .unwrap_err();
        assert!(matches!(err, RaglineError::FatalService { .. }));
    }

    #[tokio::test]
    async fn test_validation_before_network() {
        // unroutable endpoint: any request would fail as transient, not validation
        let embedder =
            CohereEmbedder::new(&config("http://127.0.0.1:1", "embed-english-v3.0"), RetryPolicy::none())
                .unwrap();
        let err = embedder
            .embed_batch(&texts(&["ok", ""]), EmbedIntent::Document, true)
            .await
            .unwrap_err();
        assert!(matches!(err, RaglineError::Validation(_)));

        let too_many: Vec<String> = (0..97).map(|i| format!("t{i}")).collect();
        assert!(matches!(
            embedder.embed_batch(&too_many, EmbedIntent::Document, true).await,
            Err(RaglineError::Validation(_))
        ));
    }
}
