//! Chroma HTTP client (v2 API).
//!
//! All collection routes live under
//! `/api/v2/tenants/{tenant}/databases/{database}/collections`. Requests carry
//! the `x-chroma-token` header; an empty tenant is resolved from the key via
//! `/api/v2/auth/identity`. Transient failures are retried with backoff.

use std::time::Duration;

use async_trait::async_trait;
use ragline_core::config::VectorStoreConfig;
use ragline_core::error::{RaglineError, Result};
use ragline_core::retry::RetryPolicy;
use ragline_core::traits::VectorStore;
use ragline_core::types::{
    CollectionInfo, Embedding, Metadata, MetadataFilter, SearchHit, StoredRecord, UpsertBatch,
};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};

const SERVICE: &str = "chroma";
const TOKEN_HEADER: &str = "x-chroma-token";

pub struct ChromaStore {
    endpoint: String,
    api_key: String,
    tenant: String,
    database: String,
    retry: RetryPolicy,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct Identity {
    #[serde(default)]
    tenant: Option<String>,
    #[serde(default)]
    databases: Vec<String>,
}

#[derive(Deserialize)]
struct QueryResponse {
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<Metadata>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<Option<f32>>>>,
}

#[derive(Deserialize)]
struct GetResponse {
    ids: Vec<String>,
    #[serde(default)]
    documents: Option<Vec<Option<String>>>,
    #[serde(default)]
    metadatas: Option<Vec<Option<Metadata>>>,
    #[serde(default)]
    embeddings: Option<Vec<Option<Embedding>>>,
}

impl ChromaStore {
    /// Build the client and resolve the tenant when not configured.
    pub async fn connect(config: &VectorStoreConfig, retry: RetryPolicy) -> Result<Self> {
        let api_key = config.resolved_api_key();
        if config.requires_api_key() && api_key.is_empty() {
            return Err(RaglineError::Config(
                "CHROMADB_API_KEY is not set (vector_store.api_key)".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| RaglineError::Config(format!("failed to build HTTP client: {e}")))?;

        let mut store = Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key,
            tenant: config.resolved_tenant(),
            database: config.resolved_database(),
            retry,
            client,
        };

        if store.tenant.is_empty() {
            let url = format!("{}/api/v2/auth/identity", store.endpoint);
            let identity: Identity = serde_json::from_value(store.call(Method::GET, &url, None, "").await?)?;
            store.tenant = identity.tenant.unwrap_or_else(|| "default_tenant".into());
            if !identity.databases.is_empty() && !identity.databases.contains(&store.database) {
                tracing::warn!(
                    "⚠️ Database '{}' not among databases visible to this key: {:?}",
                    store.database,
                    identity.databases
                );
            }
        }
        tracing::info!(
            "🗄️ Chroma at {} (tenant '{}', database '{}')",
            store.endpoint,
            store.tenant,
            store.database
        );
        Ok(store)
    }

    fn collections_url(&self) -> String {
        format!(
            "{}/api/v2/tenants/{}/databases/{}/collections",
            self.endpoint, self.tenant, self.database
        )
    }

    fn collection_url(&self, id: &str, action: &str) -> String {
        format!("{}/{id}{action}", self.collections_url())
    }

    /// One request with retry. 404 maps to `CollectionNotFound(subject)`,
    /// 409 to `CollectionConflict`. An empty response body yields `Null`.
    async fn call(&self, method: Method, url: &str, body: Option<&Value>, subject: &str) -> Result<Value> {
        let op = format!("chroma {method} {}", url.rsplit('/').next().unwrap_or(url));
        self.retry
            .run(&op, move |_| {
                let method = method.clone();
                async move {
                    let mut req = self.client.request(method, url);
                    if !self.api_key.is_empty() {
                        req = req.header(TOKEN_HEADER, &self.api_key);
                    }
                    if let Some(body) = body {
                        req = req.json(body);
                    }
                    let resp = req.send().await.map_err(|e| RaglineError::from_http(SERVICE, &e))?;
                    let status = resp.status().as_u16();
                    let text = resp.text().await.map_err(|e| RaglineError::from_http(SERVICE, &e))?;
                    match status {
                        200..=299 if text.trim().is_empty() => Ok(Value::Null),
                        200..=299 => serde_json::from_str(&text).map_err(|e| {
                            RaglineError::fatal(SERVICE, format!("malformed response: {e}"))
                        }),
                        404 => Err(RaglineError::CollectionNotFound(subject.to_string())),
                        409 => Err(RaglineError::CollectionConflict {
                            name: subject.to_string(),
                            message: "collection already exists".into(),
                        }),
                        _ => Err(RaglineError::from_status(SERVICE, status, &text)),
                    }
                }
            })
            .await
    }
}

/// Chroma accepts only string, number and boolean metadata values.
/// Nulls are dropped; arrays and objects are stored as JSON text.
pub fn sanitize_metadata(metadata: &Metadata) -> Metadata {
    metadata
        .iter()
        .filter_map(|(k, v)| match v {
            Value::Null => None,
            Value::Array(_) | Value::Object(_) => Some((k.clone(), Value::String(v.to_string()))),
            scalar => Some((k.clone(), scalar.clone())),
        })
        .collect()
}

fn parse_collection(value: Value) -> Result<CollectionInfo> {
    #[derive(Deserialize)]
    struct Raw {
        id: String,
        name: String,
        #[serde(default)]
        metadata: Option<Metadata>,
        #[serde(default)]
        dimension: Option<usize>,
    }
    let raw: Raw = serde_json::from_value(value)?;
    Ok(CollectionInfo {
        id: raw.id,
        name: raw.name,
        metadata: raw.metadata.unwrap_or_default(),
        dimension: raw.dimension,
    })
}

#[async_trait]
impl VectorStore for ChromaStore {
    fn name(&self) -> &str {
        SERVICE
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let value = self.call(Method::GET, &self.collections_url(), None, "").await?;
        match value {
            Value::Array(items) => items.into_iter().map(parse_collection).collect(),
            Value::Null => Ok(Vec::new()),
            other => Err(RaglineError::fatal(SERVICE, format!("unexpected collection list: {other}"))),
        }
    }

    async fn get_collection(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let url = self.collection_url(name, "");
        match self.call(Method::GET, &url, None, name).await {
            Ok(value) => parse_collection(value).map(Some),
            Err(RaglineError::CollectionNotFound(_)) => Ok(None),
            // some server versions answer 400 "collection does not exist"
            Err(RaglineError::Validation(msg)) if msg.contains("does not exist") => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_collection(&self, name: &str, metadata: &Metadata) -> Result<CollectionInfo> {
        let metadata = sanitize_metadata(metadata);
        let metadata = if metadata.is_empty() {
            Value::Null
        } else {
            Value::Object(metadata)
        };
        let body = json!({
            "name": name,
            "metadata": metadata,
            "get_or_create": false,
        });
        let value = self
            .call(Method::POST, &self.collections_url(), Some(&body), name)
            .await?;
        parse_collection(value)
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let url = self.collection_url(name, "");
        match self.call(Method::DELETE, &url, None, name).await {
            Err(RaglineError::Validation(msg)) if msg.contains("does not exist") => {
                Err(RaglineError::CollectionNotFound(name.to_string()))
            }
            other => other.map(|_| ()),
        }
    }

    async fn rename_collection(&self, name: &str, new_name: &str) -> Result<()> {
        let info = self
            .get_collection(name)
            .await?
            .ok_or_else(|| RaglineError::CollectionNotFound(name.to_string()))?;
        let url = self.collection_url(&info.id, "");
        self.call(Method::PUT, &url, Some(&json!({ "new_name": new_name })), new_name)
            .await?;
        Ok(())
    }

    async fn upsert(&self, collection: &CollectionInfo, batch: &UpsertBatch) -> Result<()> {
        batch.check_lengths()?;
        let metadatas: Vec<Value> = batch
            .metadatas
            .iter()
            .map(|m| {
                let m = sanitize_metadata(m);
                if m.is_empty() { Value::Null } else { Value::Object(m) }
            })
            .collect();
        let body = json!({
            "ids": batch.ids,
            "embeddings": batch.embeddings,
            "documents": batch.documents,
            "metadatas": metadatas,
        });
        let url = self.collection_url(&collection.id, "/upsert");
        self.call(Method::POST, &url, Some(&body), &collection.name).await?;
        Ok(())
    }

    async fn query(
        &self,
        collection: &CollectionInfo,
        embedding: &[f32],
        n_results: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>> {
        let mut body = json!({
            "query_embeddings": [embedding],
            "n_results": n_results,
            "include": ["documents", "metadatas", "distances"],
        });
        if let Some(f) = filter
            && !f.is_empty()
        {
            body["where"] = f.to_where();
        }
        let url = self.collection_url(&collection.id, "/query");
        let value = self.call(Method::POST, &url, Some(&body), &collection.name).await?;
        let resp: QueryResponse = serde_json::from_value(value)?;

        let ids = resp.ids.into_iter().next().unwrap_or_default();
        let mut documents = resp.documents.and_then(|d| d.into_iter().next()).unwrap_or_default();
        let mut metadatas = resp.metadatas.and_then(|m| m.into_iter().next()).unwrap_or_default();
        let mut distances = resp.distances.and_then(|d| d.into_iter().next()).unwrap_or_default();
        documents.resize(ids.len(), None);
        metadatas.resize(ids.len(), None);
        distances.resize(ids.len(), None);

        let mut hits: Vec<SearchHit> = ids
            .into_iter()
            .zip(documents)
            .zip(metadatas)
            .zip(distances)
            .map(|(((id, document), metadata), distance)| SearchHit {
                id,
                document: document.unwrap_or_default(),
                metadata: metadata.unwrap_or_default(),
                distance: distance.unwrap_or(f32::INFINITY),
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(hits)
    }

    async fn peek(&self, collection: &CollectionInfo, limit: usize) -> Result<Vec<StoredRecord>> {
        let body = json!({
            "limit": limit,
            "include": ["documents", "metadatas", "embeddings"],
        });
        let url = self.collection_url(&collection.id, "/get");
        let value = self.call(Method::POST, &url, Some(&body), &collection.name).await?;
        let resp: GetResponse = serde_json::from_value(value)?;

        let mut documents = resp.documents.unwrap_or_default();
        let mut metadatas = resp.metadatas.unwrap_or_default();
        let mut embeddings = resp.embeddings.unwrap_or_default();
        documents.resize(resp.ids.len(), None);
        metadatas.resize(resp.ids.len(), None);
        embeddings.resize(resp.ids.len(), None);

        Ok(resp
            .ids
            .into_iter()
            .zip(documents)
            .zip(metadatas)
            .zip(embeddings)
            .map(|(((id, document), metadata), embedding)| StoredRecord {
                id,
                document,
                metadata: metadata.unwrap_or_default(),
                embedding,
            })
            .collect())
    }

    async fn count(&self, collection: &CollectionInfo) -> Result<usize> {
        let url = self.collection_url(&collection.id, "/count");
        let value = self.call(Method::GET, &url, None, &collection.name).await?;
        value
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| RaglineError::fatal(SERVICE, format!("unexpected count response: {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Json, Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::Router;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Minimal Chroma v2 stand-in: collections by name, records appended.
    #[derive(Clone, Default)]
    struct Fake {
        collections: Arc<Mutex<HashMap<String, Value>>>,
        upserts: Arc<Mutex<Vec<Value>>>,
        tokens: Arc<Mutex<Vec<String>>>,
        /// Fail this many upserts with 503 before accepting.
        unavailable: Arc<Mutex<u32>>,
    }

    type Reply = (StatusCode, Json<Value>);

    fn record_token(fake: &Fake, headers: &HeaderMap) {
        if let Some(t) = headers.get("x-chroma-token").and_then(|v| v.to_str().ok()) {
            fake.tokens.lock().unwrap().push(t.to_string());
        }
    }

    async fn identity() -> Json<Value> {
        Json(json!({"user_id": "u", "tenant": "tenant-123", "databases": ["HarliBot"]}))
    }

    async fn list(State(fake): State<Fake>) -> Json<Value> {
        Json(Value::Array(fake.collections.lock().unwrap().values().cloned().collect()))
    }

    async fn create(
        State(fake): State<Fake>,
        Path((tenant, _db)): Path<(String, String)>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Reply {
        record_token(&fake, &headers);
        assert_eq!(tenant, "tenant-123");
        let name = body["name"].as_str().unwrap_or("").to_string();
        let mut cols = fake.collections.lock().unwrap();
        if cols.contains_key(&name) {
            return (StatusCode::CONFLICT, Json(json!({"error": "UniqueConstraintError"})));
        }
        let col = json!({"id": format!("id-{name}"), "name": name, "metadata": body["metadata"], "dimension": null});
        cols.insert(name, col.clone());
        (StatusCode::OK, Json(col))
    }

    async fn get_one(State(fake): State<Fake>, Path((_t, _d, name)): Path<(String, String, String)>) -> Reply {
        match fake.collections.lock().unwrap().get(&name) {
            Some(c) => (StatusCode::OK, Json(c.clone())),
            None => (StatusCode::NOT_FOUND, Json(json!({"error": "NotFoundError"}))),
        }
    }

    async fn delete_one(State(fake): State<Fake>, Path((_t, _d, name)): Path<(String, String, String)>) -> Reply {
        match fake.collections.lock().unwrap().remove(&name) {
            Some(_) => (StatusCode::OK, Json(json!({}))),
            None => (StatusCode::NOT_FOUND, Json(json!({"error": "NotFoundError"}))),
        }
    }

    async fn upsert(
        State(fake): State<Fake>,
        Path((_t, _d, _id)): Path<(String, String, String)>,
        Json(body): Json<Value>,
    ) -> Reply {
        {
            let mut left = fake.unavailable.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": "busy"})));
            }
        }
        fake.upserts.lock().unwrap().push(body);
        (StatusCode::OK, Json(json!({})))
    }

    async fn query(Json(body): Json<Value>) -> Json<Value> {
        assert_eq!(body["where"], json!({"language": "es"}));
        assert_eq!(body["n_results"], 2);
        Json(json!({
            "ids": [["b", "a"]],
            "documents": [["doc b", "doc a"]],
            "metadatas": [[{"language": "es"}, null]],
            "distances": [[0.4, 0.1]],
        }))
    }

    async fn count() -> Json<Value> {
        Json(json!(3))
    }

    async fn spawn(fake: Fake) -> String {
        let base = "/api/v2/tenants/{tenant}/databases/{db}/collections";
        let app = Router::new()
            .route("/api/v2/auth/identity", get(identity))
            .route(base, get(list).post(create))
            .route(&format!("{base}/{{name}}"), get(get_one).delete(delete_one))
            .route(&format!("{base}/{{name}}/upsert"), post(upsert))
            .route(&format!("{base}/{{name}}/query"), post(query))
            .route(&format!("{base}/{{name}}/count"), get(count))
            .with_state(fake);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    async fn store(url: &str, retry: RetryPolicy) -> ChromaStore {
        let config = VectorStoreConfig {
            endpoint: url.into(),
            api_key: "ck-test".into(),
            tenant: String::new(),
            ..Default::default()
        };
        ChromaStore::connect(&config, retry).await.unwrap()
    }

    #[test]
    fn test_sanitize_metadata() {
        let raw: Metadata = serde_json::from_value(json!({
            "language": "en", "wordCount": 12, "ok": true, "missing": null, "tags": ["a", "b"]
        }))
        .unwrap();
        let clean = sanitize_metadata(&raw);
        assert_eq!(clean["language"], "en");
        assert_eq!(clean["wordCount"], 12);
        assert!(!clean.contains_key("missing"));
        assert_eq!(clean["tags"], "[\"a\",\"b\"]");
    }

    #[tokio::test]
    async fn test_tenant_resolution_and_crud() {
        let fake = Fake::default();
        let url = spawn(fake.clone()).await;
        if std::env::var("CHROMADB_TENANT").is_ok() || std::env::var("CHROMA_TENANT").is_ok() {
            return;
        }
        let store = store(&url, RetryPolicy::none()).await;
        assert_eq!(store.tenant, "tenant-123");

        let mut meta = Metadata::new();
        meta.insert("hnsw:space".into(), json!("cosine"));
        let info = store.create_collection("docs", &meta).await.unwrap();
        assert_eq!(info.id, "id-docs");
        assert!(matches!(
            store.create_collection("docs", &meta).await,
            Err(RaglineError::CollectionConflict { .. })
        ));

        let got = store.get_collection("docs").await.unwrap().unwrap();
        assert_eq!(got.metadata["hnsw:space"], "cosine");
        assert!(store.get_collection("nope").await.unwrap().is_none());
        assert_eq!(store.list_collections().await.unwrap().len(), 1);

        store.delete_collection("docs").await.unwrap();
        assert!(matches!(
            store.delete_collection("docs").await,
            Err(RaglineError::CollectionNotFound(_))
        ));
        assert!(fake.tokens.lock().unwrap().iter().all(|t| t == "ck-test"));
    }

    #[tokio::test]
    async fn test_upsert_retries_unavailable() {
        let fake = Fake::default();
        *fake.unavailable.lock().unwrap() = 1;
        let url = spawn(fake.clone()).await;
        let store = store(&url, RetryPolicy::immediate(3)).await;
        let info = CollectionInfo {
            id: "id-docs".into(),
            name: "docs".into(),
            metadata: Metadata::new(),
            dimension: None,
        };
        let mut m = Metadata::new();
        m.insert("language".into(), json!("en"));
        m.insert("empty".into(), Value::Null);
        let batch = UpsertBatch {
            ids: vec!["a".into()],
            documents: vec!["doc".into()],
            metadatas: vec![m],
            embeddings: vec![vec![0.5, 0.5]],
        };
        store.upsert(&info, &batch).await.unwrap();

        let upserts = fake.upserts.lock().unwrap();
        assert_eq!(upserts.len(), 1);
        assert_eq!(upserts[0]["metadatas"][0], json!({"language": "en"}));
        assert_eq!(upserts[0]["embeddings"][0], json!([0.5, 0.5]));
    }

    #[tokio::test]
    async fn test_query_sorted_with_filter() {
        let url = spawn(Fake::default()).await;
        let store = store(&url, RetryPolicy::none()).await;
        let info = CollectionInfo {
            id: "id-docs".into(),
            name: "docs".into(),
            metadata: Metadata::new(),
            dimension: Some(2),
        };
        let hits = store
            .query(&info, &[1.0, 0.0], 2, Some(&MetadataFilter::language("es")))
            .await
            .unwrap();
        assert_eq!(hits[0].id, "a");
        assert_eq!(hits[1].id, "b");
        assert!(hits[0].metadata.is_empty());
        assert_eq!(store.count(&info).await.unwrap(), 3);
    }
}
