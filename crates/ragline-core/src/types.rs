//! Data model shared across the pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RaglineError, Result};

/// Arbitrary chunk/collection metadata (JSON object).
pub type Metadata = serde_json::Map<String, Value>;

/// Ordered, fixed-length embedding vector.
pub type Embedding = Vec<f32>;

pub const LANGUAGE_KEY: &str = "language";
pub const SOURCE_TITLE_KEY: &str = "sourceTitle";
pub const SOURCE_URL_KEY: &str = "sourceUrl";
/// Set on translated chunks, points back to the source chunk id.
pub const TRANSLATED_FROM_KEY: &str = "translatedFrom";

/// Collection metadata keys written by `CollectionSpec`.
pub const SPACE_KEY: &str = "hnsw:space";
pub const EMBEDDING_KEY: &str = "ragline:embedding";
pub const DIMENSION_KEY: &str = "ragline:dimension";

/// A unit of source content, independently embeddable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Chunk {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            metadata: Metadata::new(),
        }
    }

    /// Builder-style metadata setter.
    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn language(&self) -> Option<&str> {
        self.metadata.get(LANGUAGE_KEY).and_then(Value::as_str)
    }

    pub fn source_title(&self) -> Option<&str> {
        self.metadata.get(SOURCE_TITLE_KEY).and_then(Value::as_str)
    }
}

/// What an embedding is for. Some backends produce different vectors per intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedIntent {
    /// Content that will be stored in a collection.
    #[serde(alias = "search_document")]
    Document,
    /// A search query embedded at retrieval time.
    #[serde(alias = "search_query")]
    Query,
}

impl EmbedIntent {
    /// Cohere `input_type` value.
    pub fn input_type(&self) -> &'static str {
        match self {
            EmbedIntent::Document => "search_document",
            EmbedIntent::Query => "search_query",
        }
    }
}

impl std::fmt::Display for EmbedIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmbedIntent::Document => write!(f, "document"),
            EmbedIntent::Query => write!(f, "query"),
        }
    }
}

/// Collection distance function. Smaller distance = more similar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    L2,
    Ip,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::L2 => "l2",
            DistanceMetric::Ip => "ip",
        }
    }

    /// Distance between two equal-length vectors, using the same
    /// definitions as the hosted store (cosine: `1 - cos`, l2: squared
    /// euclidean, ip: `1 - dot`).
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        match self {
            DistanceMetric::Cosine => {
                let na = l2_norm(a);
                let nb = l2_norm(b);
                if na == 0.0 || nb == 0.0 {
                    1.0
                } else {
                    1.0 - dot / (na * nb)
                }
            }
            DistanceMetric::L2 => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
            DistanceMetric::Ip => 1.0 - dot,
        }
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = RaglineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "l2" | "euclidean" => Ok(DistanceMetric::L2),
            "ip" | "inner_product" | "dot" => Ok(DistanceMetric::Ip),
            other => Err(RaglineError::Validation(format!("unknown distance metric '{other}'"))),
        }
    }
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale `v` to unit L2 norm in place. Zero vectors are left untouched.
pub fn normalize_l2(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Column-oriented upsert payload, mirroring the vector store wire shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpsertBatch {
    pub ids: Vec<String>,
    pub documents: Vec<String>,
    pub metadatas: Vec<Metadata>,
    pub embeddings: Vec<Embedding>,
}

impl UpsertBatch {
    /// Build from chunks and their vectors (same order).
    pub fn from_chunks(chunks: &[Chunk], embeddings: &[Embedding]) -> Result<Self> {
        if chunks.len() != embeddings.len() {
            return Err(RaglineError::Validation(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }
        Ok(Self {
            ids: chunks.iter().map(|c| c.id.clone()).collect(),
            documents: chunks.iter().map(|c| c.content.clone()).collect(),
            metadatas: chunks.iter().map(|c| c.metadata.clone()).collect(),
            embeddings: embeddings.to_vec(),
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// All four columns must have equal length.
    pub fn check_lengths(&self) -> Result<()> {
        let n = self.ids.len();
        if self.documents.len() != n || self.metadatas.len() != n || self.embeddings.len() != n {
            return Err(RaglineError::Validation(format!(
                "upsert columns differ in length: ids={}, documents={}, metadatas={}, embeddings={}",
                n,
                self.documents.len(),
                self.metadatas.len(),
                self.embeddings.len()
            )));
        }
        Ok(())
    }
}

/// One nearest-neighbour result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub document: String,
    pub metadata: Metadata,
    pub distance: f32,
}

/// A record read back from a collection (peek/get).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: String,
    #[serde(default)]
    pub document: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,
}

/// Equality filter over record metadata. All pairs must match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    equals: Vec<(String, Value)>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn language(lang: &str) -> Self {
        Self::new().eq(LANGUAGE_KEY, lang)
    }

    pub fn eq(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.equals.push((key.to_string(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.equals.is_empty()
    }

    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.equals
            .iter()
            .all(|(k, v)| metadata.get(k).is_some_and(|m| m == v))
    }

    /// Chroma `where` clause: `{k: v}` for one pair, `{"$and": [...]}` for several.
    pub fn to_where(&self) -> Value {
        let clauses: Vec<Value> = self
            .equals
            .iter()
            .map(|(k, v)| {
                let mut m = Metadata::new();
                m.insert(k.clone(), v.clone());
                Value::Object(m)
            })
            .collect();
        match clauses.len() {
            0 => Value::Object(Metadata::new()),
            1 => clauses.into_iter().next().unwrap_or_default(),
            _ => serde_json::json!({ "$and": clauses }),
        }
    }
}

/// A collection as reported by the vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub metadata: Metadata,
    /// Dimension reported by the store (set after the first insert).
    #[serde(default)]
    pub dimension: Option<usize>,
}

impl CollectionInfo {
    /// Distance metric recorded at creation (store default is l2).
    pub fn metric(&self) -> DistanceMetric {
        self.metadata
            .get(SPACE_KEY)
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or(DistanceMetric::L2)
    }

    /// Identifier of the embedding backend that populated this collection.
    pub fn embedding_backend(&self) -> Option<&str> {
        self.metadata.get(EMBEDDING_KEY).and_then(Value::as_str)
    }

    /// Established dimension: recorded at creation, else reported by the store.
    pub fn established_dimension(&self) -> Option<usize> {
        self.metadata
            .get(DIMENSION_KEY)
            .and_then(Value::as_u64)
            .map(|d| d as usize)
            .or(self.dimension)
    }
}

/// Desired configuration of a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSpec {
    pub metric: DistanceMetric,
    /// Backend identifier (`backend/model`).
    pub embedding: Option<String>,
    pub dimension: Option<usize>,
}

impl CollectionSpec {
    pub fn new(metric: DistanceMetric) -> Self {
        Self {
            metric,
            embedding: None,
            dimension: None,
        }
    }

    pub fn for_backend(metric: DistanceMetric, identifier: &str, dimension: usize) -> Self {
        Self {
            metric,
            embedding: Some(identifier.to_string()),
            dimension: Some(dimension),
        }
    }

    pub fn to_metadata(&self) -> Metadata {
        let mut m = Metadata::new();
        m.insert(SPACE_KEY.into(), Value::from(self.metric.as_str()));
        if let Some(e) = &self.embedding {
            m.insert(EMBEDDING_KEY.into(), Value::from(e.as_str()));
        }
        if let Some(d) = self.dimension {
            m.insert(DIMENSION_KEY.into(), Value::from(d as u64));
        }
        m
    }

    /// Describe how `info` differs from this spec, if it does.
    pub fn conflict_with(&self, info: &CollectionInfo) -> Option<String> {
        if info.metric() != self.metric {
            return Some(format!(
                "distance metric is '{}', requested '{}'",
                info.metric(),
                self.metric
            ));
        }
        if let (Some(want), Some(have)) = (&self.embedding, info.embedding_backend())
            && want != have
        {
            return Some(format!("embedding backend is '{have}', requested '{want}'"));
        }
        if let (Some(want), Some(have)) = (self.dimension, info.established_dimension())
            && want != have
        {
            return Some(format!("dimension is {have}, requested {want}"));
        }
        None
    }
}

/// Health snapshot of an embedding backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendHealth {
    pub healthy: bool,
    pub identifier: String,
    pub dimension: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
