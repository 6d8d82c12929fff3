//! Local embedding backend: mean-pooled static token vectors.
//!
//! The model file is plain text, one `token v1 v2 ... vN` row per line, with
//! an optional word2vec-style `count dim` header. It is read once at startup;
//! a missing or malformed file is a `Config` error. Embedding runs on the
//! blocking pool with rayon across texts.
//!
//! The backend identifier names the file and a digest of its contents, so two
//! different model files never share an identifier.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use ragline_core::config::EmbeddingConfig;
use ragline_core::error::{RaglineError, Result};
use ragline_core::traits::EmbeddingBackend;
use ragline_core::traits::embedder::{finish_vectors, validate_texts};
use ragline_core::types::{EmbedIntent, Embedding};
use rayon::prelude::*;
use sha2::{Digest, Sha256};

/// Largest batch accepted per call.
pub const MAX_BATCH: usize = 100;

/// Token → vector table.
#[derive(Debug)]
pub struct StaticVectors {
    dimension: usize,
    table: HashMap<String, Vec<f32>>,
    digest: String,
}

impl StaticVectors {
    pub fn parse(content: &str) -> Result<Self> {
        let mut dimension = 0usize;
        let mut table = HashMap::new();

        for (lineno, line) in content.lines().enumerate() {
            let mut parts = line.split_whitespace();
            let Some(token) = parts.next() else { continue };
            let values: Vec<&str> = parts.collect();

            // word2vec header: "<count> <dim>"
            if lineno == 0 && values.len() == 1 && token.parse::<usize>().is_ok() {
                continue;
            }

            let vector = values
                .iter()
                .map(|v| v.parse::<f32>())
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| RaglineError::Config(format!("model line {}: {e}", lineno + 1)))?;
            if vector.is_empty() {
                return Err(RaglineError::Config(format!("model line {} has no values", lineno + 1)));
            }
            if dimension == 0 {
                dimension = vector.len();
            } else if vector.len() != dimension {
                return Err(RaglineError::Config(format!(
                    "model line {} has {} values, expected {dimension}",
                    lineno + 1,
                    vector.len()
                )));
            }
            table.insert(token.to_lowercase(), vector);
        }

        if table.is_empty() {
            return Err(RaglineError::Config("model file contains no vectors".into()));
        }
        let hash = Sha256::digest(content.as_bytes());
        let digest: String = hash.iter().take(4).map(|b| format!("{b:02x}")).collect();
        Ok(Self {
            dimension,
            table,
            digest,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RaglineError::Config(format!("cannot read local model {}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// First 8 hex digits of the SHA-256 of the model file.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Mean of known token vectors. Unknown-only text yields a zero vector.
    pub fn pool(&self, text: &str) -> Embedding {
        let mut sum = vec![0.0f32; self.dimension];
        let mut hits = 0usize;
        for token in tokenize(text) {
            if let Some(v) = self.table.get(&token) {
                sum.iter_mut().zip(v).for_each(|(s, x)| *s += x);
                hits += 1;
            }
        }
        if hits > 0 {
            let n = hits as f32;
            sum.iter_mut().for_each(|s| *s /= n);
        }
        sum
    }
}

/// Lowercased alphanumeric runs (Unicode-aware, so accented words survive).
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

pub struct LocalEmbedder {
    identifier: String,
    vectors: Arc<StaticVectors>,
    query_prefix: String,
    document_prefix: String,
    max_batch: usize,
}

impl LocalEmbedder {
    pub async fn load(config: &EmbeddingConfig) -> Result<Self> {
        let path = std::path::PathBuf::from(&config.model_path);
        if config.model_path.trim().is_empty() {
            return Err(RaglineError::Config(
                "embedding.model_path is required for the local backend".into(),
            ));
        }
        let vectors = tokio::task::spawn_blocking(move || StaticVectors::load(&path))
            .await
            .map_err(|e| RaglineError::Config(format!("model loading task failed: {e}")))??;

        if let Some(expected) = config.dimension
            && expected != vectors.dimension()
        {
            return Err(RaglineError::Config(format!(
                "local model has dimension {}, configured {expected}",
                vectors.dimension()
            )));
        }
        let stem = Path::new(&config.model_path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".into());
        let name = format!("{stem}@{}", vectors.digest());
        tracing::info!(
            "🧠 Local model {name} loaded from {}: {} tokens, {} dims",
            config.model_path,
            vectors.len(),
            vectors.dimension()
        );
        Ok(Self::from_vectors(&name, vectors, config)
            .with_max_batch(config.batch_size.unwrap_or(MAX_BATCH)))
    }

    /// Identifier is `local/<name>`.
    pub fn from_vectors(name: &str, vectors: StaticVectors, config: &EmbeddingConfig) -> Self {
        Self {
            identifier: format!("local/{name}"),
            vectors: Arc::new(vectors),
            query_prefix: config.query_prefix.clone(),
            document_prefix: config.document_prefix.clone(),
            max_batch: MAX_BATCH,
        }
    }

    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch.clamp(1, MAX_BATCH);
        self
    }

    fn prefix(&self, intent: EmbedIntent) -> &str {
        match intent {
            EmbedIntent::Query => &self.query_prefix,
            EmbedIntent::Document => &self.document_prefix,
        }
    }
}

#[async_trait]
impl EmbeddingBackend for LocalEmbedder {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn dimension(&self) -> usize {
        self.vectors.dimension()
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
        let prefix = self.prefix(intent);
        let inputs: Vec<String> = texts.iter().map(|t| format!("{prefix}{t}")).collect();
        let vectors = Arc::clone(&self.vectors);

        let pooled = tokio::task::spawn_blocking(move || {
            inputs.par_iter().map(|t| vectors.pool(t)).collect::<Vec<_>>()
        })
        .await
        .map_err(|e| RaglineError::fatal("local", format!("embedding task failed: {e}")))?;

        finish_vectors("local", texts.len(), self.dimension(), pooled, normalize)
    }
}
