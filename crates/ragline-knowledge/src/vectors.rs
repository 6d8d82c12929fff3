//! Pre-computed document vectors.
//!
//! A vectors file is a JSON array of `{id, embedding, embeddingModel}`, one
//! entry per chunk, every entry tagged with the identifier of the backend
//! that produced it. Reindexing from a file skips the embedding step; a file
//! from a different backend is refused before any collection is touched.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ragline_core::error::{RaglineError, Result};
use ragline_core::types::{Chunk, CollectionSpec, Embedding};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorRecord {
    pub id: String,
    pub embedding: Embedding,
    pub embedding_model: String,
}

/// Vectors from one backend, keyed by chunk id.
#[derive(Debug, Clone)]
pub struct VectorSet {
    model: String,
    dimension: Option<usize>,
    records: Vec<VectorRecord>,
    index: HashMap<String, usize>,
}

/// Chunks that have a vector, in input order, with their vectors.
#[derive(Debug, Clone, Default)]
pub struct Aligned {
    pub chunks: Vec<Chunk>,
    pub embeddings: Vec<Embedding>,
    /// Ids of input chunks with no vector.
    pub missing: Vec<String>,
}

impl VectorSet {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            dimension: None,
            records: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Pair `chunks` with `embeddings` (same order).
    pub fn from_embeddings(model: &str, chunks: &[Chunk], embeddings: &[Embedding]) -> Result<Self> {
        if chunks.len() != embeddings.len() {
            return Err(RaglineError::Validation(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }
        let mut set = Self::new(model);
        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            set.insert(&chunk.id, embedding.clone())?;
        }
        Ok(set)
    }

    pub fn insert(&mut self, id: &str, embedding: Embedding) -> Result<()> {
        if id.trim().is_empty() {
            return Err(RaglineError::Validation("vector with an empty id".into()));
        }
        if self.index.contains_key(id) {
            return Err(RaglineError::Validation(format!("duplicate vector id '{id}'")));
        }
        if embedding.is_empty() {
            return Err(RaglineError::Validation(format!("vector for '{id}' is empty")));
        }
        match self.dimension {
            Some(d) if d != embedding.len() => {
                return Err(RaglineError::Validation(format!(
                    "vector for '{id}' has {} dimensions, expected {d}",
                    embedding.len()
                )));
            }
            Some(_) => {}
            None => self.dimension = Some(embedding.len()),
        }
        self.index.insert(id.to_string(), self.records.len());
        self.records.push(VectorRecord {
            id: id.to_string(),
            embedding,
            embedding_model: self.model.clone(),
        });
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RaglineError::Config(format!("failed to read vectors from {}: {e}", path.display()))
        })?;
        let records: Vec<VectorRecord> = serde_json::from_str(&content)?;
        let Some(first) = records.first() else {
            return Err(RaglineError::Validation(format!("{} contains no vectors", path.display())));
        };
        let mut set = Self::new(&first.embedding_model);
        for record in records {
            if record.embedding_model != set.model {
                return Err(RaglineError::Validation(format!(
                    "{} mixes embedding models: '{}' and '{}'",
                    path.display(),
                    set.model,
                    record.embedding_model
                )));
            }
            set.insert(&record.id, record.embedding)?;
        }
        tracing::info!(
            "📄 Loaded {} vectors ({}) from {}",
            set.len(),
            set.model,
            path.display()
        );
        Ok(set)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string(&self.records)?)?;
        tracing::info!("💾 Saved {} vectors to {}", self.len(), path.display());
        Ok(())
    }

    /// Backend identifier the vectors were produced with.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn get(&self, id: &str) -> Option<&Embedding> {
        self.index.get(id).map(|&pos| &self.records[pos].embedding)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Refuse vectors that `spec` would not accept: another backend, or
    /// another dimension.
    pub fn check_compatible(&self, spec: &CollectionSpec) -> Result<()> {
        if let Some(backend) = &spec.embedding
            && *backend != self.model
        {
            return Err(RaglineError::Config(format!(
                "vectors were produced by '{}', the configured backend is '{backend}'",
                self.model
            )));
        }
        if let (Some(want), Some(have)) = (spec.dimension, self.dimension)
            && want != have
        {
            return Err(RaglineError::Config(format!(
                "vectors have {have} dimensions, the configured backend produces {want}"
            )));
        }
        Ok(())
    }

    /// Keep the chunks that have a vector, in input order.
    pub fn align(&self, chunks: &[Chunk]) -> Aligned {
        let mut aligned = Aligned::default();
        for chunk in chunks {
            match self.get(&chunk.id) {
                Some(embedding) => {
                    aligned.chunks.push(chunk.clone());
                    aligned.embeddings.push(embedding.clone());
                }
                None => {
                    tracing::debug!("No vector for chunk '{}'", chunk.id);
                    aligned.missing.push(chunk.id.clone());
                }
            }
        }
        aligned
    }
}

/// `<stem>.vectors.json` next to `chunks`.
pub fn vectors_path(chunks: &Path) -> PathBuf {
    let stem = chunks
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "chunks".into());
    chunks
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(format!("{stem}.vectors.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragline_core::types::DistanceMetric;

    fn chunks() -> Vec<Chunk> {
        vec![
            Chunk::new("a", "water bill"),
            Chunk::new("b", "park hours"),
            Chunk::new("c", "trash pickup"),
        ]
    }

    #[test]
    fn test_save_and_load() {
        let chunks = chunks();
        let set = VectorSet::from_embeddings(
            "keywords/2",
            &chunks[..2],
            &[vec![1.0, 0.0], vec![0.0, 1.0]],
        )
        .unwrap();
        let path = std::env::temp_dir().join("ragline-vectors-test.json");
        set.save(&path).unwrap();

        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw[0]["embeddingModel"], "keywords/2");

        let loaded = VectorSet::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.model(), "keywords/2");
        assert_eq!(loaded.dimension(), Some(2));
        assert_eq!(loaded.get("b"), Some(&vec![0.0, 1.0]));
    }

    #[test]
    fn test_load_rejects_mixed_models() {
        let path = std::env::temp_dir().join("ragline-vectors-mixed.json");
        let records = serde_json::json!([
            {"id": "a", "embedding": [1.0, 0.0], "embeddingModel": "service/mpnet"},
            {"id": "b", "embedding": [0.0, 1.0], "embeddingModel": "cohere/embed-multilingual-v3.0"},
        ]);
        std::fs::write(&path, records.to_string()).unwrap();
        let err = VectorSet::load(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(err.to_string().contains("mixes embedding models"));
    }

    #[test]
    fn test_insert_checks() {
        let mut set = VectorSet::new("keywords/2");
        set.insert("a", vec![1.0, 0.0]).unwrap();
        assert!(set.insert("a", vec![0.0, 1.0]).is_err());
        assert!(set.insert("b", vec![1.0, 0.0, 0.0]).is_err());
        assert!(set.insert("c", vec![]).is_err());
        assert!(set.insert(" ", vec![1.0, 0.0]).is_err());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_other_backend_is_refused() {
        let set = VectorSet::from_embeddings("service/mpnet", &chunks()[..1], &[vec![1.0, 0.0]]).unwrap();
        let same = CollectionSpec::for_backend(DistanceMetric::Cosine, "service/mpnet", 2);
        assert!(set.check_compatible(&same).is_ok());

        let other = CollectionSpec::for_backend(DistanceMetric::Cosine, "cohere/embed-multilingual-v3.0", 2);
        assert!(matches!(set.check_compatible(&other), Err(RaglineError::Config(_))));

        let wider = CollectionSpec::for_backend(DistanceMetric::Cosine, "service/mpnet", 768);
        assert!(set.check_compatible(&wider).is_err());
    }

    #[test]
    fn test_align_skips_chunks_without_vectors() {
        let set = VectorSet::from_embeddings(
            "keywords/2",
            &[Chunk::new("c", "x"), Chunk::new("a", "y")],
            &[vec![0.0, 1.0], vec![1.0, 0.0]],
        )
        .unwrap();
        let aligned = set.align(&chunks());
        let ids: Vec<&str> = aligned.chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(aligned.embeddings, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        assert_eq!(aligned.missing, vec!["b".to_string()]);
    }

    #[test]
    fn test_vectors_path() {
        assert_eq!(
            vectors_path(Path::new("/data/processed/chunks.json")),
            Path::new("/data/processed/chunks.vectors.json")
        );
    }
}
