//! Deterministic feature-hashing embedder.
//!
//! Each token and token bigram is hashed with SHA-256 into a signed bucket.
//! No model, no network: used for offline runs, smoke tests and as the
//! stand-in backend in test suites.

use async_trait::async_trait;
use ragline_core::error::{RaglineError, Result};
use ragline_core::traits::EmbeddingBackend;
use ragline_core::traits::embedder::{finish_vectors, validate_texts};
use ragline_core::types::{EmbedIntent, Embedding};
use sha2::{Digest, Sha256};

use crate::local::tokenize;

const MAX_BATCH: usize = 512;

pub struct HashingEmbedder {
    identifier: String,
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(RaglineError::Config("hashing dimension must be at least 1".into()));
        }
        Ok(Self {
            identifier: format!("hashing/sha256-{dimension}"),
            dimension,
        })
    }

    pub fn embed_text(&self, text: &str) -> Embedding {
        let mut v = vec![0.0f32; self.dimension];
        let tokens: Vec<String> = tokenize(text).collect();
        for token in &tokens {
            self.add(&mut v, token.as_bytes(), 1.0);
        }
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.add(&mut v, bigram.as_bytes(), 0.5);
        }
        v
    }

    fn add(&self, v: &mut [f32], feature: &[u8], weight: f32) {
        let digest = Sha256::digest(feature);
        let mut idx = [0u8; 8];
        idx.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(idx) % self.dimension as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        v[bucket] += sign * weight;
    }
}

#[async_trait]
impl EmbeddingBackend for HashingEmbedder {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_batch_size(&self) -> usize {
        MAX_BATCH
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        _intent: EmbedIntent,
        normalize: bool,
    ) -> Result<Vec<Embedding>> {
        validate_texts(texts, MAX_BATCH)?;
        let vectors = texts.iter().map(|t| self.embed_text(t)).collect();
        finish_vectors(&self.identifier, texts.len(), self.dimension, vectors, normalize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragline_core::types::{DistanceMetric, l2_norm};

    #[tokio::test]
    async fn test_deterministic_and_normalized() {
        let e = HashingEmbedder::new(64).unwrap();
        let texts = vec!["How do I pay my water bill?".to_string()];
        let a = e.embed_batch(&texts, EmbedIntent::Document, true).await.unwrap();
        let b = e.embed_batch(&texts, EmbedIntent::Query, true).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 64);
        assert!((l2_norm(&a[0]) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_similar_texts_are_closer() {
        let e = HashingEmbedder::new(256).unwrap();
        let q = e.embed_text("water bill payment");
        let near = e.embed_text("pay the water bill online");
        let far = e.embed_text("library opening hours");
        let metric = DistanceMetric::Cosine;
        assert!(metric.distance(&q, &near) < metric.distance(&q, &far));
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(HashingEmbedder::new(0).is_err());
    }
}
