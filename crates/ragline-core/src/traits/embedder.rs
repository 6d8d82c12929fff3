//! Embedding backend capability.

use async_trait::async_trait;

use crate::error::{RaglineError, Result};
use crate::types::{BackendHealth, EmbedIntent, Embedding, normalize_l2};

/// Turns text into fixed-dimension vectors.
///
/// Contract for every implementation:
/// - output length and order match the input exactly;
/// - an empty list, an empty text, or more than `max_batch_size()` texts is a
///   `Validation` error raised before any network or compute call;
/// - `normalize = true` scales every vector to unit L2 norm;
/// - every vector has `dimension()` elements.
///
/// `identifier()` is `backend/model`. Changing it changes the vector space,
/// so collections built with one identifier must be fully reindexed before
/// being written or queried with another.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    fn identifier(&self) -> &str;

    fn dimension(&self) -> usize;

    /// Largest number of texts accepted by a single `embed_batch` call.
    fn max_batch_size(&self) -> usize;

    async fn embed_batch(
        &self,
        texts: &[String],
        intent: EmbedIntent,
        normalize: bool,
    ) -> Result<Vec<Embedding>>;

    async fn health(&self) -> Result<BackendHealth> {
        Ok(BackendHealth {
            healthy: true,
            identifier: self.identifier().to_string(),
            dimension: self.dimension(),
            detail: None,
        })
    }
}

/// Input checks shared by all backends.
pub fn validate_texts(texts: &[String], max_batch: usize) -> Result<()> {
    if texts.is_empty() {
        return Err(RaglineError::Validation("texts must not be empty".into()));
    }
    if texts.len() > max_batch {
        return Err(RaglineError::Validation(format!(
            "batch of {} texts exceeds backend limit of {max_batch}",
            texts.len()
        )));
    }
    if let Some(pos) = texts.iter().position(|t| t.trim().is_empty()) {
        return Err(RaglineError::Validation(format!("text at index {pos} is empty")));
    }
    Ok(())
}

/// Output checks shared by all backends, plus optional normalization.
pub fn finish_vectors(
    service: &str,
    expected: usize,
    dimension: usize,
    mut vectors: Vec<Embedding>,
    normalize: bool,
) -> Result<Vec<Embedding>> {
    if vectors.len() != expected {
        return Err(RaglineError::fatal(
            service,
            format!("returned {} embeddings for {expected} texts", vectors.len()),
        ));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
        return Err(RaglineError::fatal(
            service,
            format!("returned a {}-dimension vector, expected {dimension}", bad.len()),
        ));
    }
    if normalize {
        vectors.iter_mut().for_each(|v| normalize_l2(v));
    }
    Ok(vectors)
}
