//! Deterministic stand-ins for the embedding and translation services.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use ragline_core::error::{RaglineError, Result};
use ragline_core::traits::embedder::{finish_vectors, validate_texts};
use ragline_core::traits::{EmbeddingBackend, Translator};
use ragline_core::types::{EmbedIntent, Embedding};

/// Bag-of-words counts folded into `dim` buckets by byte sum.
pub struct Keywords {
    identifier: String,
    dim: usize,
    pub calls: AtomicUsize,
}

impl Keywords {
    pub fn new(dim: usize) -> Self {
        Self {
            identifier: format!("keywords/{dim}"),
            dim,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn vector(&self, text: &str) -> Embedding {
        let mut v = vec![0.0f32; self.dim];
        for word in text.split_whitespace() {
            let word = word.to_lowercase();
            let bucket = word.bytes().map(usize::from).sum::<usize>() % self.dim;
            v[bucket] += 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingBackend for Keywords {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    fn max_batch_size(&self) -> usize {
        3
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        _intent: EmbedIntent,
        normalize: bool,
    ) -> Result<Vec<Embedding>> {
        validate_texts(texts, self.max_batch_size())?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        let vectors = texts.iter().map(|t| self.vector(t)).collect();
        finish_vectors(&self.identifier, texts.len(), self.dim, vectors, normalize)
    }
}

/// Prefixes text with the target language; fails for texts containing `fail_on`.
#[derive(Default)]
pub struct Prefixing {
    pub fail_on: Option<String>,
    pub seen: Mutex<Vec<String>>,
}

impl Prefixing {
    pub fn failing_on(token: &str) -> Self {
        Self {
            fail_on: Some(token.to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Translator for Prefixing {
    fn name(&self) -> &str {
        "prefixing"
    }

    async fn translate(&self, text: &str, _source_lang: &str, target_lang: &str) -> Result<String> {
        self.seen.lock().unwrap().push(text.to_string());
        if let Some(token) = &self.fail_on
            && text.contains(token.as_str())
        {
            return Err(RaglineError::fatal("prefixing", "quota exhausted"));
        }
        Ok(format!("[{target_lang}] {text}"))
    }
}
