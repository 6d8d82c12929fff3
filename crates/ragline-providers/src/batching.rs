//! Split, embed in parallel, reassemble in input order.

use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, stream};
use ragline_core::batch::batch_ranges;
use ragline_core::error::{RaglineError, Result};
use ragline_core::throttle::Throttle;
use ragline_core::traits::EmbeddingBackend;
use ragline_core::types::{EmbedIntent, Embedding};

/// How `embed_all` drives a backend.
#[derive(Debug, Clone)]
pub struct EmbedOptions {
    pub normalize: bool,
    /// Texts per call; clamped to the backend's `max_batch_size()`.
    pub batch_size: Option<usize>,
    /// Calls in flight at once.
    pub concurrency: usize,
    /// Shared rate limit applied before every call.
    pub throttle: Option<Arc<Throttle>>,
}

impl Default for EmbedOptions {
    fn default() -> Self {
        Self {
            normalize: true,
            batch_size: None,
            concurrency: 1,
            throttle: None,
        }
    }
}

impl EmbedOptions {
    pub fn from_config(config: &ragline_core::config::EmbeddingConfig, interval_ms: u64) -> Self {
        Self {
            normalize: config.normalize,
            batch_size: config.batch_size,
            concurrency: config.concurrency.max(1),
            throttle: (interval_ms > 0).then(|| Arc::new(Throttle::from_millis(interval_ms))),
        }
    }
}

/// Embed any number of texts. Output order matches input order.
///
/// Every text is checked before the first call, so one empty text anywhere
/// rejects the whole run without touching the backend. A failing call aborts
/// the run with `RaglineError::Batch` naming the batch and its offset.
/// An empty input returns an empty result.
pub async fn embed_all(
    backend: &dyn EmbeddingBackend,
    texts: &[String],
    intent: EmbedIntent,
    options: &EmbedOptions,
) -> Result<Vec<Embedding>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    if let Some(pos) = texts.iter().position(|t| t.trim().is_empty()) {
        return Err(RaglineError::Validation(format!("text at index {pos} is empty")));
    }

    let ceiling = backend.max_batch_size().max(1);
    let size = options.batch_size.unwrap_or(ceiling).clamp(1, ceiling);
    let ranges = batch_ranges(texts.len(), size)?;
    let total = ranges.len();
    tracing::info!(
        "🧮 Embedding {} texts with {} in {total} batches of ≤{size} ({intent})",
        texts.len(),
        backend.identifier()
    );

    let batches: Vec<Vec<Embedding>> = stream::iter(ranges.into_iter().enumerate())
        .map(|(batch_index, range)| {
            let throttle = options.throttle.clone();
            async move {
                if let Some(t) = throttle {
                    t.wait().await;
                }
                let offset = range.start;
                let vectors = backend
                    .embed_batch(&texts[range], intent, options.normalize)
                    .await
                    .map_err(|e| RaglineError::Batch {
                        batch_index,
                        offset,
                        source: Box::new(e),
                    })?;
                tracing::debug!("batch {}/{total} embedded", batch_index + 1);
                Ok::<_, RaglineError>(vectors)
            }
        })
        .buffered(options.concurrency.max(1))
        .try_collect()
        .await?;

    Ok(batches.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Encodes each text's numeric value into the vector; later batches answer faster.
    struct Scripted {
        max_batch: usize,
        calls: Mutex<Vec<usize>>,
        fail_on_call: Option<usize>,
    }

    impl Scripted {
        fn new(max_batch: usize) -> Self {
            Self {
                max_batch,
                calls: Mutex::new(Vec::new()),
                fail_on_call: None,
            }
        }
    }

    #[async_trait]
    impl EmbeddingBackend for Scripted {
        fn identifier(&self) -> &str {
            "scripted/test"
        }
        fn dimension(&self) -> usize {
            1
        }
        fn max_batch_size(&self) -> usize {
            self.max_batch
        }
        async fn embed_batch(
            &self,
            texts: &[String],
            _intent: EmbedIntent,
            _normalize: bool,
        ) -> Result<Vec<Embedding>> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(texts.len());
                calls.len() - 1
            };
            if self.fail_on_call == Some(call) {
                return Err(RaglineError::fatal("scripted", "boom"));
            }
            let first: u64 = texts[0].parse().unwrap();
            tokio::time::sleep(Duration::from_millis(40u64.saturating_sub(first / 10))).await;
            Ok(texts.iter().map(|t| vec![t.parse::<f32>().unwrap()]).collect())
        }
    }

    fn numbered(n: usize) -> Vec<String> {
        (0..n).map(|i| i.to_string()).collect()
    }

    #[tokio::test]
    async fn test_splits_on_backend_limit() {
        let backend = Scripted::new(96);
        let out = embed_all(&backend, &numbered(250), EmbedIntent::Document, &EmbedOptions::default())
            .await
            .unwrap();
        assert_eq!(out.len(), 250);
        assert_eq!(*backend.calls.lock().unwrap(), vec![96, 96, 58]);
    }

    #[tokio::test]
    async fn test_parallel_preserves_order() {
        let backend = Scripted::new(10);
        let options = EmbedOptions {
            concurrency: 4,
            ..Default::default()
        };
        let out = embed_all(&backend, &numbered(95), EmbedIntent::Document, &options)
            .await
            .unwrap();
        let values: Vec<f32> = out.iter().map(|v| v[0]).collect();
        let expected: Vec<f32> = (0..95).map(|i| i as f32).collect();
        assert_eq!(values, expected);
    }

    #[tokio::test]
    async fn test_batch_size_override_is_clamped() {
        let backend = Scripted::new(5);
        let options = EmbedOptions {
            batch_size: Some(100),
            ..Default::default()
        };
        embed_all(&backend, &numbered(12), EmbedIntent::Query, &options).await.unwrap();
        assert_eq!(*backend.calls.lock().unwrap(), vec![5, 5, 2]);
    }

    #[tokio::test]
    async fn test_empty_text_rejected_before_any_call() {
        let backend = Scripted::new(5);
        let mut texts = numbered(12);
        texts[11] = " ".into();
        let err = embed_all(&backend, &texts, EmbedIntent::Document, &EmbedOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("index 11"));
        assert!(backend.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_reports_batch() {
        let backend = Scripted {
            fail_on_call: Some(1),
            ..Scripted::new(4)
        };
        let err = embed_all(&backend, &numbered(10), EmbedIntent::Document, &EmbedOptions::default())
            .await
            .unwrap_err();
        match err {
            RaglineError::Batch { batch_index, offset, source } => {
                assert_eq!((batch_index, offset), (1, 4));
                assert!(matches!(*source, RaglineError::FatalService { .. }));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_throttle_spaces_calls() {
        let backend = Scripted::new(1);
        let options = EmbedOptions {
            throttle: Some(Arc::new(Throttle::from_millis(20))),
            ..Default::default()
        };
        let start = tokio::time::Instant::now();
        embed_all(&backend, &numbered(3), EmbedIntent::Document, &options).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let backend = Scripted::new(4);
        let out = embed_all(&backend, &[], EmbedIntent::Document, &EmbedOptions::default())
            .await
            .unwrap();
        assert!(out.is_empty());
    }
}
