//! Vector collection manager.
//!
//! Per collection: `ABSENT → create → EMPTY → upsert… → POPULATED`.
//! The manager is the only place that enforces dimension consistency:
//! every batch is checked against the collection's established dimension
//! before anything is written, so a mismatch never leaves mixed vectors behind.

use std::collections::HashSet;
use std::sync::Arc;

use ragline_core::batch::batch_ranges;
use ragline_core::error::{RaglineError, Result};
use ragline_core::traits::VectorStore;
use ragline_core::types::{Chunk, CollectionInfo, CollectionSpec, Embedding, StoredRecord, UpsertBatch};
use serde::Serialize;

/// How a full reindex swaps data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReindexStrategy {
    /// Drop, create, populate, verify under the live name. Readers see a
    /// partial collection until it finishes.
    #[default]
    InPlace,
    /// Populate and verify a staging collection, then swap it in by rename.
    BlueGreen,
}

impl std::str::FromStr for ReindexStrategy {
    type Err = RaglineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "in_place" | "inplace" => Ok(ReindexStrategy::InPlace),
            "blue_green" | "bluegreen" => Ok(ReindexStrategy::BlueGreen),
            other => Err(RaglineError::Config(format!("unknown reindex strategy '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReindexOptions {
    pub strategy: ReindexStrategy,
    /// Continue an in-place reindex from this committed offset instead of
    /// starting over. The collection must exist with a matching configuration.
    pub resume_from: Option<usize>,
}

impl ReindexOptions {
    pub fn resume_from(offset: usize) -> Self {
        Self {
            strategy: ReindexStrategy::InPlace,
            resume_from: Some(offset),
        }
    }
}

/// Result of `verify`.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub collection: String,
    pub count: usize,
    pub sample: Option<StoredRecord>,
}

/// Records and requests written by one `upsert_all`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct UpsertSummary {
    pub upserted: usize,
    pub batches: usize,
}

/// Result of a successful reindex.
#[derive(Debug, Clone, Serialize)]
pub struct ReindexReport {
    pub collection: String,
    pub strategy: ReindexStrategy,
    /// Records written by this run.
    pub upserted: usize,
    pub batches: usize,
    pub dimension: usize,
    pub count: usize,
    pub sample_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resumed_from: Option<usize>,
}

pub struct CollectionManager {
    store: Arc<dyn VectorStore>,
    /// Records per upsert request.
    batch_size: usize,
}

impl CollectionManager {
    pub fn new(store: Arc<dyn VectorStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Delete `name`. Returns `false` (and only logs) when it did not exist.
    pub async fn drop(&self, name: &str) -> Result<bool> {
        match self.store.delete_collection(name).await {
            Ok(()) => {
                tracing::info!("🗑️ Dropped collection '{name}'");
                Ok(true)
            }
            Err(RaglineError::CollectionNotFound(_)) => {
                tracing::warn!("Collection '{name}' did not exist, nothing to drop");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Create `name` with `spec`. Succeeds without changes when an identical
    /// collection exists; fails with `CollectionConflict` when it differs.
    pub async fn create(&self, name: &str, spec: &CollectionSpec) -> Result<CollectionInfo> {
        if let Some(existing) = self.store.get_collection(name).await? {
            return match spec.conflict_with(&existing) {
                None => {
                    tracing::debug!("Collection '{name}' already exists with the same configuration");
                    Ok(existing)
                }
                Some(message) => Err(RaglineError::CollectionConflict {
                    name: name.to_string(),
                    message,
                }),
            };
        }
        let info = self.store.create_collection(name, &spec.to_metadata()).await?;
        tracing::info!(
            "📁 Created collection '{name}' ({}{})",
            spec.metric,
            spec.embedding
                .as_deref()
                .map(|e| format!(", {e}"))
                .unwrap_or_default()
        );
        Ok(info)
    }

    /// Fetch `name` or fail with `CollectionNotFound`.
    pub async fn collection(&self, name: &str) -> Result<CollectionInfo> {
        self.store
            .get_collection(name)
            .await?
            .ok_or_else(|| RaglineError::CollectionNotFound(name.to_string()))
    }

    /// Upsert one request-sized batch into `name`. Returns the number written.
    pub async fn upsert_batch(&self, name: &str, batch: &UpsertBatch) -> Result<usize> {
        let info = self.collection(name).await?;
        check_batch(&info.name, info.established_dimension(), batch)?;
        if batch.len() > self.batch_size {
            return Err(RaglineError::Validation(format!(
                "batch of {} records exceeds upsert limit of {}",
                batch.len(),
                self.batch_size
            )));
        }
        self.store.upsert(&info, batch).await?;
        Ok(batch.len())
    }

    /// Upsert `chunks[start..]` in request-sized batches, sequentially.
    ///
    /// All vectors are checked first. A store failure partway through returns
    /// `PartialUpsert` with the absolute committed offset to resume from.
    pub async fn upsert_all(
        &self,
        info: &CollectionInfo,
        chunks: &[Chunk],
        embeddings: &[Embedding],
        start: usize,
    ) -> Result<UpsertSummary> {
        let full = UpsertBatch::from_chunks(chunks, embeddings)?;
        check_batch(&info.name, info.established_dimension(), &full)?;
        if start > chunks.len() {
            return Err(RaglineError::Validation(format!(
                "resume offset {start} is beyond the {} input records",
                chunks.len()
            )));
        }

        let pending = &chunks[start..];
        let ranges = batch_ranges(pending.len(), self.batch_size)?;
        let total = ranges.len();
        let mut committed = start;
        let mut batches = 0;
        for (batch_index, range) in ranges.into_iter().enumerate() {
            let abs = start + range.start..start + range.end;
            let batch = UpsertBatch::from_chunks(&chunks[abs.clone()], &embeddings[abs])?;
            if let Err(e) = self.store.upsert(info, &batch).await {
                tracing::error!(
                    "❌ Upsert into '{}' failed at batch {}/{total} ({committed} records committed): {e}",
                    info.name,
                    batch_index + 1
                );
                return Err(RaglineError::PartialUpsert {
                    collection: info.name.clone(),
                    committed,
                    batch_index,
                    source: Box::new(e),
                });
            }
            committed += batch.len();
            batches += 1;
            tracing::info!(
                "  ✅ Batch {}/{total} upserted into '{}' ({committed}/{})",
                batch_index + 1,
                info.name,
                chunks.len()
            );
        }
        Ok(UpsertSummary {
            upserted: committed - start,
            batches,
        })
    }

    /// Count plus first record. With `expected`, a different count fails.
    pub async fn verify(&self, name: &str, expected: Option<usize>) -> Result<VerifyReport> {
        let info = self.collection(name).await?;
        let count = self.store.count(&info).await?;
        let sample = self.store.peek(&info, 1).await?.into_iter().next();
        if let Some(expected) = expected
            && expected != count
        {
            return Err(RaglineError::VerificationFailed {
                collection: name.to_string(),
                expected,
                actual: count,
            });
        }
        tracing::info!("🔍 Collection '{name}' holds {count} records");
        Ok(VerifyReport {
            collection: name.to_string(),
            count,
            sample,
        })
    }

    /// Full reindex of `name` with pre-computed vectors (same order as `chunks`).
    pub async fn reindex(
        &self,
        name: &str,
        spec: &CollectionSpec,
        chunks: &[Chunk],
        embeddings: &[Embedding],
        options: &ReindexOptions,
    ) -> Result<ReindexReport> {
        let full = UpsertBatch::from_chunks(chunks, embeddings)?;
        check_unique_ids(&full.ids)?;
        let dimension = check_batch(name, spec.dimension, &full)?
            .or(spec.dimension)
            .unwrap_or(0);

        let (written, verify, resumed_from) = match (options.strategy, options.resume_from) {
            (ReindexStrategy::BlueGreen, Some(_)) => {
                return Err(RaglineError::Validation(
                    "resume is only supported for in-place reindex".into(),
                ));
            }
            (ReindexStrategy::InPlace, Some(offset)) => {
                let info = self.collection(name).await?;
                if let Some(message) = spec.conflict_with(&info) {
                    return Err(RaglineError::CollectionConflict {
                        name: name.to_string(),
                        message,
                    });
                }
                tracing::info!("▶️ Resuming reindex of '{name}' from record {offset}");
                let written = self.upsert_all(&info, chunks, embeddings, offset).await?;
                (written, self.verify(name, Some(chunks.len())).await?, Some(offset))
            }
            (ReindexStrategy::InPlace, None) => {
                tracing::info!("🔄 Reindexing '{name}' in place: {} records", chunks.len());
                self.drop(name).await?;
                let info = self.create(name, spec).await?;
                let written = self.upsert_all(&info, chunks, embeddings, 0).await?;
                (written, self.verify(name, Some(chunks.len())).await?, None)
            }
            (ReindexStrategy::BlueGreen, None) => {
                let written = self.blue_green(name, spec, chunks, embeddings).await?;
                (written, self.verify(name, Some(chunks.len())).await?, None)
            }
        };

        tracing::info!("✅ Reindex of '{name}' complete: {} records", verify.count);
        Ok(ReindexReport {
            collection: name.to_string(),
            strategy: options.strategy,
            upserted: written.upserted,
            batches: written.batches,
            dimension,
            count: verify.count,
            sample_id: verify.sample.map(|s| s.id),
            resumed_from,
        })
    }

    /// Populate and verify a staging collection, then swap it in.
    ///
    /// The swap renames the live collection aside, renames staging to the live
    /// name and only then drops the retired data. If the second rename fails
    /// the retired collection is renamed back and the populated staging
    /// collection is kept; its name is reported in `SwapFailed`.
    async fn blue_green(
        &self,
        name: &str,
        spec: &CollectionSpec,
        chunks: &[Chunk],
        embeddings: &[Embedding],
    ) -> Result<UpsertSummary> {
        let staging = staging_name(name);
        tracing::info!(
            "🔵 Blue/green reindex of '{name}': populating '{staging}' with {} records",
            chunks.len()
        );
        let info = self.create(&staging, spec).await?;

        let populated = match self.upsert_all(&info, chunks, embeddings, 0).await {
            Ok(summary) => self.verify(&staging, Some(chunks.len())).await.map(|_| summary),
            Err(e) => Err(e),
        };
        let summary = match populated {
            Ok(summary) => summary,
            Err(e) => {
                if let Err(cleanup) = self.drop(&staging).await {
                    tracing::warn!("Failed to drop staging collection '{staging}': {cleanup}");
                }
                return Err(e);
            }
        };

        let swap_failed = |restored: bool, source: RaglineError| {
            tracing::error!("❌ Swap of '{staging}' into '{name}' failed (restored: {restored}): {source}");
            RaglineError::SwapFailed {
                collection: name.to_string(),
                staging: staging.clone(),
                restored,
                source: Box::new(source),
            }
        };

        let live = self.store.get_collection(name).await.map_err(|e| swap_failed(true, e))?;
        let retired = match live {
            Some(_) => {
                let retired = retired_name(name);
                self.store
                    .rename_collection(name, &retired)
                    .await
                    .map_err(|e| swap_failed(true, e))?;
                Some(retired)
            }
            None => None,
        };

        if let Err(e) = self.store.rename_collection(&staging, name).await {
            let restored = match &retired {
                Some(retired) => match self.store.rename_collection(retired, name).await {
                    Ok(()) => true,
                    Err(rollback) => {
                        tracing::error!("❌ Could not restore '{retired}' as '{name}': {rollback}");
                        false
                    }
                },
                None => true,
            };
            return Err(swap_failed(restored, e));
        }
        tracing::info!("🟢 '{staging}' is now live as '{name}'");

        if let Some(retired) = retired
            && let Err(e) = self.drop(&retired).await
        {
            tracing::warn!("Failed to drop retired collection '{retired}': {e}");
        }
        Ok(summary)
    }
}

fn tagged(name: &str, kind: &str) -> String {
    let tag = uuid::Uuid::new_v4().simple().to_string();
    format!("{name}__{kind}_{}", &tag[..8])
}

/// Temporary collection name for blue/green reindex.
pub fn staging_name(name: &str) -> String {
    tagged(name, "staging")
}

/// Name the live collection is moved to while a blue/green swap runs.
pub fn retired_name(name: &str) -> String {
    tagged(name, "retired")
}

/// Column lengths, finite values and one shared dimension matching `expected`.
/// Returns the batch dimension (`None` for an empty batch).
fn check_batch(collection: &str, expected: Option<usize>, batch: &UpsertBatch) -> Result<Option<usize>> {
    batch.check_lengths()?;
    let mut dimension = expected;
    for (id, vector) in batch.ids.iter().zip(&batch.embeddings) {
        if vector.is_empty() {
            return Err(RaglineError::Validation(format!("embedding for '{id}' is empty")));
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(RaglineError::Validation(format!(
                "embedding for '{id}' contains NaN or infinite values"
            )));
        }
        match dimension {
            Some(d) if d != vector.len() => {
                return Err(RaglineError::DimensionMismatch {
                    collection: collection.to_string(),
                    id: id.clone(),
                    expected: d,
                    actual: vector.len(),
                });
            }
            Some(_) => {}
            None => dimension = Some(vector.len()),
        }
    }
    Ok(dimension)
}

fn check_unique_ids(ids: &[String]) -> Result<()> {
    let mut seen = HashSet::with_capacity(ids.len());
    match ids.iter().find(|id| !seen.insert(id.as_str())) {
        Some(dup) => Err(RaglineError::Validation(format!("duplicate chunk id '{dup}'"))),
        None => Ok(()),
    }
}
