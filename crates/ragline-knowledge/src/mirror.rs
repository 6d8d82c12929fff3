//! Bilingual mirror: translate source-language chunks, embed the translations
//! and upsert them into the same collection, tagged by `metadata.language`.
//!
//! Translated ids come from `derive_id`, so re-running on unchanged input
//! overwrites the same records instead of adding new ones.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ragline_core::error::{RaglineError, Result};
use ragline_core::ids::{derive_id, validate_language};
use ragline_core::throttle::Throttle;
use ragline_core::traits::Translator;
use ragline_core::types::{Chunk, LANGUAGE_KEY, SOURCE_TITLE_KEY, TRANSLATED_FROM_KEY};
use serde::Serialize;

use crate::chunk_store::ChunkStore;
use crate::indexer::Indexer;

/// What to do with a chunk whose translation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationFailurePolicy {
    /// Index the untranslated content under the derived id.
    #[default]
    Fallback,
    /// Leave the chunk out of the index.
    Skip,
}

#[derive(Debug, Clone)]
pub struct MirrorOptions {
    pub source_language: String,
    pub target_language: String,
    pub on_failure: TranslationFailurePolicy,
    /// Write the translated chunk set here before indexing.
    pub output: Option<PathBuf>,
}

impl MirrorOptions {
    pub fn new(source_language: &str, target_language: &str) -> Self {
        Self {
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            on_failure: TranslationFailurePolicy::Fallback,
            output: None,
        }
    }

    pub fn from_config(config: &ragline_core::config::TranslationConfig) -> Self {
        let mut options = Self::new(&config.source_language, &config.target_language);
        if !config.fallback_to_source {
            options.on_failure = TranslationFailurePolicy::Skip;
        }
        options
    }
}

/// A chunk that could not be translated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkFailure {
    pub id: String,
    pub message: String,
}

/// Result of translating one chunk.
#[derive(Debug, Clone)]
pub struct TranslatedChunk {
    pub chunk: Chunk,
    /// Set when `content` could not be translated and holds the source text.
    pub failure: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MirrorReport {
    pub collection: String,
    pub source_language: String,
    pub target_language: String,
    /// Source-language chunks considered.
    pub total: usize,
    pub translated: usize,
    /// Indexed with untranslated content.
    pub fallbacks: Vec<ChunkFailure>,
    /// Left out of the index.
    pub skipped: Vec<ChunkFailure>,
    pub indexed: usize,
    pub collection_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

pub struct MirrorPipeline {
    translator: Arc<dyn Translator>,
    indexer: Indexer,
    throttle: Throttle,
}

impl MirrorPipeline {
    pub fn new(translator: Arc<dyn Translator>, indexer: Indexer) -> Self {
        Self {
            translator,
            indexer,
            throttle: Throttle::disabled(),
        }
    }

    /// Minimum delay between translation calls.
    pub fn with_throttle(mut self, throttle: Throttle) -> Self {
        self.throttle = throttle;
        self
    }

    async fn translate_text(&self, text: &str, options: &MirrorOptions) -> Result<String> {
        self.throttle.wait().await;
        self.translator
            .translate(text, &options.source_language, &options.target_language)
            .await
    }

    /// Translate one chunk's content and `sourceTitle`.
    ///
    /// Only an invalid language code or source id is an error here; a failed
    /// translation is reported through `TranslatedChunk::failure`.
    pub async fn translate_chunk(&self, chunk: &Chunk, options: &MirrorOptions) -> Result<TranslatedChunk> {
        let id = derive_id(&chunk.id, &options.target_language)?;
        let mut translated = Chunk {
            id,
            content: chunk.content.clone(),
            metadata: chunk.metadata.clone(),
        };
        translated
            .metadata
            .insert(LANGUAGE_KEY.into(), options.target_language.clone().into());
        translated
            .metadata
            .insert(TRANSLATED_FROM_KEY.into(), chunk.id.clone().into());

        let failure = match self.translate_text(&chunk.content, options).await {
            Ok(text) => {
                translated.content = text;
                None
            }
            Err(e) => {
                tracing::warn!("⚠️ Translation of '{}' failed: {e}", chunk.id);
                Some(e.to_string())
            }
        };

        if let Some(title) = chunk.source_title().filter(|t| !t.trim().is_empty()) {
            match self.translate_text(title, options).await {
                Ok(text) => {
                    translated.metadata.insert(SOURCE_TITLE_KEY.into(), text.into());
                }
                Err(e) => tracing::warn!("Title of '{}' left untranslated: {e}", chunk.id),
            }
        }

        Ok(TranslatedChunk {
            chunk: translated,
            failure,
        })
    }

    /// Mirror every source-language chunk of `chunks` into `collection`.
    ///
    /// Chunks without a language tag count as source language. Individual
    /// translation failures follow `options.on_failure`; the run only fails
    /// with `TranslationFailed` when no chunk could be translated.
    pub async fn run(&self, collection: &str, chunks: &ChunkStore, options: &MirrorOptions) -> Result<MirrorReport> {
        validate_language(&options.source_language)?;
        validate_language(&options.target_language)?;
        if options.source_language == options.target_language {
            return Err(RaglineError::Validation(format!(
                "source and target language are both '{}'",
                options.source_language
            )));
        }

        let started_at = Utc::now();
        let sources: Vec<&Chunk> = chunks
            .by_language(&options.source_language, Some(options.source_language.as_str()))
            .collect();
        let total = sources.len();
        tracing::info!(
            "🌐 Mirroring {total} {} chunks into {} via {}",
            options.source_language,
            options.target_language,
            self.translator.name()
        );

        let mut mirrored = ChunkStore::new();
        let mut fallbacks = Vec::new();
        let mut skipped = Vec::new();
        for (i, chunk) in sources.iter().enumerate() {
            let TranslatedChunk { chunk: translated, failure } = self.translate_chunk(chunk, options).await?;
            match failure {
                None => mirrored.insert(translated)?,
                Some(message) => {
                    let failure = ChunkFailure {
                        id: chunk.id.clone(),
                        message,
                    };
                    match options.on_failure {
                        TranslationFailurePolicy::Fallback => {
                            mirrored.insert(translated)?;
                            fallbacks.push(failure);
                        }
                        TranslationFailurePolicy::Skip => skipped.push(failure),
                    }
                }
            }
            tracing::debug!("translated {}/{total}", i + 1);
        }

        let failed = fallbacks.len() + skipped.len();
        let translated = total - failed;
        if total > 0 && translated == 0 {
            let last = fallbacks.last().or(skipped.last());
            return Err(RaglineError::TranslationFailed {
                id: last.map(|f| f.id.clone()).unwrap_or_default(),
                message: format!(
                    "all {total} chunks failed, last error: {}",
                    last.map(|f| f.message.as_str()).unwrap_or("unknown")
                ),
            });
        }
        tracing::info!("   Translated {translated}/{total} chunks ({failed} failed)");

        if let Some(path) = &options.output {
            mirrored.save(path)?;
        }

        let indexed = self.indexer.upsert(collection, mirrored.chunks()).await?;
        let collection_count = self.indexer.manager().verify(collection, None).await?.count;
        tracing::info!("✅ Mirrored {indexed} chunks into '{collection}' ({collection_count} total)");

        Ok(MirrorReport {
            collection: collection.to_string(),
            source_language: options.source_language.clone(),
            target_language: options.target_language.clone(),
            total,
            translated,
            fallbacks,
            skipped,
            indexed,
            collection_count,
            output: options.output.clone(),
            started_at,
            finished_at: Utc::now(),
        })
    }
}
