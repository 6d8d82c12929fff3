//! In-memory chunk set handed over by the ingestion step.
//!
//! Chunks keep their input order (reindex submits batches in that order) and
//! ids are unique. Files are JSON arrays of `{id, content, metadata}`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ragline_core::batch::batch_ranges;
use ragline_core::error::{RaglineError, Result};
use ragline_core::types::Chunk;

#[derive(Debug, Clone, Default)]
pub struct ChunkStore {
    chunks: Vec<Chunk>,
    /// id → position in `chunks`.
    index: HashMap<String, usize>,
}

impl ChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails on the first duplicate or empty id.
    pub fn from_chunks(chunks: Vec<Chunk>) -> Result<Self> {
        let mut store = Self::new();
        for chunk in chunks {
            store.insert(chunk)?;
        }
        Ok(store)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RaglineError::Config(format!("failed to read chunks from {}: {e}", path.display()))
        })?;
        let chunks: Vec<Chunk> = serde_json::from_str(&content)?;
        let store = Self::from_chunks(chunks)?;
        tracing::info!("📄 Loaded {} chunks from {}", store.len(), path.display());
        Ok(store)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.chunks)?;
        std::fs::write(path, content)?;
        tracing::info!("💾 Saved {} chunks to {}", self.len(), path.display());
        Ok(())
    }

    pub fn insert(&mut self, chunk: Chunk) -> Result<()> {
        if chunk.id.trim().is_empty() {
            return Err(RaglineError::Validation(format!(
                "chunk at position {} has an empty id",
                self.chunks.len()
            )));
        }
        if self.index.contains_key(&chunk.id) {
            return Err(RaglineError::Validation(format!("duplicate chunk id '{}'", chunk.id)));
        }
        self.index.insert(chunk.id.clone(), self.chunks.len());
        self.chunks.push(chunk);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Chunk> {
        self.index.get(id).map(|&pos| &self.chunks[pos])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn into_chunks(self) -> Vec<Chunk> {
        self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Chunks whose `metadata.language` is `lang`. With `untagged_as`, chunks
    /// without a language count as that language.
    pub fn by_language<'a>(
        &'a self,
        lang: &'a str,
        untagged_as: Option<&'a str>,
    ) -> impl Iterator<Item = &'a Chunk> + 'a {
        self.chunks
            .iter()
            .filter(move |c| c.language().or(untagged_as) == Some(lang))
    }

    /// Consecutive slices of at most `size` chunks, in order.
    pub fn batches(&self, size: usize) -> Result<Vec<&[Chunk]>> {
        Ok(batch_ranges(self.chunks.len(), size)?
            .into_iter()
            .map(|r| &self.chunks[r])
            .collect())
    }
}

/// `chunks_<lang>.json` next to `source`.
pub fn translated_path(source: &Path, lang: &str) -> PathBuf {
    source
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(format!("chunks_{lang}.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Chunk> {
        vec![
            Chunk::new("water-chunk-0", "Water bills are due monthly.")
                .with_meta("language", "en")
                .with_meta("sourceTitle", "Utilities"),
            Chunk::new("water-es-chunk-0", "Las facturas de agua vencen cada mes.").with_meta("language", "es"),
            Chunk::new("parks-chunk-0", "Parks open at dawn."),
        ]
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let mut store = ChunkStore::from_chunks(sample()).unwrap();
        assert_eq!(store.len(), 3);
        let err = store.insert(Chunk::new("parks-chunk-0", "again")).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
        assert!(store.insert(Chunk::new(" ", "blank id")).is_err());
        assert_eq!(store.get("water-chunk-0").unwrap().source_title(), Some("Utilities"));
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn test_by_language() {
        let store = ChunkStore::from_chunks(sample()).unwrap();
        let en: Vec<&str> = store.by_language("en", None).map(|c| c.id.as_str()).collect();
        assert_eq!(en, vec!["water-chunk-0"]);
        let en: Vec<&str> = store.by_language("en", Some("en")).map(|c| c.id.as_str()).collect();
        assert_eq!(en, vec!["water-chunk-0", "parks-chunk-0"]);
        assert_eq!(store.by_language("es", Some("en")).count(), 1);
    }

    #[test]
    fn test_batches_keep_order() {
        let store = ChunkStore::from_chunks(sample()).unwrap();
        let batches = store.batches(2).unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1][0].id, "parks-chunk-0");
        assert!(store.batches(0).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("ragline-chunks-{}", std::process::id()));
        let path = dir.join("chunks.json");
        let store = ChunkStore::from_chunks(sample()).unwrap();
        store.save(&path).unwrap();

        let loaded = ChunkStore::load(&path).unwrap();
        assert_eq!(loaded.chunks(), store.chunks());
        assert_eq!(translated_path(&path, "es"), dir.join("chunks_es.json"));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_rejects_duplicate_ids() {
        let path = std::env::temp_dir().join(format!("ragline-dup-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"[{"id":"a","content":"x","metadata":{}},{"id":"a","content":"y","metadata":{}}]"#,
        )
        .unwrap();
        assert!(matches!(ChunkStore::load(&path), Err(RaglineError::Validation(_))));
        std::fs::remove_file(&path).ok();
    }
}
