//! Ragline configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RaglineError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RaglineConfig {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub translation: TranslationConfig,
    #[serde(default)]
    pub reindex: ReindexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl RaglineConfig {
    /// Load config from the default path (~/.ragline/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RaglineError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| RaglineError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| RaglineError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Ragline home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".ragline")
    }

    /// Fail fast when credentials required by the selected backends are missing.
    pub fn validate(&self) -> Result<()> {
        self.embedding.validate()?;
        self.vector_store.validate()?;
        if self.reindex.batch_size == 0 {
            return Err(RaglineError::Config("reindex.batch_size must be at least 1".into()));
        }
        Ok(())
    }

    /// `validate` plus the translation credential when `translation` is true.
    pub fn validate_for(&self, translation: bool) -> Result<()> {
        self.validate()?;
        if translation {
            self.translation.validate()?;
        }
        Ok(())
    }
}

/// Embedding backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// `cohere`, `service`, `local` or `hashing`.
    #[serde(default = "default_embedding_backend")]
    pub backend: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: String,
    /// Overrides the registry base URL.
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "bool_true")]
    pub normalize: bool,
    /// Texts per request; clamped to the backend ceiling.
    #[serde(default)]
    pub batch_size: Option<usize>,
    /// Embedding requests in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Cohere truncate policy: `NONE`, `START` or `END`.
    #[serde(default = "default_truncate")]
    pub truncate: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Local backend: static vector file.
    #[serde(default)]
    pub model_path: String,
    /// Required for models absent from the registry; also the hashing width.
    #[serde(default)]
    pub dimension: Option<usize>,
    /// Local backend: text prepended to queries/documents before embedding.
    #[serde(default)]
    pub query_prefix: String,
    #[serde(default)]
    pub document_prefix: String,
}

fn bool_true() -> bool { true }
fn default_embedding_backend() -> String { "cohere".into() }
fn default_embedding_model() -> String { "embed-multilingual-v3.0".into() }
fn default_concurrency() -> usize { 1 }
fn default_truncate() -> String { "END".into() }
fn default_timeout_secs() -> u64 { 30 }

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: default_embedding_backend(),
            model: default_embedding_model(),
            api_key: String::new(),
            endpoint: String::new(),
            normalize: true,
            batch_size: None,
            concurrency: default_concurrency(),
            truncate: default_truncate(),
            timeout_secs: default_timeout_secs(),
            model_path: String::new(),
            dimension: None,
            query_prefix: String::new(),
            document_prefix: String::new(),
        }
    }
}

impl EmbeddingConfig {
    /// API key: config value > provider env vars > empty.
    pub fn resolved_api_key(&self) -> String {
        let env_keys: &[&str] = match self.backend.as_str() {
            "cohere" => &["COHERE_API_KEY", "CO_API_KEY"],
            "service" => &["EMBEDDING_SERVICE_API_KEY"],
            _ => &[],
        };
        resolve(&self.api_key, env_keys)
    }

    fn validate(&self) -> Result<()> {
        match self.backend.as_str() {
            "cohere" if self.resolved_api_key().is_empty() => Err(RaglineError::Config(
                "COHERE_API_KEY is not set (embedding.api_key)".into(),
            )),
            "local" if self.model_path.trim().is_empty() => Err(RaglineError::Config(
                "embedding.model_path is required for the local backend".into(),
            )),
            "hashing" if self.dimension.unwrap_or(0) == 0 => Err(RaglineError::Config(
                "embedding.dimension is required for the hashing backend".into(),
            )),
            "cohere" | "service" | "local" | "hashing" => {
                if self.concurrency == 0 {
                    return Err(RaglineError::Config("embedding.concurrency must be at least 1".into()));
                }
                Ok(())
            }
            other => Err(RaglineError::Config(format!("unknown embedding backend '{other}'"))),
        }
    }
}

/// Vector store connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// `chroma` or `memory`.
    #[serde(default = "default_store_backend")]
    pub backend: String,
    #[serde(default = "default_store_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    /// Resolved from the API key identity when empty.
    #[serde(default)]
    pub tenant: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_distance")]
    pub distance: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_store_backend() -> String { "chroma".into() }
fn default_store_endpoint() -> String { "https://api.trychroma.com".into() }
fn default_database() -> String { "HarliBot".into() }
fn default_collection() -> String { "harlingen_city_content".into() }
fn default_distance() -> String { "cosine".into() }

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            endpoint: default_store_endpoint(),
            api_key: String::new(),
            tenant: String::new(),
            database: default_database(),
            collection: default_collection(),
            distance: default_distance(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl VectorStoreConfig {
    pub fn resolved_api_key(&self) -> String {
        resolve(&self.api_key, &["CHROMADB_API_KEY", "CHROMA_API_KEY"])
    }

    pub fn resolved_tenant(&self) -> String {
        resolve(&self.tenant, &["CHROMADB_TENANT", "CHROMA_TENANT"])
    }

    pub fn resolved_database(&self) -> String {
        resolve(&self.database, &["CHROMADB_DATABASE", "CHROMA_DATABASE"])
    }

    /// The hosted service always requires a key; self-hosted servers may not.
    pub fn requires_api_key(&self) -> bool {
        self.backend == "chroma" && self.endpoint.contains("trychroma.com")
    }

    fn validate(&self) -> Result<()> {
        match self.backend.as_str() {
            "chroma" | "memory" => {}
            other => return Err(RaglineError::Config(format!("unknown vector store '{other}'"))),
        }
        if self.requires_api_key() && self.resolved_api_key().is_empty() {
            return Err(RaglineError::Config(
                "CHROMADB_API_KEY is not set (vector_store.api_key)".into(),
            ));
        }
        if self.collection.trim().is_empty() {
            return Err(RaglineError::Config("vector_store.collection is empty".into()));
        }
        self.distance
            .parse::<crate::types::DistanceMetric>()
            .map_err(|e| RaglineError::Config(e.to_string()))?;
        Ok(())
    }
}

/// Translation provider for the bilingual mirror.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    /// Chat provider name from the provider registry.
    #[serde(default = "default_translation_provider")]
    pub provider: String,
    #[serde(default = "default_translation_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_source_language")]
    pub source_language: String,
    #[serde(default = "default_target_language")]
    pub target_language: String,
    /// Minimum delay between translation calls.
    #[serde(default = "default_translation_interval")]
    pub min_interval_ms: u64,
    /// Keep untranslated content when a chunk fails (otherwise skip it).
    #[serde(default = "bool_true")]
    pub fallback_to_source: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl TranslationConfig {
    /// API key: config value > provider env vars > empty.
    pub fn resolved_api_key(&self) -> String {
        let env_keys: &[&str] = match self.provider.as_str() {
            "gemini" | "google" => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
            "openai" => &["OPENAI_API_KEY"],
            "openrouter" => &["OPENROUTER_API_KEY", "OPENAI_API_KEY"],
            "deepseek" => &["DEEPSEEK_API_KEY"],
            "groq" => &["GROQ_API_KEY"],
            "mistral" => &["MISTRAL_API_KEY"],
            _ => &[],
        };
        resolve(&self.api_key, env_keys)
    }

    /// Local servers run without a key.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self.provider.as_str(), "ollama" | "llamacpp" | "llama.cpp")
            && !self.provider.starts_with("custom:")
    }

    fn validate(&self) -> Result<()> {
        if self.requires_api_key() && self.resolved_api_key().is_empty() {
            return Err(RaglineError::Config(format!(
                "no API key for translation provider '{}' (translation.api_key)",
                self.provider
            )));
        }
        crate::ids::validate_language(&self.target_language)
            .and_then(|_| crate::ids::validate_language(&self.source_language))
            .map_err(|e| RaglineError::Config(e.to_string()))?;
        if self.source_language == self.target_language {
            return Err(RaglineError::Config(
                "translation.source_language equals target_language".into(),
            ));
        }
        Ok(())
    }
}

fn default_translation_provider() -> String { "gemini".into() }
fn default_translation_model() -> String { "gemini-2.0-flash".into() }
fn default_source_language() -> String { "en".into() }
fn default_target_language() -> String { "es".into() }
fn default_translation_interval() -> u64 { 500 }

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            provider: default_translation_provider(),
            model: default_translation_model(),
            api_key: String::new(),
            endpoint: String::new(),
            source_language: default_source_language(),
            target_language: default_target_language(),
            min_interval_ms: default_translation_interval(),
            fallback_to_source: true,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Reindex behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReindexConfig {
    /// Records per upsert request.
    #[serde(default = "default_upsert_batch")]
    pub batch_size: usize,
    /// `in_place` or `blue_green`.
    #[serde(default = "default_strategy")]
    pub strategy: String,
    /// Minimum delay between embedding requests.
    #[serde(default = "default_embed_interval")]
    pub embed_interval_ms: u64,
}

fn default_upsert_batch() -> usize { 100 }
fn default_strategy() -> String { "in_place".into() }
fn default_embed_interval() -> u64 { 100 }

impl Default for ReindexConfig {
    fn default() -> Self {
        Self {
            batch_size: default_upsert_batch(),
            strategy: default_strategy(),
            embed_interval_ms: default_embed_interval(),
        }
    }
}

/// Query-time settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,
}

fn default_top_k() -> usize { 5 }
fn default_max_query_chars() -> usize { 500 }

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            max_query_chars: default_max_query_chars(),
        }
    }
}

/// Backoff for transient failures of external calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 { 5 }
fn default_base_delay() -> u64 { 500 }
fn default_max_delay() -> u64 { 16_000 }

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

/// `ragline serve` listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed CORS origins. Empty allows any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 8001 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

/// First non-empty of: explicit value, then each env var in order.
pub fn resolve(explicit: &str, env_keys: &[&str]) -> String {
    if !explicit.is_empty() {
        return explicit.to_string();
    }
    env_keys
        .iter()
        .find_map(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RaglineConfig::default();
        assert_eq!(config.embedding.backend, "cohere");
        assert_eq!(config.embedding.model, "embed-multilingual-v3.0");
        assert!(config.embedding.normalize);
        assert_eq!(config.vector_store.collection, "harlingen_city_content");
        assert_eq!(config.vector_store.database, "HarliBot");
        assert_eq!(config.vector_store.distance, "cosine");
        assert_eq!(config.reindex.batch_size, 100);
        assert_eq!(config.translation.target_language, "es");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.server.port, 8001);
        assert!(config.server.cors_origins.is_empty());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [embedding]
            backend = "hashing"
            model = "hash"
            dimension = 64

            [vector_store]
            backend = "memory"
            collection = "docs"

            [reindex]
            batch_size = 10
            strategy = "blue_green"
        "#;

        let config: RaglineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.embedding.backend, "hashing");
        assert_eq!(config.embedding.dimension, Some(64));
        assert_eq!(config.vector_store.collection, "docs");
        assert_eq!(config.reindex.strategy, "blue_green");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config: RaglineConfig = toml::from_str("").unwrap();
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.max_query_chars, 500);
        assert_eq!(config.translation.min_interval_ms, 500);
    }

    #[test]
    fn test_validate_rejects_unknown_and_incomplete() {
        let mut config = RaglineConfig::default();
        config.embedding.backend = "hashing".into();
        config.vector_store.backend = "memory".into();
        assert!(matches!(config.validate(), Err(RaglineError::Config(_))));

        config.embedding.dimension = Some(32);
        assert!(config.validate().is_ok());

        config.embedding.backend = "word2vec".into();
        assert!(matches!(config.validate(), Err(RaglineError::Config(_))));

        config.embedding.backend = "local".into();
        assert!(config.validate().unwrap_err().to_string().contains("model_path"));
    }

    #[test]
    fn test_validate_for_translation() {
        let mut config = RaglineConfig::default();
        config.embedding.backend = "hashing".into();
        config.embedding.dimension = Some(8);
        config.vector_store.backend = "memory".into();
        config.translation.provider = "ollama".into();
        assert!(config.validate_for(true).is_ok());

        config.translation.target_language = "en".into();
        assert!(matches!(config.validate_for(true), Err(RaglineError::Config(_))));
        assert!(config.validate_for(false).is_ok());
    }

    #[test]
    fn test_explicit_key_wins() {
        assert_eq!(resolve("explicit", &["PATH"]), "explicit");
        assert_eq!(resolve("", &["RAGLINE_TEST_SURELY_UNSET_VAR"]), "");
    }

    #[test]
    fn test_home_dir() {
        let home = RaglineConfig::home_dir();
        assert!(home.to_string_lossy().contains("ragline"));
    }

    #[test]
    fn test_save_and_reload() {
        let path = std::env::temp_dir()
            .join(format!("ragline-config-{}", std::process::id()))
            .join("config.toml");
        let mut config = RaglineConfig::default();
        config.vector_store.collection = "city_docs".into();
        config.server.port = 9100;
        config.save_to(&path).unwrap();

        let loaded = RaglineConfig::load_from(&path).unwrap();
        assert_eq!(loaded.vector_store.collection, "city_docs");
        assert_eq!(loaded.server.port, 9100);
        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }
}
