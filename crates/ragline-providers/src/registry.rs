//! Provider registry — maps provider names to endpoint configurations.
//!
//! Embedding providers carry their known models with dimension and batch
//! ceiling; chat providers (used for translation) are OpenAI-compatible and
//! differ only by base URL, auth style and API key.

/// How to attach auth credentials to requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// No authentication required (local servers).
    None,
}

/// Static embedding model definition.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingModelDef {
    pub id: &'static str,
    pub dimension: usize,
    /// Most texts accepted per request.
    pub max_batch: usize,
    pub multilingual: bool,
}

/// Configuration for an embedding provider.
#[derive(Debug, Clone)]
pub struct EmbeddingProviderConfig {
    pub name: &'static str,
    pub base_url: &'static str,
    /// Path for the embed endpoint (appended to base_url).
    pub embed_path: &'static str,
    /// Health endpoint, when the provider exposes one.
    pub health_path: Option<&'static str>,
    /// Environment variable names to try for the API key (in order).
    pub env_keys: &'static [&'static str],
    pub auth_style: AuthStyle,
    /// Environment variable to override the base URL.
    pub base_url_env: Option<&'static str>,
    /// Batch ceiling for models missing from `models`.
    pub default_max_batch: usize,
    pub models: &'static [EmbeddingModelDef],
}

impl EmbeddingProviderConfig {
    pub fn model(&self, id: &str) -> Option<&'static EmbeddingModelDef> {
        let id = id.strip_prefix("sentence-transformers/").unwrap_or(id);
        self.models
            .iter()
            .find(|m| m.id.strip_prefix("sentence-transformers/").unwrap_or(m.id) == id)
    }

    /// Base URL: explicit endpoint > env override > registry default.
    pub fn resolve_base_url(&self, endpoint: &str) -> String {
        let base = if !endpoint.is_empty() {
            endpoint.to_string()
        } else {
            self.base_url_env
                .and_then(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
                .unwrap_or_else(|| self.base_url.to_string())
        };
        base.trim_end_matches('/').to_string()
    }
}

/// Configuration for an OpenAI-compatible chat provider.
#[derive(Debug, Clone)]
pub struct ChatProviderConfig {
    pub name: &'static str,
    pub base_url: &'static str,
    /// Path for chat completions (appended to base_url).
    pub chat_path: &'static str,
    pub env_keys: &'static [&'static str],
    pub auth_style: AuthStyle,
    /// Environment variable to override the base URL (e.g., OLLAMA_HOST).
    pub base_url_env: Option<&'static str>,
    pub default_model: &'static str,
}

// ─── Embedding Models ────────────────────────────────────────────────────────

static COHERE_MODELS: &[EmbeddingModelDef] = &[
    EmbeddingModelDef {
        id: "embed-english-v3.0",
        dimension: 1024,
        max_batch: 96,
        multilingual: false,
    },
    EmbeddingModelDef {
        id: "embed-multilingual-v3.0",
        dimension: 1024,
        max_batch: 96,
        multilingual: true,
    },
    EmbeddingModelDef {
        id: "embed-multilingual-v2.0",
        dimension: 768,
        max_batch: 96,
        multilingual: true,
    },
    EmbeddingModelDef {
        id: "embed-english-light-v3.0",
        dimension: 384,
        max_batch: 96,
        multilingual: false,
    },
    EmbeddingModelDef {
        id: "embed-multilingual-light-v3.0",
        dimension: 384,
        max_batch: 96,
        multilingual: true,
    },
];

static SERVICE_MODELS: &[EmbeddingModelDef] = &[
    EmbeddingModelDef {
        id: "sentence-transformers/paraphrase-multilingual-mpnet-base-v2",
        dimension: 768,
        max_batch: 100,
        multilingual: true,
    },
    EmbeddingModelDef {
        id: "sentence-transformers/all-MiniLM-L6-v2",
        dimension: 384,
        max_batch: 100,
        multilingual: false,
    },
];

// ─── Registry ────────────────────────────────────────────────────────────────

static EMBEDDING_PROVIDERS: &[EmbeddingProviderConfig] = &[
    EmbeddingProviderConfig {
        name: "cohere",
        base_url: "https://api.cohere.ai/v1",
        embed_path: "/embed",
        health_path: None,
        env_keys: &["COHERE_API_KEY", "CO_API_KEY"],
        auth_style: AuthStyle::Bearer,
        base_url_env: Some("COHERE_API_BASE"),
        default_max_batch: 96,
        models: COHERE_MODELS,
    },
    EmbeddingProviderConfig {
        name: "service",
        base_url: "http://localhost:8001",
        embed_path: "/embed",
        health_path: Some("/health"),
        env_keys: &["EMBEDDING_SERVICE_API_KEY"],
        auth_style: AuthStyle::None,
        base_url_env: Some("EMBEDDING_SERVICE_URL"),
        default_max_batch: 100,
        models: SERVICE_MODELS,
    },
];

static CHAT_PROVIDERS: &[ChatProviderConfig] = &[
    ChatProviderConfig {
        name: "gemini",
        base_url: "https://generativelanguage.googleapis.com/v1beta/openai",
        chat_path: "/chat/completions",
        env_keys: &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        auth_style: AuthStyle::Bearer,
        base_url_env: None,
        default_model: "gemini-2.0-flash",
    },
    ChatProviderConfig {
        name: "openai",
        base_url: "https://api.openai.com/v1",
        chat_path: "/chat/completions",
        env_keys: &["OPENAI_API_KEY"],
        auth_style: AuthStyle::Bearer,
        base_url_env: Some("OPENAI_API_BASE"),
        default_model: "gpt-4o-mini",
    },
    ChatProviderConfig {
        name: "openrouter",
        base_url: "https://openrouter.ai/api/v1",
        chat_path: "/chat/completions",
        env_keys: &["OPENROUTER_API_KEY", "OPENAI_API_KEY"],
        auth_style: AuthStyle::Bearer,
        base_url_env: None,
        default_model: "openai/gpt-4o-mini",
    },
    ChatProviderConfig {
        name: "deepseek",
        base_url: "https://api.deepseek.com",
        chat_path: "/chat/completions",
        env_keys: &["DEEPSEEK_API_KEY"],
        auth_style: AuthStyle::Bearer,
        base_url_env: None,
        default_model: "deepseek-chat",
    },
    ChatProviderConfig {
        name: "groq",
        base_url: "https://api.groq.com/openai/v1",
        chat_path: "/chat/completions",
        env_keys: &["GROQ_API_KEY"],
        auth_style: AuthStyle::Bearer,
        base_url_env: None,
        default_model: "llama-3.3-70b-versatile",
    },
    ChatProviderConfig {
        name: "mistral",
        base_url: "https://api.mistral.ai/v1",
        chat_path: "/chat/completions",
        env_keys: &["MISTRAL_API_KEY"],
        auth_style: AuthStyle::Bearer,
        base_url_env: None,
        default_model: "mistral-small-latest",
    },
    ChatProviderConfig {
        name: "ollama",
        base_url: "http://localhost:11434/v1",
        chat_path: "/chat/completions",
        env_keys: &[],
        auth_style: AuthStyle::None,
        base_url_env: Some("OLLAMA_HOST"),
        default_model: "llama3.2",
    },
    ChatProviderConfig {
        name: "llamacpp",
        base_url: "http://localhost:8080/v1",
        chat_path: "/chat/completions",
        env_keys: &[],
        auth_style: AuthStyle::None,
        base_url_env: Some("LLAMACPP_HOST"),
        default_model: "local-model",
    },
];

/// Look up an embedding provider by name.
pub fn get_embedding_provider(name: &str) -> Option<&'static EmbeddingProviderConfig> {
    let lookup = match name {
        "co" | "cohere-v1" => "cohere",
        "sentence-transformers" | "embedding-service" => "service",
        other => other,
    };
    EMBEDDING_PROVIDERS.iter().find(|p| p.name == lookup)
}

/// Look up a chat provider config by name.
pub fn get_chat_provider(name: &str) -> Option<&'static ChatProviderConfig> {
    // Also match aliases
    let lookup = match name {
        "google" => "gemini",
        "llama.cpp" => "llamacpp",
        other => other,
    };
    CHAT_PROVIDERS.iter().find(|p| p.name == lookup)
}

pub fn all_embedding_providers() -> &'static [EmbeddingProviderConfig] {
    EMBEDDING_PROVIDERS
}

pub fn all_chat_provider_names() -> Vec<&'static str> {
    CHAT_PROVIDERS.iter().map(|p| p.name).collect()
}
