//! Translation through any OpenAI-compatible chat completions API.
//!
//! Providers are distinguished only by endpoint URL, auth style and API key
//! (see `registry`). One request per text; transient failures are retried.

use std::time::Duration;

use async_trait::async_trait;
use ragline_core::config::TranslationConfig;
use ragline_core::error::{RaglineError, Result};
use ragline_core::retry::RetryPolicy;
use ragline_core::traits::Translator;
use ragline_core::traits::translator::language_name;
use serde_json::{Value, json};

use crate::registry::{AuthStyle, ChatProviderConfig};

pub struct ChatTranslator {
    /// Provider name (e.g., "gemini", "openai", "ollama").
    name: String,
    api_key: String,
    base_url: String,
    chat_path: String,
    auth_style: AuthStyle,
    model: String,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl ChatTranslator {
    /// Create from a known provider config.
    ///
    /// Resolution order:
    /// - API key: `translation.api_key` > provider env vars > empty
    /// - Base URL: `translation.endpoint` > env override > registry default
    pub fn from_registry(
        registry: &ChatProviderConfig,
        config: &TranslationConfig,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let api_key = ragline_core::config::resolve(&config.api_key, registry.env_keys);
        if registry.auth_style != AuthStyle::None && api_key.is_empty() {
            return Err(RaglineError::Config(format!(
                "no API key for translation provider '{}' (set {})",
                registry.name,
                registry.env_keys.join(" or ")
            )));
        }

        let base_url = if !config.endpoint.is_empty() {
            config.endpoint.clone()
        } else {
            registry
                .base_url_env
                .and_then(|env_key| {
                    let val = std::env::var(env_key).ok()?;
                    // OLLAMA_HOST / LLAMACPP_HOST usually omit /v1
                    if val.ends_with("/v1") {
                        Some(val)
                    } else {
                        Some(format!("{}/v1", val.trim_end_matches('/')))
                    }
                })
                .unwrap_or_else(|| registry.base_url.to_string())
        };

        let model = if config.model.is_empty() {
            registry.default_model.to_string()
        } else {
            config.model.clone()
        };

        Ok(Self {
            name: registry.name.to_string(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            chat_path: registry.chat_path.to_string(),
            auth_style: registry.auth_style,
            model,
            retry,
            client: build_client(config.timeout_secs)?,
        })
    }

    /// Create for a custom endpoint (e.g., "custom:https://my-server.com/v1").
    pub fn custom(endpoint: &str, config: &TranslationConfig, retry: RetryPolicy) -> Result<Self> {
        let base_url = endpoint
            .strip_prefix("custom:")
            .unwrap_or(endpoint)
            .trim_end_matches('/')
            .to_string();

        let api_key = ragline_core::config::resolve(&config.api_key, &["CUSTOM_API_KEY"]);
        let auth_style = if api_key.is_empty() {
            AuthStyle::None
        } else {
            AuthStyle::Bearer
        };

        Ok(Self {
            name: "custom".to_string(),
            api_key,
            base_url,
            chat_path: "/chat/completions".to_string(),
            auth_style,
            model: config.model.clone(),
            retry,
            client: build_client(config.timeout_secs)?,
        })
    }

    /// Build the auth header for the request.
    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth_style {
            AuthStyle::Bearer if !self.api_key.is_empty() => req.bearer_auth(&self.api_key),
            _ => req,
        }
    }

    async fn complete(&self, body: &Value) -> Result<String> {
        let url = format!("{}{}", self.base_url, self.chat_path);
        let resp = self
            .apply_auth(self.client.post(&url).json(body))
            .send()
            .await
            .map_err(|e| RaglineError::from_http(&self.name, &e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(RaglineError::from_status(&self.name, status.as_u16(), &text));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| RaglineError::fatal(&self.name, format!("malformed response: {e}")))?;
        let content = json["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .ok_or_else(|| RaglineError::fatal(&self.name, "no choices in response"))?;
        Ok(content.trim().to_string())
    }
}

fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .map_err(|e| RaglineError::Config(format!("failed to build HTTP client: {e}")))
}

/// Prompt asking for a faithful translation that leaves names and layout intact.
pub fn translation_prompt(text: &str, source_lang: &str, target_lang: &str) -> String {
    let from = language_name(source_lang);
    let to = language_name(target_lang);
    format!(
        "Translate the following {from} text to {to}.\n\
         Keep any technical terms, proper nouns, and city-specific names in their original form.\n\
         Maintain the same formatting and structure.\n\
         Reply with the translation only.\n\n\
         {from} text:\n{text}\n\n\
         {to} translation:"
    )
}

#[async_trait]
impl Translator for ChatTranslator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String> {
        if text.trim().is_empty() {
            return Err(RaglineError::Validation("nothing to translate".into()));
        }
        let body = json!({
            "model": self.model,
            "temperature": 0.2,
            "messages": [
                {"role": "user", "content": translation_prompt(text, source_lang, target_lang)}
            ],
        });

        let translated = self
            .retry
            .run(&format!("{} translate", self.name), |_| self.complete(&body))
            .await?;
        if translated.is_empty() {
            return Err(RaglineError::fatal(&self.name, "empty translation"));
        }
        tracing::debug!(
            "{} translated {} chars {source_lang}→{target_lang}",
            self.name,
            text.chars().count()
        );
        Ok(translated)
    }
}
