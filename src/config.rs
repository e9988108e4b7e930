//! Completion-provider configuration.
//!
//! The endpoint settings are loaded once at startup (file first, environment
//! as fallback) and shared behind [`SharedLlmConfig`]. Reconfiguration
//! replaces the whole value atomically; readers clone the current snapshot
//! and never observe a partial update.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Environment variable names honored when no config file exists.
const ENV_BASE_URL: &str = "TABRECALL_LLM_BASE_URL";
const ENV_API_KEY: &str = "TABRECALL_LLM_API_KEY";
const ENV_MODEL: &str = "TABRECALL_LLM_MODEL";

/// OpenAI-compatible endpoint settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    pub model: String,
}

impl LlmConfig {
    /// A config is usable once it names an endpoint and carries a key.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty() && !self.api_key.is_empty()
    }

    /// Full URL of the chat-completions endpoint.
    #[must_use]
    pub fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    /// API key shortened for display; the full key never leaves the process.
    #[must_use]
    pub fn masked_key(&self) -> String {
        if self.api_key.chars().count() > 8 {
            let head: String = self.api_key.chars().take(8).collect();
            format!("{head}...")
        } else {
            "***".to_string()
        }
    }

    /// Checks the endpoint parses as an absolute URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.base_url)
            .map_err(|err| ConfigError::InvalidBaseUrl(err.to_string()))?;
        Ok(())
    }

    fn from_env() -> Option<Self> {
        let base_url = std::env::var(ENV_BASE_URL).ok()?;
        let model = std::env::var(ENV_MODEL).unwrap_or_default();
        let api_key = std::env::var(ENV_API_KEY).unwrap_or_default();
        Some(Self {
            base_url,
            api_key,
            model,
        })
    }
}

/// Redacted view served to clients.
#[derive(Clone, Debug, Serialize)]
pub struct MaskedLlmConfig {
    pub base_url: String,
    pub api_key_masked: String,
    pub model: String,
    pub configured: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("base_url is not a valid absolute URL: {0}")]
    InvalidBaseUrl(String),

    #[error("failed to persist configuration: {0}")]
    Persist(String),
}

/// Process-wide handle to the current [`LlmConfig`].
///
/// Reads clone the snapshot under a short read lock; writes replace it and
/// persist to the backing file when one was given.
#[derive(Clone, Default)]
pub struct SharedLlmConfig {
    inner: Arc<RwLock<Option<LlmConfig>>>,
    path: Option<PathBuf>,
}

impl SharedLlmConfig {
    /// An in-memory handle with no persistence, seeded with `config`.
    #[must_use]
    pub fn in_memory(config: Option<LlmConfig>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
            path: None,
        }
    }

    /// Loads from `path`; falls back to environment variables when the file
    /// is missing or unreadable. Never fails: an absent config only disables
    /// the provider-backed features.
    #[must_use]
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let config = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<LlmConfig>(&raw) {
                Ok(config) => {
                    tracing::info!(
                        model = %config.model,
                        base_url = %config.base_url,
                        key = %config.masked_key(),
                        "loaded completion provider configuration"
                    );
                    Some(config)
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "unreadable config file ignored");
                    LlmConfig::from_env()
                }
            },
            Err(_) => {
                let from_env = LlmConfig::from_env();
                if from_env.is_none() {
                    tracing::info!("no completion provider configured; agent and smart search are disabled");
                }
                from_env
            }
        };

        Self {
            inner: Arc::new(RwLock::new(config)),
            path: Some(path),
        }
    }

    /// Snapshot of the current configuration.
    #[must_use]
    pub fn current(&self) -> Option<LlmConfig> {
        self.inner.read().clone()
    }

    /// Redacted snapshot for API responses.
    #[must_use]
    pub fn masked(&self) -> Option<MaskedLlmConfig> {
        self.current().map(|config| MaskedLlmConfig {
            base_url: config.base_url.clone(),
            api_key_masked: config.masked_key(),
            model: config.model.clone(),
            configured: config.is_configured(),
        })
    }

    /// Replaces the configuration and persists it when a path is attached.
    pub fn replace(&self, config: LlmConfig) -> Result<(), ConfigError> {
        config.validate()?;
        if let Some(path) = &self.path {
            let serialized = serde_json::to_string_pretty(&config)
                .map_err(|err| ConfigError::Persist(err.to_string()))?;
            std::fs::write(path, serialized)
                .map_err(|err| ConfigError::Persist(err.to_string()))?;
            tracing::info!(path = %path.display(), "persisted completion provider configuration");
        }
        *self.inner.write() = Some(config);
        Ok(())
    }
}
