//! OpenAI-compatible chat-completions client.
//!
//! One [`LlmClient`] is shared per process; every call reads the current
//! [`SharedLlmConfig`] snapshot, so reconfiguration applies to the next call
//! without restarting. Each outbound request carries a hard wall-clock
//! timeout and is never retried here.

pub mod keywords;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::SharedLlmConfig;
use crate::errors::LlmError;
use crate::message::ChatMessage;

/// Per-call tuning: sampling temperature, output cap, and timeout.
#[derive(Clone, Copy, Debug)]
pub struct CallOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 2048,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Serialize)]
struct ChatPayload<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a Value>,
    temperature: f32,
    max_completion_tokens: u32,
}

/// One completion choice from the provider.
#[derive(Clone, Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

/// Provider response body; only the fields this crate consumes.
#[derive(Clone, Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
}

impl ChatResponse {
    /// The first choice's message, which is all this crate ever uses.
    pub fn into_message(self) -> Result<ChatMessage, LlmError> {
        self.choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| LlmError::Malformed("response carried no choices".into()))
    }
}

/// Thin client over the `chat/completions` wire contract.
#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    config: SharedLlmConfig,
}

impl LlmClient {
    #[must_use]
    pub fn new(config: SharedLlmConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Whether a usable provider configuration is currently present.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.config
            .current()
            .is_some_and(|config| config.is_configured())
    }

    /// Issues one chat-completion call with the given conversation and
    /// optional tool schema.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: Option<&Value>,
        options: CallOptions,
    ) -> Result<ChatResponse, LlmError> {
        let config = self
            .config
            .current()
            .filter(|config| config.is_configured())
            .ok_or(LlmError::NotConfigured)?;

        let payload = ChatPayload {
            model: &config.model,
            messages,
            tools,
            temperature: options.temperature,
            max_completion_tokens: options.max_tokens,
        };

        let response = self
            .http
            .post(config.chat_url())
            .bearer_auth(&config.api_key)
            .timeout(options.timeout)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), "completion provider refused the request");
            return Err(LlmError::Status(status.as_u16()));
        }

        response
            .json::<ChatResponse>()
            .await
            .map_err(|err| LlmError::Malformed(err.to_string()))
    }
}

/// Extracts the JSON body from model output that may be wrapped in a
/// markdown code fence (```json ... ```).
#[must_use]
pub fn extract_json_block(content: &str) -> &str {
    let trimmed = content.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let mut inner = trimmed
        .split("```")
        .nth(1)
        .unwrap_or(trimmed)
        .trim_start();
    if let Some(rest) = inner.strip_prefix("json") {
        inner = rest;
    }
    inner.trim()
}
