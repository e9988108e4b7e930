//! Query-to-keywords expansion.
//!
//! The model rewrites a natural-language request into a handful of search
//! keywords covering different angles and languages, which widens recall
//! over mixed-language page content. Failure here must never sink a search:
//! callers fall back to the raw query.

use std::time::Duration;

use serde::Deserialize;

use super::{CallOptions, LlmClient, extract_json_block};
use crate::message::ChatMessage;

const KEYWORD_TIMEOUT: Duration = Duration::from_secs(30);

const KEYWORD_SYSTEM_PROMPT: &str = "\
You optimize search queries. The user describes, in natural language, a web \
page they saved earlier and want to find again.

Your task:
1. Understand the actual search intent.
2. Produce 3-5 keywords or short phrases most likely to match the target \
page's content.
3. Cover different angles: title keywords, content keywords, topic keywords.
4. Include keywords both in the user's language and in English to widen \
recall.

Answer strictly as JSON, with no other text:
{\"keywords\": [\"keyword1\", \"keyword2\", ...]}";

/// Result of keyword expansion. `keywords` may be empty; `error` carries the
/// reason when the provider could not help.
#[derive(Clone, Debug, Default)]
pub struct KeywordExpansion {
    pub keywords: Vec<String>,
    pub error: Option<String>,
}

#[derive(Deserialize)]
struct KeywordReply {
    #[serde(default)]
    keywords: Vec<String>,
}

/// Expands `query` into search keywords via the completion provider.
///
/// Degrades instead of failing: an unconfigured provider, transport error,
/// or unparseable reply yields an empty keyword list plus an error string.
pub async fn expand_query(llm: &LlmClient, query: &str) -> KeywordExpansion {
    let messages = [
        ChatMessage::system(KEYWORD_SYSTEM_PROMPT),
        ChatMessage::user(format!("Page I want to find: {query}")),
    ];
    let options = CallOptions {
        temperature: 0.3,
        max_tokens: 1024,
        timeout: KEYWORD_TIMEOUT,
    };

    let reply = match llm.chat(&messages, None, options).await {
        Ok(response) => response,
        Err(err) => {
            tracing::debug!(error = %err, "keyword expansion unavailable");
            return KeywordExpansion {
                keywords: Vec::new(),
                error: Some(err.to_string()),
            };
        }
    };

    let content = match reply.into_message() {
        Ok(message) => message.content.unwrap_or_default(),
        Err(err) => {
            return KeywordExpansion {
                keywords: Vec::new(),
                error: Some(err.to_string()),
            };
        }
    };

    match serde_json::from_str::<KeywordReply>(extract_json_block(&content)) {
        Ok(parsed) => {
            let keywords: Vec<String> = parsed
                .keywords
                .into_iter()
                .filter(|k| !k.trim().is_empty())
                .collect();
            tracing::debug!(count = keywords.len(), "expanded query into keywords");
            KeywordExpansion {
                keywords,
                error: None,
            }
        }
        Err(_) => KeywordExpansion {
            keywords: Vec::new(),
            error: Some("keyword reply was not valid JSON".to_string()),
        },
    }
}
