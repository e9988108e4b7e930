//! Shared fixtures for the integration tests: an in-memory search context
//! and a scripted completion provider for multi-turn conversations.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use axum::{Json, Router, extract::State, routing::post};
use serde_json::{Value, json};
use tokio::net::TcpListener;

use tabrecall::chunker;
use tabrecall::config::{LlmConfig, SharedLlmConfig};
use tabrecall::context::SearchContext;
use tabrecall::embedding::HashEmbedder;
use tabrecall::store::{MemoryVectorIndex, PageInput};

pub const TEST_DIM: usize = 32;

/// Builds a context over the in-memory index and the deterministic embedder.
pub fn build_context(config: Option<LlmConfig>) -> SearchContext {
    let embedder = Arc::new(HashEmbedder::new(TEST_DIM));
    let index = Arc::new(MemoryVectorIndex::new());
    SearchContext::new(embedder, index, SharedLlmConfig::in_memory(config))
}

/// Same as [`build_context`], shared-ownership flavor.
pub fn test_context(config: Option<LlmConfig>) -> Arc<SearchContext> {
    Arc::new(build_context(config))
}

/// Provider settings pointing at a local mock endpoint.
pub fn provider_config(base_url: &str) -> LlmConfig {
    LlmConfig {
        base_url: base_url.to_string(),
        api_key: "test-key".to_string(),
        model: "mock-model".to_string(),
    }
}

/// Chunks, embeds, and writes one page through the normal write path.
pub async fn index_page(ctx: &SearchContext, url: &str, title: &str, text: &str) {
    let chunks = chunker::split(text, &ctx.chunker);
    let vectors = ctx.embedder.encode_batch(&chunks).await.unwrap();
    let page = PageInput {
        url: url.to_string(),
        title: title.to_string(),
        tab_id: 7,
        favicon: String::new(),
    };
    ctx.store.write_page(&page, chunks, vectors).await.unwrap();
}

#[derive(Clone)]
struct ScriptState {
    responses: Arc<Mutex<VecDeque<Value>>>,
    repeat_last: bool,
    last: Arc<Mutex<Option<Value>>>,
}

/// A chat-completions endpoint that replays a fixed response script.
///
/// Each request pops the next response; with `repeat_last`, an exhausted
/// script keeps answering with its final entry (useful for loops that call
/// until a step budget runs out). A fully exhausted script answers with an
/// empty `choices` array, which the client treats as malformed.
pub struct ScriptedProvider {
    pub base_url: String,
}

pub async fn start_scripted_provider(responses: Vec<Value>, repeat_last: bool) -> ScriptedProvider {
    let state = ScriptState {
        responses: Arc::new(Mutex::new(responses.into())),
        repeat_last,
        last: Arc::new(Mutex::new(None)),
    };

    let app = Router::new()
        .route("/chat/completions", post(next_response))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });

    ScriptedProvider {
        base_url: format!("http://{addr}"),
    }
}

async fn next_response(State(state): State<ScriptState>) -> Json<Value> {
    let popped = state.responses.lock().unwrap().pop_front();
    match popped {
        Some(response) => {
            *state.last.lock().unwrap() = Some(response.clone());
            Json(response)
        }
        None if state.repeat_last => {
            let last = state.last.lock().unwrap().clone();
            Json(last.unwrap_or_else(|| json!({"choices": []})))
        }
        None => Json(json!({"choices": []})),
    }
}

/// A plain assistant answer with no tool calls.
pub fn assistant_reply(content: &str) -> Value {
    json!({
        "choices": [{
            "message": {"role": "assistant", "content": content}
        }]
    })
}

/// An assistant turn requesting the given `(id, name, arguments)` calls.
pub fn tool_call_reply(calls: &[(&str, &str, Value)]) -> Value {
    let tool_calls: Vec<Value> = calls
        .iter()
        .map(|(id, name, args)| {
            json!({
                "id": id,
                "type": "function",
                "function": {"name": name, "arguments": args.to_string()}
            })
        })
        .collect();
    json!({
        "choices": [{
            "message": {"role": "assistant", "content": null, "tool_calls": tool_calls}
        }]
    })
}
