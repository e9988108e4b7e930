//! HTTP service surface.
//!
//! Thin axum routes over the core: index, search, smart search, delete,
//! list, provider configuration, and the agent's server-sent-events
//! endpoint. The browser extension is the only expected caller, so CORS is
//! wide open.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::agent::Agent;
use crate::chunker;
use crate::config::LlmConfig;
use crate::context::SearchContext;
use crate::pipeline;
use crate::store::{PageInput, SearchResult};

/// Builds the service router over a shared context.
pub fn router(ctx: Arc<SearchContext>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(liveness))
        .route("/api/index", post(index_page))
        .route("/api/search", post(search_pages))
        .route("/api/llm-search", post(llm_search))
        .route("/api/delete", post(delete_page))
        .route("/api/list", get(list_pages))
        .route("/api/llm/config", get(get_llm_config).post(set_llm_config))
        .route("/api/agent/chat", post(agent_chat))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Internal failures become a uniform JSON error body.
struct ApiError(String);

impl From<crate::errors::StoreError> for ApiError {
    fn from(err: crate::errors::StoreError) -> Self {
        Self(err.to_string())
    }
}

impl From<crate::errors::PipelineError> for ApiError {
    fn from(err: crate::errors::PipelineError) -> Self {
        Self(err.to_string())
    }
}

impl From<crate::embedding::EmbedError> for ApiError {
    fn from(err: crate::embedding::EmbedError) -> Self {
        Self(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self.0, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"status": "error", "message": self.0})),
        )
            .into_response()
    }
}

async fn liveness() -> Json<Value> {
    Json(json!({"status": "alive", "service": "tabrecall"}))
}

#[derive(Deserialize)]
struct IndexRequest {
    url: String,
    title: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    tab_id: i64,
    #[serde(default)]
    favicon: String,
}

async fn index_page(
    State(ctx): State<Arc<SearchContext>>,
    Json(req): Json<IndexRequest>,
) -> Result<Json<Value>, ApiError> {
    // Pages whose text extraction failed still get indexed by title.
    let text = if req.text.trim().is_empty() {
        req.title.clone()
    } else {
        req.text.trim().to_string()
    };
    if text.is_empty() {
        return Ok(Json(json!({
            "status": "error",
            "message": "nothing to index: both text and title are empty",
        })));
    }

    let chunks = chunker::split(&text, &ctx.chunker);
    tracing::info!(
        url = %req.url,
        characters = text.chars().count(),
        chunks = chunks.len(),
        "indexing page"
    );

    let vectors = ctx.embedder.encode_batch(&chunks).await?;
    let page = PageInput {
        url: req.url,
        title: req.title,
        tab_id: req.tab_id,
        favicon: req.favicon,
    };
    let receipt = ctx.store.write_page(&page, chunks, vectors).await?;

    Ok(Json(json!({
        "status": "ok",
        "doc_id": receipt.page_id,
        "chunks": receipt.chunks,
    })))
}

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default = "default_top_k")]
    top_k: usize,
}

fn default_top_k() -> usize {
    5
}

async fn search_pages(
    State(ctx): State<Arc<SearchContext>>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<Value>, ApiError> {
    let vector = ctx.embedder.encode(&req.query).await?;
    let results = ctx.store.query(&vector, req.top_k, false).await?;
    Ok(Json(json!({"results": results})))
}

async fn llm_search(
    State(ctx): State<Arc<SearchContext>>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<Value>, ApiError> {
    let outcome = pipeline::search_with_rerank(&ctx, &req.query, req.top_k).await?;

    // The ranked text previews are model-facing; strip them for clients.
    let results: Vec<SearchResult> = outcome
        .candidates
        .into_iter()
        .map(|mut result| {
            result.text = None;
            result
        })
        .collect();

    Ok(Json(json!({
        "keywords": outcome.keywords,
        "results": results,
        "llm_error": outcome.llm_error,
    })))
}

#[derive(Deserialize)]
struct DeleteRequest {
    url: String,
}

async fn delete_page(
    State(ctx): State<Arc<SearchContext>>,
    Json(req): Json<DeleteRequest>,
) -> Result<Json<Value>, ApiError> {
    let deleted = ctx.store.delete_page(&req.url).await?;
    Ok(Json(json!({"status": "ok", "deleted": deleted})))
}

async fn list_pages(State(ctx): State<Arc<SearchContext>>) -> Result<Json<Value>, ApiError> {
    let pages = ctx.store.list_all().await?;
    Ok(Json(json!({"status": "ok", "pages": pages})))
}

async fn get_llm_config(State(ctx): State<Arc<SearchContext>>) -> Json<Value> {
    match ctx.config.masked() {
        Some(masked) => Json(json!({"status": "ok", "config": masked})),
        None => Json(json!({"status": "ok", "config": {"configured": false}})),
    }
}

async fn set_llm_config(
    State(ctx): State<Arc<SearchContext>>,
    Json(config): Json<LlmConfig>,
) -> Response {
    match ctx.config.replace(config) {
        Ok(()) => Json(json!({"status": "ok"})).into_response(),
        Err(err) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"status": "error", "message": err.to_string()})),
        )
            .into_response(),
    }
}

#[derive(Deserialize)]
struct AgentChatRequest {
    query: String,
}

/// Streams the reasoning loop's events as server-sent events. Each frame is
/// one JSON object with a `type` discriminator. Client disconnect cancels
/// the loop.
async fn agent_chat(
    State(ctx): State<Arc<SearchContext>>,
    Json(req): Json<AgentChatRequest>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let stream = Agent::new(ctx).run(req.query).into_stream().map(|event| {
        let payload = serde_json::to_string(&event).unwrap_or_else(|err| {
            json!({"type": "error", "message": format!("event serialization failed: {err}")})
                .to_string()
        });
        Ok(SseEvent::default().data(payload))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
