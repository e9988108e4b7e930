//! # tabrecall
//!
//! Semantic retrieval and agent-driven restoration for an archive of saved
//! browser tabs.
//!
//! ```text
//! page text ──► chunker::split ──► Embedder ──► TabStore::write_page
//!                                                     │
//! query ──► pipeline::retrieve ──► TabStore::query ◄──┘
//!                  │
//!                  ▼
//!          pipeline::rerank ──► ranked SearchResults
//!
//! query ──► agent::Agent::run ──► AgentEvent stream
//!                  │                   (thinking / tool_call / tool_result /
//!                  ▼                    action / answer / error)
//!          tool dispatch ──► pipeline + TabStore operations
//! ```
//!
//! ## Core pieces
//!
//! - [`chunker`]: overlapping, sentence-boundary-aware text windows sized
//!   for the embedding model.
//! - [`store`]: the vector-index contract, two backends, and the page-level
//!   adapter that owns identity and URL-level deduplication.
//! - [`pipeline`]: keyword expansion, multi-keyword recall, merge, and the
//!   two-mode reranker.
//! - [`agent`]: a bounded, event-streaming ReAct loop over four tools, with
//!   restore actions surfaced to an external executor.
//! - [`server`]: the axum routes gluing it all to HTTP, including the
//!   server-sent-events agent endpoint.
//!
//! External collaborators stay behind seams: embedding models implement
//! [`embedding::Embedder`], vector indexes implement
//! [`store::VectorIndex`], and the completion provider is reached through
//! [`llm::LlmClient`] speaking the OpenAI-compatible wire format.

pub mod agent;
pub mod chunker;
pub mod config;
pub mod context;
pub mod embedding;
pub mod errors;
pub mod llm;
pub mod message;
pub mod pipeline;
pub mod server;
pub mod store;

pub use agent::{Agent, AgentConfig, AgentEvent, AgentStream};
pub use chunker::{ChunkerConfig, split};
pub use config::{LlmConfig, SharedLlmConfig};
pub use context::SearchContext;
pub use embedding::{EmbedError, Embedder, HashEmbedder};
pub use errors::{LlmError, PipelineError, StoreError};
pub use message::ChatMessage;
pub use pipeline::{RecallParams, RerankWeights, RetrievalOutcome};
pub use store::{
    MemoryVectorIndex, PageInput, PageSummary, SearchResult, SqliteVecIndex, TabStore, VectorIndex,
};
