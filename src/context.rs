//! The shared context object.
//!
//! Everything a request handler or agent step needs, constructed once at
//! process start and passed explicitly. There are no process-global
//! singletons; the only shared mutable piece is the config handle, which is
//! replaced atomically on reconfiguration.

use std::sync::Arc;

use crate::agent::AgentConfig;
use crate::chunker::ChunkerConfig;
use crate::config::SharedLlmConfig;
use crate::embedding::Embedder;
use crate::llm::LlmClient;
use crate::pipeline::{RecallParams, RerankWeights};
use crate::store::{TabStore, VectorIndex};

/// Wiring for the retrieval and reasoning core.
pub struct SearchContext {
    pub embedder: Arc<dyn Embedder>,
    pub store: TabStore,
    pub llm: LlmClient,
    pub config: SharedLlmConfig,
    pub chunker: ChunkerConfig,
    pub recall: RecallParams,
    pub rerank: RerankWeights,
    pub agent: AgentConfig,
}

impl SearchContext {
    /// Builds a context with default tuning parameters.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        config: SharedLlmConfig,
    ) -> Self {
        Self {
            embedder,
            store: TabStore::new(index),
            llm: LlmClient::new(config.clone()),
            config,
            chunker: ChunkerConfig::default(),
            recall: RecallParams::default(),
            rerank: RerankWeights::default(),
            agent: AgentConfig::default(),
        }
    }

    #[must_use]
    pub fn with_chunker(mut self, chunker: ChunkerConfig) -> Self {
        self.chunker = chunker;
        self
    }

    #[must_use]
    pub fn with_recall(mut self, recall: RecallParams) -> Self {
        self.recall = recall;
        self
    }

    #[must_use]
    pub fn with_rerank(mut self, rerank: RerankWeights) -> Self {
        self.rerank = rerank;
        self
    }

    #[must_use]
    pub fn with_agent(mut self, agent: AgentConfig) -> Self {
        self.agent = agent;
        self
    }
}
