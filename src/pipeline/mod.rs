//! Multi-stage retrieval: keyword expansion, parallel recall, URL-level
//! merge, and the rerank handoff.
//!
//! ```text
//! query ──► expand_query ──► [kw1, kw2, ...]   (raw query on failure)
//!                 │
//!                 ▼  per keyword
//!          encode + TabStore::query (oversampled, with text)
//!                 │
//!                 ▼
//!          merge by URL, keep max score ──► sort desc ──► rerank
//! ```

pub mod rerank;

use rustc_hash::FxHashMap;

use crate::context::SearchContext;
use crate::errors::PipelineError;
use crate::llm::keywords::expand_query;
use crate::store::SearchResult;

pub use rerank::{RerankWeights, rerank};

/// Recall-stage sizing. Each keyword fetches `k * recall_multiplier`
/// candidates, capped at `recall_cap`, so the reranker has enough distinct
/// pages to work with.
#[derive(Clone, Copy, Debug)]
pub struct RecallParams {
    pub recall_multiplier: usize,
    pub recall_cap: usize,
}

impl Default for RecallParams {
    fn default() -> Self {
        Self {
            recall_multiplier: 3,
            recall_cap: 20,
        }
    }
}

impl RecallParams {
    fn recall_k(&self, k: usize) -> usize {
        (k * self.recall_multiplier).min(self.recall_cap).max(1)
    }
}

/// Merged recall output, before reranking.
#[derive(Clone, Debug, Default)]
pub struct RetrievalOutcome {
    /// Keywords actually used for recall (the raw query when expansion
    /// failed or produced nothing).
    pub keywords: Vec<String>,
    /// URL-deduplicated candidates, sorted by similarity descending.
    pub candidates: Vec<SearchResult>,
    /// Why keyword expansion fell back, when it did.
    pub llm_error: Option<String>,
}

/// Runs recall for `query`: keyword expansion, per-keyword vector search,
/// and a URL-keyed merge that keeps each page's best score.
///
/// The same URL never appears twice in the merged candidate set, no matter
/// how many keywords matched it.
pub async fn retrieve(
    ctx: &SearchContext,
    query: &str,
    k: usize,
) -> Result<RetrievalOutcome, PipelineError> {
    let expansion = expand_query(&ctx.llm, query).await;
    let llm_error = expansion.error;
    let keywords = if expansion.keywords.is_empty() {
        vec![query.to_string()]
    } else {
        expansion.keywords
    };

    let recall_k = ctx.recall.recall_k(k);
    let mut best: FxHashMap<String, SearchResult> = FxHashMap::default();

    for keyword in &keywords {
        let vector = ctx.embedder.encode(keyword).await?;
        let results = ctx.store.query(&vector, recall_k, true).await?;
        for result in results {
            let keep = best
                .get(&result.url)
                .is_none_or(|existing| result.score > existing.score);
            if keep {
                best.insert(result.url.clone(), result);
            }
        }
    }

    let mut candidates: Vec<SearchResult> = best.into_values().collect();
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    tracing::debug!(
        keywords = keywords.len(),
        candidates = candidates.len(),
        "recall complete"
    );

    Ok(RetrievalOutcome {
        keywords,
        candidates,
        llm_error,
    })
}

/// Full smart search: recall, then rerank down to `k` results.
pub async fn search_with_rerank(
    ctx: &SearchContext,
    query: &str,
    k: usize,
) -> Result<RetrievalOutcome, PipelineError> {
    let outcome = retrieve(ctx, query, k).await?;
    let ranked = rerank(
        &ctx.llm,
        &ctx.rerank,
        query,
        outcome.candidates,
        k,
    )
    .await;
    Ok(RetrievalOutcome {
        keywords: outcome.keywords,
        candidates: ranked,
        llm_error: outcome.llm_error,
    })
}
