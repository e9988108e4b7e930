//! Error taxonomy shared across the crate.
//!
//! Failures fall into three buckets with different blast radii:
//!
//! * [`StoreError`]: the vector index misbehaved. Write-path callers surface
//!   these; read-path callers may degrade to empty results.
//! * [`LlmError`]: the completion provider is unreachable, unconfigured, or
//!   returned something unparseable. Depending on the call site this either
//!   terminates a query's event stream or triggers a silent fallback.
//! * [`PipelineError`]: retrieval plumbing (embedding plus store access).

use thiserror::Error;

use crate::embedding::EmbedError;

/// Failures raised by the vector index or the page-level adapter on top of it.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying index rejected an upsert batch.
    #[error("vector index rejected batch: {0}")]
    Rejected(String),

    /// Any other storage-level failure (connection, SQL, extension load).
    #[error("storage failure: {0}")]
    Storage(String),
}

/// Failures talking to the OpenAI-compatible completion provider.
#[derive(Debug, Error)]
pub enum LlmError {
    /// No endpoint configuration is present, so no call can be made at all.
    #[error("completion provider is not configured")]
    NotConfigured,

    /// Network-level failure, including the per-call timeout.
    #[error("completion transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider answered with a non-success HTTP status.
    #[error("completion provider returned status {0}")]
    Status(u16),

    /// The response body did not match the expected shape.
    #[error("malformed completion response: {0}")]
    Malformed(String),
}

/// Failures inside the retrieval pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
