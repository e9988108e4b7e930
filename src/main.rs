//! Local retrieval service for archived browser tabs.
//!
//! Run with:
//!   cargo run --features local-embeddings
//!
//! The embedding model is downloaded on first start. Endpoint, data
//! directory, and provider settings come from the environment (a `.env`
//! file is honored).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt};

use tabrecall::config::SharedLlmConfig;
use tabrecall::context::SearchContext;
use tabrecall::embedding::{Embedder, LocalEmbedder};
use tabrecall::server;
use tabrecall::store::{SqliteVecIndex, VectorIndex};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();
    dotenvy::dotenv().ok();

    let data_dir = PathBuf::from(
        std::env::var("TABRECALL_DATA_DIR").unwrap_or_else(|_| "./tabrecall_data".to_string()),
    );
    std::fs::create_dir_all(&data_dir)?;

    tracing::info!("loading embedding model...");
    let embedder = Arc::new(LocalEmbedder::new(data_dir.join("models"))?);
    let dimension = embedder.dimension();
    tracing::info!(dimension, "embedding model ready");

    let index = SqliteVecIndex::open(data_dir.join("index.db"), dimension).await?;
    let stored = index.count().await?;
    tracing::info!(chunks = stored, "vector index ready");

    let config = SharedLlmConfig::load(data_dir.join("llm_config.json"));
    let ctx = Arc::new(SearchContext::new(embedder, Arc::new(index), config));

    let addr: SocketAddr = std::env::var("TABRECALL_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:8000".to_string())
        .parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "serving");

    axum::serve(listener, server::router(ctx).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install shutdown handler");
    }
    tracing::info!("shutting down");
}
