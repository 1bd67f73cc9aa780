//! LogCurl HTTP server.
//!
//! Serves the matching pipeline over REST: feedback sessions, log
//! extraction, batch matching and catalog browsing.

use std::sync::Arc;

use lc_engine::{EngineConfig, InMemoryCatalog, Pipeline, SpecCatalog, judge};
use lc_server::config::ServerConfig;
use lc_server::state::{AppState, sample_catalog};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "lc-server starting");

    let config = ServerConfig::from_env();

    let engine_config = match &config.engine_config_path {
        Some(path) => {
            tracing::info!(path = %path, "Loading engine configuration");
            EngineConfig::from_file(path)?
        }
        None => EngineConfig::default(),
    };

    let catalog: Arc<dyn SpecCatalog> = match &config.catalog_path {
        Some(path) => {
            let catalog = InMemoryCatalog::from_file(path)?;
            tracing::info!(path = %path, endpoints = catalog.len(), "Loaded endpoint catalog");
            Arc::new(catalog)
        }
        None => {
            tracing::warn!("LOGCURL_CATALOG not set, serving the sample catalog");
            Arc::new(sample_catalog()?)
        }
    };

    if engine_config.ollama.enabled {
        let model = &engine_config.ollama.model;
        match judge::OllamaJudge::new(engine_config.ollama.clone()) {
            Ok(ollama) if ollama.check_connection().await => {
                tracing::info!(model = %model, "Ollama model available");
            }
            Ok(_) => {
                tracing::warn!(model = %model, "Ollama model not available, heuristic judgment will answer");
            }
            Err(e) => tracing::warn!(error = %e, "Ollama client could not be built"),
        }
    }

    // No vector backend runs in-process; retrieval is lexical.
    let judge = judge::from_config(&engine_config.ollama);
    let pipeline = Pipeline::new(catalog, None, Some(judge), engine_config)?;

    let app = lc_server::build_router(AppState::new(pipeline));

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "listening");

    axum::serve(listener, app).await?;

    Ok(())
}
