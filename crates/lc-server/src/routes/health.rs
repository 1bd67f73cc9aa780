//! Health check endpoint.

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::state::AppState;

/// GET /health: liveness check with catalog, session and cache figures.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": state.pipeline.catalog().list_ids().len(),
        "sessions": state.pipeline.session_count().await,
        "cache": state.pipeline.cache_stats(),
    }))
}
