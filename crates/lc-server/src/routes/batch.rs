//! Batch matching endpoint.

use axum::Json;
use axum::extract::State;
use lc_engine::{BatchItem, RunOptions};
use lc_log_tools::extract_intents;
use lc_protocol::CallIntent;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub intents: Vec<CallIntent>,
    /// Log text; every extracted call is appended after `intents`.
    #[serde(default)]
    pub log: Option<String>,
    #[serde(default)]
    pub options: RunOptions,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub items: Vec<BatchItem>,
}

/// POST /api/v1/batch: match many intents, each in its own session.
pub async fn run_batch(
    State(state): State<AppState>,
    Json(req): Json<BatchRequest>,
) -> ApiResult<Json<BatchResponse>> {
    let mut intents = req.intents;
    if let Some(log) = &req.log {
        let lines: Vec<String> = log.lines().map(str::to_string).collect();
        intents.extend(extract_intents(&lines).into_iter().map(|e| e.intent));
    }
    if intents.is_empty() {
        return Err(ApiError::BadRequest("batch contains no intents".into()));
    }

    let items = state.pipeline.run_batch(intents, req.options).await;
    Ok(Json(BatchResponse { items }))
}
