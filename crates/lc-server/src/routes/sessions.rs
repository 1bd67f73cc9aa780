//! Feedback session endpoints.

use axum::Json;
use axum::extract::{Path, State};
use lc_engine::{RunOptions, RunOutcome, Session};
use lc_log_tools::{LogFormat, extract_intents, extract_with_format};
use lc_protocol::{CallIntent, PipelineResult, SessionId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SessionCreated {
    pub session_id: SessionId,
}

/// Request body for a run: a structured intent, or log text to extract one from.
#[derive(Debug, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub intent: Option<CallIntent>,
    /// Log text; the first call found in it is matched.
    #[serde(default)]
    pub log: Option<String>,
    /// Log format; auto-detected when absent.
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub options: RunOptions,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// POST /api/v1/sessions: open a feedback session.
pub async fn create_session(State(state): State<AppState>) -> Json<SessionCreated> {
    let session_id = state.pipeline.start_session().await;
    tracing::debug!(session = %session_id, "Session created");
    Json(SessionCreated { session_id })
}

/// GET /api/v1/sessions/{id}
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Session>> {
    Ok(Json(state.pipeline.session(SessionId(id)).await?))
}

/// POST /api/v1/sessions/{id}/runs: match an intent within the session.
pub async fn run(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RunRequest>,
) -> ApiResult<Json<RunOutcome>> {
    let intent = resolve_intent(req.intent, req.log.as_deref(), req.format.as_deref())?;
    let outcome = state
        .pipeline
        .run(SessionId(id), intent, req.options)
        .await?;
    Ok(Json(outcome))
}

/// POST /api/v1/sessions/{id}/accept
pub async fn accept(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PipelineResult>> {
    Ok(Json(state.pipeline.accept(SessionId(id)).await?))
}

/// POST /api/v1/sessions/{id}/reject: reject and re-search, or exhaust.
pub async fn reject(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RejectRequest>,
) -> ApiResult<Json<RunOutcome>> {
    Ok(Json(state.pipeline.reject(SessionId(id), req.reason).await?))
}

fn resolve_intent(
    intent: Option<CallIntent>,
    log: Option<&str>,
    format: Option<&str>,
) -> ApiResult<CallIntent> {
    if let Some(intent) = intent {
        return Ok(intent);
    }
    let Some(log) = log else {
        return Err(ApiError::BadRequest("either 'intent' or 'log' is required".into()));
    };

    let lines: Vec<String> = log.lines().map(str::to_string).collect();
    let extracted = match format {
        Some(format) => extract_with_format(&lines, format.parse::<LogFormat>()?),
        None => extract_intents(&lines),
    };
    extracted
        .into_iter()
        .next()
        .map(|e| e.intent)
        .ok_or_else(|| ApiError::BadRequest("no API call found in log text".into()))
}
