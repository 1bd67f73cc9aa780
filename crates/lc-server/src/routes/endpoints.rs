//! Catalog browsing endpoints.

use axum::Json;
use axum::extract::{Path, State};
use lc_protocol::EndpointSpec;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// GET /api/v1/endpoints: every catalog entry, ordered by id.
pub async fn list_endpoints(State(state): State<AppState>) -> Json<Vec<EndpointSpec>> {
    let catalog = state.pipeline.catalog();
    let endpoints = catalog
        .list_ids()
        .iter()
        .filter_map(|id| catalog.get_by_id(id))
        .map(|spec| (*spec).clone())
        .collect();
    Json(endpoints)
}

/// GET /api/v1/endpoints/{id}
pub async fn get_endpoint(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<EndpointSpec>> {
    state
        .pipeline
        .catalog()
        .get_by_id(&id)
        .map(|spec| Json((*spec).clone()))
        .ok_or_else(|| ApiError::NotFound(format!("endpoint '{id}' not found")))
}
