//! Log extraction endpoint.

use axum::Json;
use lc_log_tools::{ExtractedIntent, LogFormat, detect_format, extract_with_format};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    pub text: String,
    /// Auto-detected when absent.
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub format: LogFormat,
    pub intents: Vec<ExtractedIntent>,
}

/// POST /api/v1/extract: extract call intents from log text.
pub async fn extract(Json(req): Json<ExtractRequest>) -> ApiResult<Json<ExtractResponse>> {
    let lines: Vec<String> = req.text.lines().map(str::to_string).collect();
    let format = match req.format.as_deref() {
        Some(format) => format.parse::<LogFormat>()?,
        None => detect_format(&lines),
    };
    let intents = extract_with_format(&lines, format);
    tracing::debug!(format = %format, intents = intents.len(), "Extracted intents");
    Ok(Json(ExtractResponse { format, intents }))
}
