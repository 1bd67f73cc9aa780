use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::report::ValidationReport;

/// Output of one successful pipeline run. Immutable once created.
///
/// A feedback-driven rerun supersedes it with a new result carrying the same
/// fingerprint and `attempt + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub intent_fingerprint: String,
    pub selected_endpoint_id: String,
    /// Content hash of the endpoint at selection time (cache invalidation).
    pub endpoint_content_hash: String,
    pub validation_report: ValidationReport,
    pub curl_command: String,
    /// True iff validation passed and no placeholder was rendered.
    pub is_executable: bool,
    /// Placeholder tokens rendered in place of missing values.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub placeholders: Vec<String>,
    /// Combined score of the selected candidate.
    pub confidence: f64,
    /// Produced without the vector signal or without a judgment.
    #[serde(default)]
    pub degraded: bool,
    /// 1 for the first run of a session, incremented per retry.
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
}
