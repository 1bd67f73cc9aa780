//! External capabilities the engine consumes: vector search and judgment.
//!
//! Both are async traits so backends can be swapped (HTTP model server,
//! deterministic heuristic, scripted mock) without touching the pipeline.

use std::collections::BTreeSet;

use async_trait::async_trait;
use lc_protocol::{CallIntent, EndpointSpec};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of an external capability. Never fatal to a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    #[error("capability unavailable: {0}")]
    Unavailable(String),

    /// The backend asked us to slow down, optionally saying for how long.
    #[error("rate limited")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Semantic nearest-neighbour search over the endpoint catalog.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Up to `top_k` `(endpoint_id, similarity)` pairs, best first.
    ///
    /// Implementations should skip `exclude_ids`; callers filter again.
    async fn search(
        &self,
        query_text: &str,
        top_k: usize,
        exclude_ids: &BTreeSet<String>,
    ) -> Result<Vec<(String, f64)>, CapabilityError>;

    /// Backend name (for logging/audit).
    fn backend_name(&self) -> &str;
}

/// Structured verdict on how well an endpoint fits an intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgment {
    /// Fit in [0, 1].
    pub score: f64,
    #[serde(default)]
    pub rationale: String,
}

/// Generative (or heuristic) judgment of candidate endpoints.
#[async_trait]
pub trait JudgmentEngine: Send + Sync {
    async fn judge(
        &self,
        intent: &CallIntent,
        endpoint: &EndpointSpec,
    ) -> Result<Judgment, CapabilityError>;

    /// Name of this judgment tier (for logging/audit).
    fn tier_name(&self) -> &str;
}
