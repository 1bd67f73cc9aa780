use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a feedback session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-session retrieval constraints revised by user feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackState {
    /// Grows on every rejection, never shrinks.
    pub excluded_endpoint_ids: BTreeSet<String>,
    /// Number of rejections that triggered a retry.
    pub attempt_count: u32,
    /// Minimum combined score for a selection; may relax across attempts.
    pub similarity_threshold: f64,
}

impl FeedbackState {
    pub fn new(similarity_threshold: f64) -> Self {
        Self {
            excluded_endpoint_ids: BTreeSet::new(),
            attempt_count: 0,
            similarity_threshold,
        }
    }

    pub fn is_excluded(&self, endpoint_id: &str) -> bool {
        self.excluded_endpoint_ids.contains(endpoint_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_is_empty() {
        let state = FeedbackState::new(0.5);
        assert!(state.excluded_endpoint_ids.is_empty());
        assert_eq!(state.attempt_count, 0);
        assert!(!state.is_excluded("get_users"));
    }

    #[test]
    fn session_id_serializes_as_uuid_string() {
        let id = SessionId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.0));
    }
}
