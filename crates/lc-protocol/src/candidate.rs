use serde::{Deserialize, Serialize};

/// Which retrieval signals proposed a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalSource {
    Vector,
    Lexical,
    Both,
}

/// An endpoint proposed as a match for an intent, with its scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub endpoint_id: String,
    /// Merged retrieval similarity in [0, 1].
    pub retrieval_score: f64,
    /// Generative judgment in [0, 1]; absent when judgment was skipped or unavailable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub judgment_score: Option<f64>,
    /// Deterministic fusion of the two scores, in [0, 1].
    pub combined_score: f64,
    pub source: RetrievalSource,
    /// Audit text only.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rationale: String,
}

impl Candidate {
    /// A freshly retrieved candidate: combined score mirrors retrieval until scored.
    pub fn retrieved(endpoint_id: impl Into<String>, score: f64, source: RetrievalSource) -> Self {
        let score = score.clamp(0.0, 1.0);
        Self {
            endpoint_id: endpoint_id.into(),
            retrieval_score: score,
            judgment_score: None,
            combined_score: score,
            source,
            rationale: String::new(),
        }
    }

    pub fn is_judged(&self) -> bool {
        self.judgment_score.is_some()
    }
}
