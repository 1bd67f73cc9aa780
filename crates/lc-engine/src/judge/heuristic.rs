//! Heuristic judgment: deterministic agreement between intent and endpoint.
//!
//! Score = 0.3 · method + 0.4 · path structure + 0.3 · token agreement.
//! Handles the common case at zero cost, and backs the model tier when it is
//! unavailable.

use std::collections::HashSet;

use async_trait::async_trait;
use lc_protocol::{CallIntent, EndpointSpec};

use crate::capability::{CapabilityError, Judgment, JudgmentEngine};
use crate::lexical::{is_placeholder_segment, tokenize};

const METHOD_WEIGHT: f64 = 0.3;
const STRUCTURE_WEIGHT: f64 = 0.4;
const TOKEN_WEIGHT: f64 = 0.3;

/// Rule-based judge with no external dependencies.
pub struct HeuristicJudge;

impl HeuristicJudge {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HeuristicJudge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JudgmentEngine for HeuristicJudge {
    async fn judge(
        &self,
        intent: &CallIntent,
        endpoint: &EndpointSpec,
    ) -> Result<Judgment, CapabilityError> {
        Ok(judge_sync(intent, endpoint))
    }

    fn tier_name(&self) -> &str {
        "heuristic"
    }
}

fn judge_sync(intent: &CallIntent, endpoint: &EndpointSpec) -> Judgment {
    let method = method_agreement(intent, endpoint);
    let structure = structure_agreement(intent, endpoint);
    let tokens = token_agreement(intent, endpoint);
    let score = (METHOD_WEIGHT * method + STRUCTURE_WEIGHT * structure + TOKEN_WEIGHT * tokens)
        .clamp(0.0, 1.0);
    Judgment {
        score,
        rationale: format!("method {method:.2}, structure {structure:.2}, tokens {tokens:.2}"),
    }
}

/// 1 on a match, 0 on a mismatch, 0.5 when the intent has no method.
fn method_agreement(intent: &CallIntent, endpoint: &EndpointSpec) -> f64 {
    if !intent.method.is_known() {
        0.5
    } else if intent.method == endpoint.method {
        1.0
    } else {
        0.0
    }
}

/// Fraction of static template segments the hint reproduces.
///
/// Equal lengths compare position by position; otherwise the hint is
/// right-aligned against the template and the result halved.
fn structure_agreement(intent: &CallIntent, endpoint: &EndpointSpec) -> f64 {
    let hint = intent.path_tokens();
    let template = endpoint.path_segments();
    if hint.is_empty() || template.is_empty() {
        return 0.0;
    }

    let overlap = hint.len().min(template.len());
    let pairs = hint[hint.len() - overlap..]
        .iter()
        .zip(&template[template.len() - overlap..]);

    let mut statics = 0usize;
    let mut agreed = 0usize;
    for (h, t) in pairs {
        if is_placeholder_segment(t) {
            continue;
        }
        statics += 1;
        if h.eq_ignore_ascii_case(t) {
            agreed += 1;
        }
    }
    let fraction = if statics == 0 {
        1.0
    } else {
        agreed as f64 / statics as f64
    };

    if hint.len() == template.len() {
        fraction
    } else {
        fraction * 0.5
    }
}

/// Share of the intent's tokens the endpoint mentions anywhere.
fn token_agreement(intent: &CallIntent, endpoint: &EndpointSpec) -> f64 {
    let mut intent_tokens: HashSet<String> = tokenize(intent.normalized_path()).into_iter().collect();
    intent_tokens.extend(intent.query_params.keys().flat_map(|k| tokenize(k)));
    if intent_tokens.is_empty() {
        intent_tokens.extend(tokenize(&intent.raw_text));
    }
    if intent_tokens.is_empty() {
        return 0.0;
    }

    let endpoint_tokens: HashSet<String> = tokenize(&endpoint.search_text()).into_iter().collect();
    let shared = intent_tokens
        .iter()
        .filter(|t| endpoint_tokens.contains(*t))
        .count();
    shared as f64 / intent_tokens.len() as f64
}
