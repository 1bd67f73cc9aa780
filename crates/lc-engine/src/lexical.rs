//! Lexical index over the endpoint catalog.
//!
//! Each endpoint contributes two token sets: static path segments (weight 2)
//! and tag/summary words (weight 1). An intent is scored by how many of its
//! path-hint tokens hit either set, normalized to [0, 1].

use std::collections::{BTreeSet, HashSet};

use lc_protocol::{CallIntent, EndpointSpec, HttpMethod};

use crate::catalog::SpecCatalog;

const PATH_WEIGHT: f64 = 2.0;
const META_WEIGHT: f64 = 1.0;
/// Added when both the method and the segment count agree.
const STRUCTURE_BONUS: f64 = 0.15;

/// Lower-cased alphanumeric runs of `text`.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_lowercase())
        .collect()
}

/// `{id}` or `:id` style template segment.
pub(crate) fn is_placeholder_segment(segment: &str) -> bool {
    (segment.starts_with('{') && segment.ends_with('}')) || segment.starts_with(':')
}

struct IndexEntry {
    id: String,
    method: HttpMethod,
    segment_count: usize,
    path_tokens: HashSet<String>,
    meta_tokens: HashSet<String>,
}

impl IndexEntry {
    fn from_spec(spec: &EndpointSpec) -> Self {
        let segments = spec.path_segments();
        let path_tokens = segments
            .iter()
            .filter(|s| !is_placeholder_segment(s))
            .flat_map(|s| tokenize(s))
            .collect();
        let mut meta_tokens: HashSet<String> = tokenize(&spec.summary).into_iter().collect();
        for tag in &spec.tags {
            meta_tokens.extend(tokenize(tag));
        }
        Self {
            id: spec.id.clone(),
            method: spec.method,
            segment_count: segments.len(),
            path_tokens,
            meta_tokens,
        }
    }

    fn score(&self, query: &QueryTokens) -> f64 {
        if query.tokens.is_empty() {
            return 0.0;
        }
        let hits: f64 = query
            .tokens
            .iter()
            .map(|t| {
                if self.path_tokens.contains(t) {
                    PATH_WEIGHT
                } else if self.meta_tokens.contains(t) {
                    META_WEIGHT
                } else {
                    0.0
                }
            })
            .sum();
        if hits == 0.0 {
            return 0.0;
        }
        let mut score = hits / (PATH_WEIGHT * query.tokens.len() as f64);
        if query.method.is_known()
            && query.method == self.method
            && query.segment_count == Some(self.segment_count)
        {
            score += STRUCTURE_BONUS;
        }
        score.min(1.0)
    }
}

/// Tokens extracted from one intent.
struct QueryTokens {
    tokens: BTreeSet<String>,
    method: HttpMethod,
    /// `None` for free-text intents.
    segment_count: Option<usize>,
}

impl QueryTokens {
    fn from_intent(intent: &CallIntent) -> Self {
        let path_tokens = intent.path_tokens();
        if path_tokens.is_empty() {
            return Self {
                tokens: tokenize(&intent.raw_text).into_iter().collect(),
                method: intent.method,
                segment_count: None,
            };
        }
        Self {
            tokens: path_tokens.iter().flat_map(|s| tokenize(s)).collect(),
            method: intent.method,
            segment_count: Some(path_tokens.len()),
        }
    }
}

/// Token-overlap index built once per catalog.
pub struct LexicalIndex {
    entries: Vec<IndexEntry>,
}

impl LexicalIndex {
    pub fn build(catalog: &dyn SpecCatalog) -> Self {
        let entries = catalog
            .list_ids()
            .iter()
            .filter_map(|id| catalog.get_by_id(id))
            .map(|spec| IndexEntry::from_spec(&spec))
            .collect::<Vec<_>>();
        tracing::debug!(endpoints = entries.len(), "Built lexical index");
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Up to `top_k` `(endpoint_id, score)` pairs, score descending then id
    /// ascending. Zero scores and excluded ids are dropped.
    pub fn search(
        &self,
        intent: &CallIntent,
        top_k: usize,
        exclude_ids: &BTreeSet<String>,
    ) -> Vec<(String, f64)> {
        let query = QueryTokens::from_intent(intent);
        let mut hits: Vec<(String, f64)> = self
            .entries
            .iter()
            .filter(|e| !exclude_ids.contains(&e.id))
            .map(|e| (e.id.clone(), e.score(&query)))
            .filter(|(_, score)| *score > 0.0)
            .collect();
        hits.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        hits.truncate(top_k);
        hits
    }
}
