//! Candidate retrieval: vector and lexical signals, merged.
//!
//! Both sources run concurrently. A vector failure, timeout or missing
//! backend degrades to lexical-only ranking; retrieval itself never fails.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use lc_protocol::{CallIntent, Candidate, FeedbackState, RetrievalSource};

use crate::capability::VectorSearch;
use crate::catalog::SpecCatalog;
use crate::config::RetrievalConfig;
use crate::lexical::LexicalIndex;

/// Ranked candidates of one retrieval pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieval {
    pub candidates: Vec<Candidate>,
    /// The vector signal did not contribute.
    pub degraded: bool,
}

pub struct CandidateRetriever {
    catalog: Arc<dyn SpecCatalog>,
    lexical: LexicalIndex,
    vector: Option<Arc<dyn VectorSearch>>,
    config: RetrievalConfig,
}

impl CandidateRetriever {
    pub fn new(
        catalog: Arc<dyn SpecCatalog>,
        vector: Option<Arc<dyn VectorSearch>>,
        config: RetrievalConfig,
    ) -> Self {
        let lexical = LexicalIndex::build(catalog.as_ref());
        Self {
            catalog,
            lexical,
            vector,
            config,
        }
    }

    /// Up to `top_k` candidates, none of them excluded by `state`.
    pub async fn retrieve(&self, intent: &CallIntent, state: &FeedbackState) -> Retrieval {
        let query = intent.query_text();
        let exclude = &state.excluded_endpoint_ids;
        let top_k = self.config.top_k;

        let (vector, lexical) = tokio::join!(self.vector_hits(&query, top_k, state), async {
            self.lexical.search(intent, top_k, exclude)
        });

        let degraded = vector.is_none();
        let merged = merge(
            vector.unwrap_or_default(),
            lexical,
            self.config.dual_signal_bonus,
        );

        let mut candidates: Vec<Candidate> = merged
            .into_iter()
            .filter(|c| !state.is_excluded(&c.endpoint_id))
            .filter(|c| {
                let known = self.catalog.get_by_id(&c.endpoint_id).is_some();
                if !known {
                    tracing::debug!(endpoint = %c.endpoint_id, "Dropping candidate unknown to the catalog");
                }
                known
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.retrieval_score
                .total_cmp(&a.retrieval_score)
                .then_with(|| a.endpoint_id.cmp(&b.endpoint_id))
        });
        candidates.truncate(top_k);

        tracing::debug!(
            candidates = candidates.len(),
            degraded,
            excluded = exclude.len(),
            "Retrieved candidates"
        );
        Retrieval {
            candidates,
            degraded,
        }
    }

    /// `None` when the vector signal is absent, failed or timed out.
    async fn vector_hits(
        &self,
        query: &str,
        top_k: usize,
        state: &FeedbackState,
    ) -> Option<Vec<(String, f64)>> {
        let Some(backend) = &self.vector else {
            tracing::debug!("No vector backend configured, using lexical retrieval only");
            return None;
        };

        let timeout = Duration::from_millis(self.config.timeout_ms);
        let search = backend.search(query, top_k, &state.excluded_endpoint_ids);
        match tokio::time::timeout(timeout, search).await {
            Ok(Ok(hits)) => Some(hits),
            Ok(Err(e)) => {
                tracing::warn!(
                    error = %e,
                    backend = backend.backend_name(),
                    "Vector search failed, falling back to lexical retrieval"
                );
                None
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.config.timeout_ms,
                    backend = backend.backend_name(),
                    "Vector search timed out, falling back to lexical retrieval"
                );
                None
            }
        }
    }
}

/// Merge both rankings. Ids in both get `max + bonus`, capped at 1.
fn merge(vector: Vec<(String, f64)>, lexical: Vec<(String, f64)>, bonus: f64) -> Vec<Candidate> {
    let mut by_id: BTreeMap<String, (Option<f64>, Option<f64>)> = BTreeMap::new();
    for (id, score) in vector {
        if let Some(score) = sanitize(score) {
            let slot = &mut by_id.entry(id).or_default().0;
            *slot = Some(slot.map_or(score, |s| s.max(score)));
        }
    }
    for (id, score) in lexical {
        if let Some(score) = sanitize(score) {
            let slot = &mut by_id.entry(id).or_default().1;
            *slot = Some(slot.map_or(score, |s| s.max(score)));
        }
    }

    by_id
        .into_iter()
        .filter_map(|(id, signals)| match signals {
            (Some(v), Some(l)) => Some(Candidate::retrieved(
                id,
                (v.max(l) + bonus).min(1.0),
                RetrievalSource::Both,
            )),
            (Some(v), None) => Some(Candidate::retrieved(id, v, RetrievalSource::Vector)),
            (None, Some(l)) => Some(Candidate::retrieved(id, l, RetrievalSource::Lexical)),
            (None, None) => None,
        })
        .collect()
}

fn sanitize(score: f64) -> Option<f64> {
    score.is_finite().then(|| score.clamp(0.0, 1.0))
}
