//! The match state machine: cache → retrieve → score → select → validate →
//! generate.
//!
//! Every run records the states it passed through so callers can audit why
//! a result was (or was not) produced.

use std::sync::Arc;

use chrono::Utc;
use lc_protocol::{CallIntent, Candidate, EndpointSpec, FeedbackState, PipelineResult, RetrievalSource};
use serde::{Deserialize, Serialize};

use crate::cache::{CacheLookup, FlightGuard, ResultCache};
use crate::catalog::SpecCatalog;
use crate::curl::{CurlGenerator, RenderOptions};
use crate::retriever::CandidateRetriever;
use crate::scorer::ConfidenceScorer;
use crate::validator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchState {
    Idle,
    CacheCheck,
    Retrieving,
    Scoring,
    Selected,
    Validating,
    Generating,
    Done,
    AwaitingFeedback,
    Retrying,
    Exhausted,
}

impl MatchState {
    pub fn can_transition_to(self, next: MatchState) -> bool {
        use MatchState::*;
        matches!(
            (self, next),
            (Idle, CacheCheck)
                | (Idle, Retrieving)
                | (CacheCheck, Retrieving)
                | (CacheCheck, Done)
                | (Retrieving, Scoring)
                | (Scoring, Selected)
                | (Scoring, Done)
                | (Selected, Validating)
                | (Validating, Generating)
                | (Generating, Done)
                | (Done, AwaitingFeedback)
                | (AwaitingFeedback, Done)
                | (AwaitingFeedback, Retrying)
                | (AwaitingFeedback, Exhausted)
                | (Retrying, Retrieving)
        )
    }
}

/// States visited by one run, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StateTrace(Vec<MatchState>);

impl StateTrace {
    pub fn new() -> Self {
        Self(vec![MatchState::Idle])
    }

    /// Trace of a run resumed from feedback.
    pub fn resumed() -> Self {
        Self(vec![MatchState::AwaitingFeedback])
    }

    pub fn current(&self) -> MatchState {
        self.0.last().copied().unwrap_or(MatchState::Idle)
    }

    pub fn advance(&mut self, next: MatchState) {
        let current = self.current();
        if !current.can_transition_to(next) {
            tracing::warn!(from = ?current, to = ?next, "Unexpected match state transition");
        }
        self.0.push(next);
    }

    pub fn states(&self) -> &[MatchState] {
        &self.0
    }
}

impl Default for StateTrace {
    fn default() -> Self {
        Self::new()
    }
}

/// Caller controls for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Skip the cache lookup (the result is still stored).
    #[serde(default)]
    pub force_nocache: bool,
    /// Select this endpoint regardless of ranking and threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_endpoint: Option<String>,
    /// Render sensitive values verbatim. Such results are never cached.
    #[serde(default)]
    pub unmasked: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    Matched {
        result: PipelineResult,
        candidates: Vec<Candidate>,
        cache_hit: bool,
    },
    NoConfidentMatch {
        candidates: Vec<Candidate>,
        threshold: f64,
    },
}

pub struct Matcher {
    catalog: Arc<dyn SpecCatalog>,
    retriever: CandidateRetriever,
    scorer: ConfidenceScorer,
    generator: CurlGenerator,
    cache: Arc<ResultCache>,
}

impl Matcher {
    pub fn new(
        catalog: Arc<dyn SpecCatalog>,
        retriever: CandidateRetriever,
        scorer: ConfidenceScorer,
        generator: CurlGenerator,
        cache: Arc<ResultCache>,
    ) -> Self {
        Self {
            catalog,
            retriever,
            scorer,
            generator,
            cache,
        }
    }

    /// Run one attempt for `intent`.
    ///
    /// First attempts consult the cache (single-flight); retries go straight
    /// to retrieval and never write to the cache.
    pub async fn execute(
        &self,
        intent: &CallIntent,
        state: &FeedbackState,
        options: &RunOptions,
        attempt: u32,
        trace: &mut StateTrace,
    ) -> MatchOutcome {
        let fingerprint = intent.fingerprint();
        let cacheable = attempt == 1
            && options.force_endpoint.is_none()
            && !options.unmasked
            && self.cache.is_enabled();

        let mut flight: Option<FlightGuard<'_>> = None;
        if cacheable {
            if options.force_nocache {
                // Recompute, then overwrite whatever is stored.
                trace.advance(MatchState::Retrieving);
            } else {
                trace.advance(MatchState::CacheCheck);
                let catalog = &self.catalog;
                let lookup = self
                    .cache
                    .begin(&fingerprint, |cached| {
                        catalog.content_hash(&cached.selected_endpoint_id).as_deref()
                            == Some(cached.endpoint_content_hash.as_str())
                    })
                    .await;
                match lookup {
                    CacheLookup::Hit(result) => {
                        tracing::debug!(fingerprint = %fingerprint, endpoint = %result.selected_endpoint_id, "Cache hit");
                        trace.advance(MatchState::Done);
                        return MatchOutcome::Matched {
                            result,
                            candidates: Vec::new(),
                            cache_hit: true,
                        };
                    }
                    CacheLookup::Lead(guard) => flight = Some(guard),
                }
                trace.advance(MatchState::Retrieving);
            }
        } else {
            trace.advance(MatchState::Retrieving);
        }

        let retrieval = self.retriever.retrieve(intent, state).await;
        let mut candidates = retrieval.candidates;
        if let Some(forced) = &options.force_endpoint {
            if !candidates.iter().any(|c| &c.endpoint_id == forced) {
                candidates.push(Candidate::retrieved(forced.clone(), 0.0, RetrievalSource::Lexical));
            }
        }

        trace.advance(MatchState::Scoring);
        let ranked = self.scorer.score(intent, candidates).await;

        let selected = match &options.force_endpoint {
            Some(forced) => ranked.iter().find(|c| &c.endpoint_id == forced),
            None => ranked
                .iter()
                .find(|c| c.combined_score >= state.similarity_threshold),
        };
        let selection = selected.and_then(|c| {
            self.catalog
                .get_by_id(&c.endpoint_id)
                .map(|spec| (c.clone(), spec))
        });

        let Some((candidate, endpoint)) = selection else {
            tracing::info!(
                candidates = ranked.len(),
                threshold = state.similarity_threshold,
                best = ranked.first().map(|c| c.combined_score),
                "No confident match"
            );
            trace.advance(MatchState::Done);
            // Dropping the flight lets waiters recompute
            drop(flight);
            return MatchOutcome::NoConfidentMatch {
                candidates: ranked,
                threshold: state.similarity_threshold,
            };
        };
        trace.advance(MatchState::Selected);
        tracing::debug!(
            endpoint = %candidate.endpoint_id,
            score = candidate.combined_score,
            attempt,
            "Selected endpoint"
        );

        let result = self.finish(
            intent,
            &endpoint,
            &candidate,
            retrieval.degraded,
            attempt,
            options,
            trace,
        );

        if let Some(guard) = flight {
            guard.complete(result.clone());
        } else if cacheable {
            self.cache.store(result.clone());
        }

        MatchOutcome::Matched {
            result,
            candidates: ranked,
            cache_hit: false,
        }
    }

    /// Validate and render the selected endpoint.
    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        intent: &CallIntent,
        endpoint: &EndpointSpec,
        candidate: &Candidate,
        retrieval_degraded: bool,
        attempt: u32,
        options: &RunOptions,
        trace: &mut StateTrace,
    ) -> PipelineResult {
        trace.advance(MatchState::Validating);
        let report = validator::validate(endpoint, intent);

        trace.advance(MatchState::Generating);
        let rendered = self.generator.render(
            endpoint,
            intent,
            self.catalog.base_url(),
            &RenderOptions {
                unmasked: options.unmasked,
            },
        );
        trace.advance(MatchState::Done);

        let is_executable = report.is_valid() && rendered.placeholders.is_empty();
        PipelineResult {
            intent_fingerprint: intent.fingerprint(),
            selected_endpoint_id: endpoint.id.clone(),
            endpoint_content_hash: self
                .catalog
                .content_hash(&endpoint.id)
                .unwrap_or_else(|| endpoint.content_hash()),
            validation_report: report,
            curl_command: rendered.command,
            is_executable,
            placeholders: rendered.placeholders,
            confidence: candidate.combined_score,
            degraded: retrieval_degraded || !candidate.is_judged(),
            attempt,
            created_at: Utc::now(),
        }
    }
}
