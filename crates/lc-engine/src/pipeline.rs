//! Pipeline facade: sessions, runs, feedback and batches over one shared
//! matcher and cache.

use std::sync::Arc;

use lc_protocol::{CallIntent, Candidate, PipelineResult, SessionId};
use serde::Serialize;
use tokio::sync::Semaphore;

use crate::cache::{CacheStats, ResultCache};
use crate::capability::{JudgmentEngine, VectorSearch};
use crate::catalog::SpecCatalog;
use crate::config::EngineConfig;
use crate::curl::CurlGenerator;
use crate::error::{ConfigError, EngineError, EngineResult};
use crate::feedback::{ExhaustionHistory, RejectDecision, Session, SessionManager};
use crate::matcher::{MatchOutcome, MatchState, Matcher, RunOptions, StateTrace};
use crate::retriever::CandidateRetriever;
use crate::scorer::ConfidenceScorer;

/// What one run (or a rejection's retry) produced.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Matched {
        session_id: SessionId,
        result: PipelineResult,
        candidates: Vec<Candidate>,
        cache_hit: bool,
        trace: StateTrace,
    },
    NoConfidentMatch {
        session_id: SessionId,
        candidates: Vec<Candidate>,
        threshold: f64,
        trace: StateTrace,
    },
    Exhausted {
        session_id: SessionId,
        history: ExhaustionHistory,
        trace: StateTrace,
    },
}

impl RunOutcome {
    pub fn session_id(&self) -> SessionId {
        match self {
            Self::Matched { session_id, .. }
            | Self::NoConfidentMatch { session_id, .. }
            | Self::Exhausted { session_id, .. } => *session_id,
        }
    }

    pub fn result(&self) -> Option<&PipelineResult> {
        match self {
            Self::Matched { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn trace(&self) -> &StateTrace {
        match self {
            Self::Matched { trace, .. }
            | Self::NoConfidentMatch { trace, .. }
            | Self::Exhausted { trace, .. } => trace,
        }
    }
}

/// One entry of a batch run, reported in input order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RunOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct Inner {
    catalog: Arc<dyn SpecCatalog>,
    matcher: Matcher,
    sessions: SessionManager,
    cache: Arc<ResultCache>,
    workers: Arc<Semaphore>,
    config: EngineConfig,
}

/// Cheaply cloneable handle to the whole engine.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

impl Pipeline {
    /// Wire the engine. A missing vector backend runs lexical-only; a
    /// missing judge degrades every score.
    pub fn new(
        catalog: Arc<dyn SpecCatalog>,
        vector: Option<Arc<dyn VectorSearch>>,
        judge: Option<Arc<dyn JudgmentEngine>>,
        config: EngineConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let cache = Arc::new(ResultCache::new(config.cache.clone()));
        let retriever =
            CandidateRetriever::new(Arc::clone(&catalog), vector, config.retrieval.clone());
        let scorer = ConfidenceScorer::new(Arc::clone(&catalog), judge, config.scoring.clone());
        let matcher = Matcher::new(
            Arc::clone(&catalog),
            retriever,
            scorer,
            CurlGenerator::new(config.render.default_base_url.clone()),
            Arc::clone(&cache),
        );
        let sessions = SessionManager::new(
            config.feedback.clone(),
            config.matching.similarity_threshold,
        );

        Ok(Self {
            inner: Arc::new(Inner {
                catalog,
                matcher,
                sessions,
                cache,
                workers: Arc::new(Semaphore::new(config.batch.workers)),
                config,
            }),
        })
    }

    pub fn catalog(&self) -> &Arc<dyn SpecCatalog> {
        &self.inner.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    // ── Sessions ──────────────────────────────────────────────

    pub async fn start_session(&self) -> SessionId {
        self.inner.sessions.create().await
    }

    pub async fn session_count(&self) -> usize {
        self.inner.sessions.count().await
    }

    pub async fn session(&self, id: SessionId) -> EngineResult<Session> {
        Ok(self.inner.sessions.get(id).await?)
    }

    /// Match `intent` within `session`.
    ///
    /// Fails only for an empty intent, an unknown forced endpoint or a
    /// session that cannot run.
    pub async fn run(
        &self,
        session: SessionId,
        intent: CallIntent,
        options: RunOptions,
    ) -> EngineResult<RunOutcome> {
        intent.validate()?;
        if let Some(forced) = &options.force_endpoint {
            if self.inner.catalog.get_by_id(forced).is_none() {
                return Err(EngineError::UnknownEndpoint(forced.clone()));
            }
        }

        let state = self
            .inner
            .sessions
            .begin_run(session, &intent, &options)
            .await?;
        let attempt = state.attempt_count + 1;
        tracing::info!(
            session = %session,
            method = %intent.method.as_str(),
            path = %intent.path_template_hint,
            attempt,
            "Running match"
        );

        let mut trace = StateTrace::new();
        let outcome = self
            .inner
            .matcher
            .execute(&intent, &state, &options, attempt, &mut trace)
            .await;
        self.conclude(session, outcome, trace).await
    }

    /// Accept the session's current result; it becomes the cached result
    /// for its fingerprint unless it was rendered unmasked.
    pub async fn accept(&self, session: SessionId) -> EngineResult<PipelineResult> {
        let result = self.inner.sessions.accept(session).await?;
        let unmasked = self.inner.sessions.get(session).await?.options.unmasked;
        if !unmasked {
            self.inner.cache.store(result.clone());
        }
        Ok(result)
    }

    /// Reject the current result and re-search, or report exhaustion.
    pub async fn reject(
        &self,
        session: SessionId,
        reason: Option<String>,
    ) -> EngineResult<RunOutcome> {
        let decision = self.inner.sessions.reject(session, reason).await?;
        let mut trace = StateTrace::resumed();

        match decision {
            RejectDecision::Exhausted { history, rejected } => {
                self.inner
                    .cache
                    .invalidate_selection(&rejected.intent_fingerprint, &rejected.selected_endpoint_id);
                trace.advance(MatchState::Exhausted);
                Ok(RunOutcome::Exhausted {
                    session_id: session,
                    history,
                    trace,
                })
            }
            RejectDecision::Retry {
                intent,
                mut options,
                state,
                rejected,
            } => {
                self.inner
                    .cache
                    .invalidate_selection(&rejected.intent_fingerprint, &rejected.selected_endpoint_id);
                // A forced endpoint was just excluded; let ranking decide.
                options.force_endpoint = None;
                trace.advance(MatchState::Retrying);

                let attempt = state.attempt_count + 1;
                let outcome = self
                    .inner
                    .matcher
                    .execute(&intent, &state, &options, attempt, &mut trace)
                    .await;
                self.conclude(session, outcome, trace).await
            }
        }
    }

    async fn conclude(
        &self,
        session: SessionId,
        outcome: MatchOutcome,
        mut trace: StateTrace,
    ) -> EngineResult<RunOutcome> {
        match outcome {
            MatchOutcome::Matched {
                result,
                candidates,
                cache_hit,
            } => {
                self.inner
                    .sessions
                    .record_run(session, Some(result.clone()), &candidates)
                    .await?;
                trace.advance(MatchState::AwaitingFeedback);
                Ok(RunOutcome::Matched {
                    session_id: session,
                    result,
                    candidates,
                    cache_hit,
                    trace,
                })
            }
            MatchOutcome::NoConfidentMatch {
                candidates,
                threshold,
            } => {
                self.inner
                    .sessions
                    .record_run(session, None, &candidates)
                    .await?;
                Ok(RunOutcome::NoConfidentMatch {
                    session_id: session,
                    candidates,
                    threshold,
                    trace,
                })
            }
        }
    }

    // ── Batch ─────────────────────────────────────────────────

    /// Run every intent in its own session, at most `batch.workers` at a
    /// time. Items come back in input order.
    pub async fn run_batch(&self, intents: Vec<CallIntent>, options: RunOptions) -> Vec<BatchItem> {
        tracing::info!(
            intents = intents.len(),
            workers = self.inner.config.batch.workers,
            "Starting batch"
        );

        let handles: Vec<_> = intents
            .into_iter()
            .enumerate()
            .map(|(index, intent)| {
                let pipeline = self.clone();
                let options = options.clone();
                tokio::spawn(async move { pipeline.batch_item(index, intent, options).await })
            })
            .collect();

        let mut items = Vec::with_capacity(handles.len());
        for (index, handle) in handles.into_iter().enumerate() {
            let item = handle.await.unwrap_or_else(|e| {
                tracing::error!(index, error = %e, "Batch worker failed");
                BatchItem {
                    index,
                    session_id: None,
                    outcome: None,
                    error: Some(format!("worker failed: {e}")),
                }
            });
            items.push(item);
        }
        items
    }

    async fn batch_item(&self, index: usize, intent: CallIntent, options: RunOptions) -> BatchItem {
        let Ok(_permit) = Arc::clone(&self.inner.workers).acquire_owned().await else {
            return BatchItem {
                index,
                session_id: None,
                outcome: None,
                error: Some("worker pool closed".into()),
            };
        };

        let session_id = self.start_session().await;
        match self.run(session_id, intent, options).await {
            Ok(outcome) => BatchItem {
                index,
                session_id: Some(session_id),
                outcome: Some(outcome),
                error: None,
            },
            Err(e) => {
                tracing::warn!(index, error = %e, "Batch item failed");
                BatchItem {
                    index,
                    session_id: Some(session_id),
                    outcome: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
