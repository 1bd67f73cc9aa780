//! Feedback sessions: accept / reject with bounded re-search.
//!
//! Each session owns its own `FeedbackState`. A rejection excludes the
//! rejected endpoint, relaxes the threshold one step and asks for a retry,
//! until the attempt budget is spent and the session is exhausted.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use lc_protocol::{CallIntent, Candidate, FeedbackState, PipelineResult, SessionId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::config::FeedbackConfig;
use crate::error::SessionError;
use crate::matcher::RunOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No result awaiting feedback (new, or last run found no match).
    Active,
    AwaitingFeedback,
    Done,
    Exhausted,
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Exhausted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::AwaitingFeedback => "awaiting_feedback",
            Self::Done => "done",
            Self::Exhausted => "exhausted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    pub endpoint_id: String,
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

/// Everything a session learned before it ran out of attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExhaustionHistory {
    pub intent_fingerprint: String,
    pub excluded_endpoint_ids: BTreeSet<String>,
    /// Every candidate proposed across attempts, latest scores per id.
    pub candidates_seen: Vec<Candidate>,
    pub last_rejected: Option<String>,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub id: SessionId,
    pub phase: SessionPhase,
    pub state: FeedbackState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<CallIntent>,
    pub options: RunOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<PipelineResult>,
    pub candidates_seen: Vec<Candidate>,
    pub rejections: Vec<Rejection>,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    last_active: Instant,
}

impl Session {
    fn new(id: SessionId, threshold: f64) -> Self {
        Self {
            id,
            phase: SessionPhase::Active,
            state: FeedbackState::new(threshold),
            intent: None,
            options: RunOptions::default(),
            current: None,
            candidates_seen: Vec::new(),
            rejections: Vec::new(),
            created_at: Utc::now(),
            last_active: Instant::now(),
        }
    }

    fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.phase.is_terminal() {
            return Err(SessionError::Terminal {
                id: self.id,
                phase: self.phase.as_str().to_string(),
            });
        }
        Ok(())
    }

    fn remember(&mut self, candidates: &[Candidate]) {
        for candidate in candidates {
            match self
                .candidates_seen
                .iter_mut()
                .find(|c| c.endpoint_id == candidate.endpoint_id)
            {
                Some(seen) => *seen = candidate.clone(),
                None => self.candidates_seen.push(candidate.clone()),
            }
        }
    }

    fn history(&self) -> ExhaustionHistory {
        ExhaustionHistory {
            intent_fingerprint: self
                .intent
                .as_ref()
                .map(CallIntent::fingerprint)
                .unwrap_or_default(),
            excluded_endpoint_ids: self.state.excluded_endpoint_ids.clone(),
            candidates_seen: self.candidates_seen.clone(),
            last_rejected: self.rejections.last().map(|r| r.endpoint_id.clone()),
            reasons: self
                .rejections
                .iter()
                .filter_map(|r| r.reason.clone())
                .collect(),
        }
    }
}

/// What the pipeline should do after a rejection.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectDecision {
    Retry {
        intent: CallIntent,
        options: RunOptions,
        state: FeedbackState,
        rejected: PipelineResult,
    },
    Exhausted {
        history: ExhaustionHistory,
        rejected: PipelineResult,
    },
}

pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, Session>>,
    config: FeedbackConfig,
    initial_threshold: f64,
}

impl SessionManager {
    pub fn new(config: FeedbackConfig, initial_threshold: f64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
            initial_threshold,
        }
    }

    pub async fn create(&self) -> SessionId {
        let id = SessionId::new();
        let mut sessions = self.sessions.write().await;
        self.evict(&mut sessions);
        sessions.insert(id, Session::new(id, self.initial_threshold));
        tracing::debug!(session = %id, "Created feedback session");
        id
    }

    /// Drop idle sessions, then make room for one more under `max_sessions`.
    ///
    /// Finished sessions are evicted before open ones, least recently active
    /// first.
    fn evict(&self, sessions: &mut HashMap<SessionId, Session>) {
        if self.config.session_ttl_secs > 0 {
            let ttl = Duration::from_secs(self.config.session_ttl_secs);
            let before = sessions.len();
            sessions.retain(|_, s| s.last_active.elapsed() < ttl);
            let expired = before - sessions.len();
            if expired > 0 {
                tracing::debug!(expired, "Expired idle sessions");
            }
        }

        let capacity = self.config.max_sessions;
        if capacity == 0 {
            return;
        }
        while sessions.len() >= capacity {
            let Some(victim) = sessions
                .values()
                .min_by_key(|s| (!s.phase.is_terminal(), s.last_active))
                .map(|s| s.id)
            else {
                break;
            };
            sessions.remove(&victim);
            tracing::debug!(session = %victim, "Evicted session at capacity");
        }
    }

    pub async fn get(&self, id: SessionId) -> Result<Session, SessionError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(SessionError::NotFound(id))
    }

    /// Sessions currently held.
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Prepare a run of `intent`; returns the state retrieval must honour.
    ///
    /// Running a different intent resets the session's feedback state.
    pub async fn begin_run(
        &self,
        id: SessionId,
        intent: &CallIntent,
        options: &RunOptions,
    ) -> Result<FeedbackState, SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or(SessionError::NotFound(id))?;
        session.ensure_open()?;
        session.touch();

        let same_intent = session
            .intent
            .as_ref()
            .is_some_and(|previous| previous.fingerprint() == intent.fingerprint());
        if !same_intent {
            session.state = FeedbackState::new(self.initial_threshold);
            session.candidates_seen.clear();
            session.rejections.clear();
        }
        session.intent = Some(intent.clone());
        session.options = options.clone();
        session.current = None;
        session.phase = SessionPhase::Active;
        Ok(session.state.clone())
    }

    /// Record the outcome of a run. `None` means no confident match.
    pub async fn record_run(
        &self,
        id: SessionId,
        result: Option<PipelineResult>,
        candidates: &[Candidate],
    ) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or(SessionError::NotFound(id))?;
        session.touch();
        session.remember(candidates);
        session.phase = if result.is_some() {
            SessionPhase::AwaitingFeedback
        } else {
            SessionPhase::Active
        };
        session.current = result;
        Ok(())
    }

    pub async fn accept(&self, id: SessionId) -> Result<PipelineResult, SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or(SessionError::NotFound(id))?;
        session.ensure_open()?;
        let result = session.current.clone().ok_or(SessionError::NoResult(id))?;
        session.phase = SessionPhase::Done;
        session.touch();
        tracing::info!(
            session = %id,
            endpoint = %result.selected_endpoint_id,
            attempt = result.attempt,
            "Result accepted"
        );
        Ok(result)
    }

    /// Reject the current result.
    ///
    /// Once `max_attempts` rejections have triggered retries, the next one
    /// exhausts the session without excluding anything further.
    pub async fn reject(
        &self,
        id: SessionId,
        reason: Option<String>,
    ) -> Result<RejectDecision, SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or(SessionError::NotFound(id))?;
        session.ensure_open()?;
        let rejected = session.current.take().ok_or(SessionError::NoResult(id))?;
        session.touch();

        session.rejections.push(Rejection {
            endpoint_id: rejected.selected_endpoint_id.clone(),
            attempt: rejected.attempt,
            reason,
            at: Utc::now(),
        });

        if session.state.attempt_count >= self.config.max_attempts {
            session.phase = SessionPhase::Exhausted;
            tracing::info!(
                session = %id,
                attempts = session.state.attempt_count,
                "Feedback attempts exhausted"
            );
            return Ok(RejectDecision::Exhausted {
                history: session.history(),
                rejected,
            });
        }

        let state = &mut session.state;
        state
            .excluded_endpoint_ids
            .insert(rejected.selected_endpoint_id.clone());
        state.similarity_threshold = (state.similarity_threshold - self.config.threshold_step)
            .max(self.config.threshold_floor);
        state.attempt_count += 1;
        session.phase = SessionPhase::Active;

        tracing::info!(
            session = %id,
            rejected = %rejected.selected_endpoint_id,
            attempt = session.state.attempt_count,
            threshold = session.state.similarity_threshold,
            "Result rejected, retrying"
        );

        let intent = session.intent.clone().ok_or(SessionError::NoResult(id))?;
        Ok(RejectDecision::Retry {
            intent,
            options: session.options.clone(),
            state: session.state.clone(),
            rejected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lc_protocol::{HttpMethod, ValidationReport};

    fn manager() -> SessionManager {
        SessionManager::new(FeedbackConfig::default(), 0.5)
    }

    fn result_for(intent: &CallIntent, endpoint: &str, attempt: u32) -> PipelineResult {
        PipelineResult {
            intent_fingerprint: intent.fingerprint(),
            selected_endpoint_id: endpoint.into(),
            endpoint_content_hash: "h".into(),
            validation_report: ValidationReport::valid(),
            curl_command: "curl".into(),
            is_executable: true,
            placeholders: Vec::new(),
            confidence: 0.8,
            degraded: false,
            attempt,
            created_at: Utc::now(),
        }
    }

    async fn run_once(m: &SessionManager, id: SessionId, intent: &CallIntent, endpoint: &str, attempt: u32) {
        m.begin_run(id, intent, &RunOptions::default()).await.unwrap();
        m.record_run(id, Some(result_for(intent, endpoint, attempt)), &[])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn accept_marks_done() {
        let m = manager();
        let id = m.create().await;
        let intent = CallIntent::new(HttpMethod::Get, "/users");
        run_once(&m, id, &intent, "get_users", 1).await;

        let accepted = m.accept(id).await.unwrap();
        assert_eq!(accepted.selected_endpoint_id, "get_users");
        assert_eq!(m.get(id).await.unwrap().phase, SessionPhase::Done);

        let err = m.reject(id, None).await.unwrap_err();
        assert!(matches!(err, SessionError::Terminal { .. }));
    }

    #[tokio::test]
    async fn reject_excludes_and_relaxes_threshold() {
        let m = manager();
        let id = m.create().await;
        let intent = CallIntent::new(HttpMethod::Get, "/users");
        run_once(&m, id, &intent, "get_users", 1).await;

        match m.reject(id, Some("wrong resource".into())).await.unwrap() {
            RejectDecision::Retry { state, rejected, .. } => {
                assert!(state.is_excluded("get_users"));
                assert_eq!(state.attempt_count, 1);
                assert!((state.similarity_threshold - 0.45).abs() < 1e-9);
                assert_eq!(rejected.attempt, 1);
            }
            other => panic!("expected retry, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn threshold_never_drops_below_floor() {
        let m = SessionManager::new(
            FeedbackConfig {
                max_attempts: 10,
                threshold_step: 0.2,
                threshold_floor: 0.3,
                ..FeedbackConfig::default()
            },
            0.5,
        );
        let id = m.create().await;
        let intent = CallIntent::new(HttpMethod::Get, "/users");
        for (attempt, endpoint) in ["a", "b", "c"].iter().enumerate() {
            run_once(&m, id, &intent, endpoint, attempt as u32 + 1).await;
            m.reject(id, None).await.unwrap();
        }
        let session = m.get(id).await.unwrap();
        assert!((session.state.similarity_threshold - 0.3).abs() < 1e-9);
    }

    #[tokio::test]
    async fn fourth_rejection_exhausts_with_three_exclusions() {
        let m = manager();
        let id = m.create().await;
        let intent = CallIntent::new(HttpMethod::Get, "/users");

        for (attempt, endpoint) in ["e1", "e2", "e3"].iter().enumerate() {
            run_once(&m, id, &intent, endpoint, attempt as u32 + 1).await;
            assert!(matches!(
                m.reject(id, Some(format!("not {endpoint}"))).await.unwrap(),
                RejectDecision::Retry { .. }
            ));
        }

        run_once(&m, id, &intent, "e4", 4).await;
        match m.reject(id, Some("still wrong".into())).await.unwrap() {
            RejectDecision::Exhausted { history, .. } => {
                assert_eq!(
                    history.excluded_endpoint_ids,
                    BTreeSet::from(["e1".to_string(), "e2".to_string(), "e3".to_string()])
                );
                assert_eq!(history.last_rejected.as_deref(), Some("e4"));
                assert_eq!(history.reasons.len(), 4);
                assert_eq!(history.intent_fingerprint, intent.fingerprint());
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
        assert_eq!(m.get(id).await.unwrap().phase, SessionPhase::Exhausted);
    }

    #[tokio::test]
    async fn errors_for_unknown_and_empty_sessions() {
        let m = manager();
        let missing = SessionId::new();
        assert_eq!(m.accept(missing).await.unwrap_err(), SessionError::NotFound(missing));

        let id = m.create().await;
        assert_eq!(m.reject(id, None).await.unwrap_err(), SessionError::NoResult(id));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_expire() {
        let m = manager();
        let idle = m.create().await;
        tokio::time::advance(Duration::from_secs(3599)).await;
        let recent = m.create().await;
        assert_eq!(m.count().await, 2);

        tokio::time::advance(Duration::from_secs(2)).await;
        m.create().await;
        assert_eq!(m.count().await, 2);
        assert_eq!(m.get(idle).await.unwrap_err(), SessionError::NotFound(idle));
        assert!(m.get(recent).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_evicts_finished_sessions_first() {
        let m = SessionManager::new(
            FeedbackConfig {
                max_sessions: 2,
                ..FeedbackConfig::default()
            },
            0.5,
        );
        let open = m.create().await;
        tokio::time::advance(Duration::from_secs(1)).await;
        let done = m.create().await;
        let intent = CallIntent::new(HttpMethod::Get, "/users");
        run_once(&m, done, &intent, "get_users", 1).await;
        m.accept(done).await.unwrap();

        let third = m.create().await;
        assert_eq!(m.count().await, 2);
        assert!(m.get(done).await.is_err());
        assert!(m.get(open).await.is_ok());

        // Only open sessions left: the least recently active goes
        m.create().await;
        assert!(m.get(open).await.is_err());
        assert!(m.get(third).await.is_ok());
    }

    #[tokio::test]
    async fn new_intent_resets_feedback_state() {
        let m = manager();
        let id = m.create().await;
        let first = CallIntent::new(HttpMethod::Get, "/users");
        run_once(&m, id, &first, "get_users", 1).await;
        m.reject(id, None).await.unwrap();

        let second = CallIntent::new(HttpMethod::Get, "/orders");
        let state = m.begin_run(id, &second, &RunOptions::default()).await.unwrap();
        assert!(state.excluded_endpoint_ids.is_empty());
        assert_eq!(state.attempt_count, 0);
    }
}
