//! Scripted capability backends for tests and local development.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use lc_protocol::{CallIntent, EndpointSpec};

use crate::capability::{CapabilityError, Judgment, JudgmentEngine, VectorSearch};

// ── Vector search ─────────────────────────────────────────────

/// Vector search returning a fixed ranking (or a fixed error).
pub struct MockVectorSearch {
    results: Result<Vec<(String, f64)>, CapabilityError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockVectorSearch {
    pub fn with_results(results: Vec<(&str, f64)>) -> Self {
        Self {
            results: Ok(results
                .into_iter()
                .map(|(id, score)| (id.to_string(), score))
                .collect()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: CapabilityError) -> Self {
        Self {
            results: Err(error),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep before answering (to exercise timeouts).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorSearch for MockVectorSearch {
    async fn search(
        &self,
        _query_text: &str,
        top_k: usize,
        exclude_ids: &BTreeSet<String>,
    ) -> Result<Vec<(String, f64)>, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let results = self.results.clone()?;
        Ok(results
            .into_iter()
            .filter(|(id, _)| !exclude_ids.contains(id))
            .take(top_k)
            .collect())
    }

    fn backend_name(&self) -> &str {
        "mock"
    }
}

// ── Judgment ──────────────────────────────────────────────────

/// Judge with per-endpoint scripted scores.
///
/// Queued responses for an endpoint are consumed first (to script
/// rate-limit sequences); afterwards the fixed score applies, falling back
/// to `default`.
pub struct MockJudge {
    scores: HashMap<String, f64>,
    queued: Mutex<HashMap<String, VecDeque<Result<Judgment, CapabilityError>>>>,
    default: Result<f64, CapabilityError>,
    calls: Mutex<Vec<String>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockJudge {
    pub fn new() -> Self {
        Self {
            scores: HashMap::new(),
            queued: Mutex::new(HashMap::new()),
            default: Ok(0.5),
            calls: Mutex::new(Vec::new()),
            delay: None,
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Judge that fails every call with `error`.
    pub fn failing(error: CapabilityError) -> Self {
        Self {
            default: Err(error),
            ..Self::new()
        }
    }

    pub fn with_score(mut self, endpoint_id: &str, score: f64) -> Self {
        self.scores.insert(endpoint_id.to_string(), score);
        self
    }

    pub fn with_default(mut self, score: f64) -> Self {
        self.default = Ok(score);
        self
    }

    /// Hold every judgment for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a one-shot response for an endpoint.
    pub fn push_response(self, endpoint_id: &str, response: Result<Judgment, CapabilityError>) -> Self {
        if let Ok(mut queued) = self.queued.lock() {
            queued
                .entry(endpoint_id.to_string())
                .or_default()
                .push_back(response);
        }
        self
    }

    /// Endpoint ids judged so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }

    /// Most judgments ever outstanding at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for MockJudge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JudgmentEngine for MockJudge {
    async fn judge(
        &self,
        _intent: &CallIntent,
        endpoint: &EndpointSpec,
    ) -> Result<Judgment, CapabilityError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(endpoint.id.clone());
        }
        if let Some(delay) = self.delay {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }

        let queued = self
            .queued
            .lock()
            .ok()
            .and_then(|mut q| q.get_mut(&endpoint.id).and_then(|v| v.pop_front()));
        if let Some(response) = queued {
            return response;
        }

        let score = match self.scores.get(&endpoint.id) {
            Some(score) => *score,
            None => self.default.clone()?,
        };
        Ok(Judgment {
            score,
            rationale: format!("scripted score for {}", endpoint.id),
        })
    }

    fn tier_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lc_protocol::HttpMethod;

    #[tokio::test]
    async fn vector_mock_honours_exclusions_and_counts() {
        let mock = MockVectorSearch::with_results(vec![("a", 0.9), ("b", 0.8), ("c", 0.7)]);
        let exclude = BTreeSet::from(["a".to_string()]);
        let hits = mock.search("q", 1, &exclude).await.unwrap();
        assert_eq!(hits, vec![("b".to_string(), 0.8)]);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn judge_mock_consumes_queue_then_scores() {
        let judge = MockJudge::new()
            .with_score("get_users", 0.9)
            .push_response("get_users", Err(CapabilityError::RateLimited { retry_after_ms: None }));
        let intent = CallIntent::new(HttpMethod::Get, "/users");
        let endpoint = EndpointSpec::new(HttpMethod::Get, "/users");

        assert!(judge.judge(&intent, &endpoint).await.is_err());
        let j = judge.judge(&intent, &endpoint).await.unwrap();
        assert!((j.score - 0.9).abs() < f64::EPSILON);
        assert_eq!(judge.calls(), vec!["get_users", "get_users"]);
    }

    #[tokio::test]
    async fn failing_judge() {
        let judge = MockJudge::failing(CapabilityError::Unavailable("down".into()));
        let endpoint = EndpointSpec::new(HttpMethod::Get, "/users");
        let err = judge
            .judge(&CallIntent::from_text("x"), &endpoint)
            .await
            .unwrap_err();
        assert_eq!(err, CapabilityError::Unavailable("down".into()));
    }
}
