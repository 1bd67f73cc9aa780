//! Confidence scoring: judge retrieved candidates and rank them.
//!
//! Each candidate is judged at most once (rate-limit retries aside). Judged
//! candidates fuse both signals; unjudged ones keep a discounted retrieval
//! score and always rank below judged ones.

use std::sync::Arc;
use std::time::Duration;

use lc_protocol::{CallIntent, Candidate, EndpointSpec};

use crate::capability::{CapabilityError, Judgment, JudgmentEngine};
use crate::catalog::SpecCatalog;
use crate::config::ScoringConfig;

pub struct ConfidenceScorer {
    catalog: Arc<dyn SpecCatalog>,
    judge: Option<Arc<dyn JudgmentEngine>>,
    config: ScoringConfig,
}

impl ConfidenceScorer {
    pub fn new(
        catalog: Arc<dyn SpecCatalog>,
        judge: Option<Arc<dyn JudgmentEngine>>,
        config: ScoringConfig,
    ) -> Self {
        Self {
            catalog,
            judge,
            config,
        }
    }

    /// Judge, fuse and rank `candidates`. Never fails.
    pub async fn score(&self, intent: &CallIntent, candidates: Vec<Candidate>) -> Vec<Candidate> {
        let mut scored = Vec::with_capacity(candidates.len());
        for mut candidate in candidates {
            let judgment = match self.catalog.get_by_id(&candidate.endpoint_id) {
                Some(endpoint) => self.judge_once(intent, &endpoint).await,
                None => None,
            };
            self.apply(&mut candidate, judgment);
            scored.push(candidate);
        }
        self.rank(intent, &mut scored);
        scored
    }

    /// Fill in judgment and combined score.
    fn apply(&self, candidate: &mut Candidate, judgment: Option<Judgment>) {
        match judgment {
            Some(j) => {
                let score = j.score.clamp(0.0, 1.0);
                candidate.judgment_score = Some(score);
                candidate.combined_score = (self.config.retrieval_weight
                    * candidate.retrieval_score
                    + self.config.judgment_weight * score)
                    .clamp(0.0, 1.0);
                candidate.rationale = j.rationale;
            }
            None => {
                candidate.judgment_score = None;
                candidate.combined_score =
                    (candidate.retrieval_score * self.config.degradation_factor).clamp(0.0, 1.0);
            }
        }
    }

    /// One judgment, retrying rate limits with exponential backoff.
    ///
    /// `None` means the candidate stays unjudged.
    async fn judge_once(&self, intent: &CallIntent, endpoint: &EndpointSpec) -> Option<Judgment> {
        let judge = self.judge.as_ref()?;
        let timeout = Duration::from_millis(self.config.judgment_timeout_ms);
        let mut retries = 0u32;

        loop {
            let outcome = tokio::time::timeout(timeout, judge.judge(intent, endpoint)).await;
            match outcome {
                Ok(Ok(judgment)) if judgment.score.is_finite() => return Some(judgment),
                Ok(Ok(_)) => {
                    tracing::warn!(endpoint = %endpoint.id, tier = judge.tier_name(), "Judgment returned a non-finite score");
                    return None;
                }
                Ok(Err(CapabilityError::RateLimited { retry_after_ms })) => {
                    if retries >= self.config.max_rate_limit_retries {
                        tracing::warn!(
                            endpoint = %endpoint.id,
                            retries,
                            "Judgment still rate limited, scoring without it"
                        );
                        return None;
                    }
                    let wait = backoff_ms(self.config.backoff_base_ms, retries, retry_after_ms);
                    tracing::debug!(endpoint = %endpoint.id, wait_ms = wait, "Judgment rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(wait)).await;
                    retries += 1;
                }
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, endpoint = %endpoint.id, tier = judge.tier_name(), "Judgment unavailable");
                    return None;
                }
                Err(_) => {
                    tracing::warn!(
                        endpoint = %endpoint.id,
                        timeout_ms = self.config.judgment_timeout_ms,
                        "Judgment timed out"
                    );
                    return None;
                }
            }
        }
    }

    /// Deterministic ranking.
    ///
    /// Order: judged before unjudged, combined score descending (neighbouring
    /// scores within `tie_epsilon` share a tier), smaller segment-count gap to
    /// the path hint, then endpoint id ascending.
    pub fn rank(&self, intent: &CallIntent, candidates: &mut [Candidate]) {
        let hint_len = intent.path_tokens().len();
        let eps = self.config.tie_epsilon;
        let gap = |id: &str| {
            self.catalog
                .get_by_id(id)
                .map(|spec| spec.path_segments().len().abs_diff(hint_len))
                .unwrap_or(usize::MAX)
        };

        candidates.sort_by(|a, b| {
            b.is_judged()
                .cmp(&a.is_judged())
                .then_with(|| b.combined_score.total_cmp(&a.combined_score))
        });

        let mut tier = 0usize;
        let mut keyed = Vec::with_capacity(candidates.len());
        for (i, candidate) in candidates.iter().enumerate() {
            if let Some(prev) = i.checked_sub(1).map(|p| &candidates[p]) {
                if prev.is_judged() != candidate.is_judged()
                    || prev.combined_score - candidate.combined_score > eps
                {
                    tier += 1;
                }
            }
            keyed.push((tier, gap(&candidate.endpoint_id), candidate.clone()));
        }

        keyed.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then(a.1.cmp(&b.1))
                .then_with(|| a.2.endpoint_id.cmp(&b.2.endpoint_id))
        });
        for (slot, (_, _, candidate)) in candidates.iter_mut().zip(keyed) {
            *slot = candidate;
        }
    }
}

/// `base * 2^retries`, or the server's hint when longer.
fn backoff_ms(base_ms: u64, retries: u32, retry_after_ms: Option<u64>) -> u64 {
    let exponential = base_ms.saturating_mul(1u64 << retries.min(16));
    exponential.max(retry_after_ms.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::mock::MockJudge;
    use lc_protocol::{HttpMethod, RetrievalSource};

    fn catalog() -> Arc<dyn SpecCatalog> {
        Arc::new(
            InMemoryCatalog::new(vec![
                EndpointSpec::new(HttpMethod::Get, "/users"),
                EndpointSpec::new(HttpMethod::Get, "/users/{id}"),
                EndpointSpec::new(HttpMethod::Get, "/accounts/{id}/users"),
            ])
            .unwrap(),
        )
    }

    fn scorer(judge: Option<MockJudge>) -> (ConfidenceScorer, Option<Arc<MockJudge>>) {
        let judge = judge.map(Arc::new);
        let scorer = ConfidenceScorer::new(
            catalog(),
            judge.clone().map(|j| j as Arc<dyn JudgmentEngine>),
            ScoringConfig::default(),
        );
        (scorer, judge)
    }

    fn candidate(id: &str, score: f64) -> Candidate {
        Candidate::retrieved(id, score, RetrievalSource::Lexical)
    }

    #[tokio::test]
    async fn combined_score_fuses_signals() {
        let (scorer, _) = scorer(Some(MockJudge::new().with_score("get_users", 0.9)));
        let out = scorer
            .score(&CallIntent::new(HttpMethod::Get, "/users"), vec![candidate("get_users", 0.5)])
            .await;
        // 0.4 * 0.5 + 0.6 * 0.9
        assert!((out[0].combined_score - 0.74).abs() < 1e-9);
        assert_eq!(out[0].judgment_score, Some(0.9));
    }

    #[tokio::test]
    async fn missing_judge_degrades_every_candidate() {
        let (scorer, _) = scorer(None);
        let out = scorer
            .score(&CallIntent::new(HttpMethod::Get, "/users"), vec![candidate("get_users", 0.8)])
            .await;
        assert!((out[0].combined_score - 0.4).abs() < 1e-9);
        assert!(!out[0].is_judged());
    }

    #[tokio::test]
    async fn degraded_never_outranks_judged() {
        let judge = MockJudge::new()
            .with_score("get_users_id", 0.1)
            .push_response("get_users", Err(CapabilityError::Unavailable("down".into())));
        let (scorer, _) = scorer(Some(judge));
        let out = scorer
            .score(
                &CallIntent::new(HttpMethod::Get, "/users"),
                vec![candidate("get_users", 1.0), candidate("get_users_id", 0.2)],
            )
            .await;
        // get_users: 0.5 unjudged; get_users_id: 0.4*0.2 + 0.6*0.1 = 0.14 judged
        assert_eq!(out[0].endpoint_id, "get_users_id");
        assert_eq!(out[1].endpoint_id, "get_users");
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_is_retried_with_backoff() {
        let judge = MockJudge::new()
            .with_score("get_users", 0.8)
            .push_response("get_users", Err(CapabilityError::RateLimited { retry_after_ms: None }))
            .push_response("get_users", Err(CapabilityError::RateLimited { retry_after_ms: Some(1000) }));
        let (scorer, judge) = scorer(Some(judge));

        let started = tokio::time::Instant::now();
        let out = scorer
            .score(&CallIntent::new(HttpMethod::Get, "/users"), vec![candidate("get_users", 0.5)])
            .await;

        assert_eq!(out[0].judgment_score, Some(0.8));
        assert_eq!(judge.unwrap().call_count(), 3);
        // 200ms, then max(400ms, 1000ms)
        assert!(started.elapsed() >= Duration::from_millis(1200));
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_rate_limit_gives_up() {
        let judge = MockJudge::failing(CapabilityError::RateLimited { retry_after_ms: None });
        let (scorer, judge) = scorer(Some(judge));
        let out = scorer
            .score(&CallIntent::new(HttpMethod::Get, "/users"), vec![candidate("get_users", 0.6)])
            .await;
        assert!(!out[0].is_judged());
        assert!((out[0].combined_score - 0.3).abs() < 1e-9);
        // first call plus three retries
        assert_eq!(judge.unwrap().call_count(), 4);
    }

    #[test]
    fn ties_prefer_closer_shape_then_id() {
        let (scorer, _) = scorer(None);
        let intent = CallIntent::new(HttpMethod::Get, "/users/7");
        let mut candidates = vec![
            candidate("get_accounts_id_users", 0.6),
            candidate("get_users", 0.6),
            candidate("get_users_id", 0.6),
        ];
        for c in &mut candidates {
            scorer.apply(c, None);
        }
        scorer.rank(&intent, &mut candidates);
        let ids: Vec<&str> = candidates.iter().map(|c| c.endpoint_id.as_str()).collect();
        // gaps: users_id 0, users 1, accounts_id_users 1
        assert_eq!(ids, vec!["get_users_id", "get_accounts_id_users", "get_users"]);
    }

    #[test]
    fn ranking_is_stable_across_input_orders() {
        let (scorer, _) = scorer(None);
        let intent = CallIntent::new(HttpMethod::Get, "/users");
        let base = vec![
            candidate("get_users_id", 0.7),
            candidate("get_users", 0.7),
            candidate("get_accounts_id_users", 0.9),
        ];
        let mut forward = base.clone();
        let mut reversed: Vec<Candidate> = base.into_iter().rev().collect();
        scorer.rank(&intent, &mut forward);
        scorer.rank(&intent, &mut reversed);
        assert_eq!(forward, reversed);
        assert_eq!(forward[0].endpoint_id, "get_accounts_id_users");
    }

    #[test]
    fn near_equal_scores_tie_across_any_boundary() {
        let (scorer, _) = scorer(None);
        let intent = CallIntent::new(HttpMethod::Get, "/users");
        let base = 0.5 + 0.45e-9;
        let mut candidates = vec![candidate("get_users_id", 0.5), candidate("get_users", 0.5)];
        for c in &mut candidates {
            scorer.apply(c, None);
        }
        // 0.1e-9 apart, straddling a multiple of the default epsilon
        candidates[0].combined_score = base + 0.1e-9;
        candidates[1].combined_score = base;
        scorer.rank(&intent, &mut candidates);
        assert_eq!(candidates[0].endpoint_id, "get_users");

        // A clear gap still orders by score
        candidates[0].combined_score = 0.2;
        scorer.rank(&intent, &mut candidates);
        assert_eq!(candidates[0].endpoint_id, "get_users_id");
    }

    #[test]
    fn backoff_grows_and_honours_retry_after() {
        assert_eq!(backoff_ms(200, 0, None), 200);
        assert_eq!(backoff_ms(200, 2, None), 800);
        assert_eq!(backoff_ms(200, 0, Some(5000)), 5000);
    }
}
