//! Tiered judgment: model first, heuristic fallback.
//!
//! Rate limiting is passed through untouched so the scorer's backoff can
//! retry the primary tier instead of silently downgrading.

use async_trait::async_trait;
use lc_protocol::{CallIntent, EndpointSpec};

use crate::capability::{CapabilityError, Judgment, JudgmentEngine};

/// Composite judge that tries the primary tier, then the fallback.
pub struct TieredJudge {
    primary: Box<dyn JudgmentEngine>,
    fallback: Box<dyn JudgmentEngine>,
}

impl TieredJudge {
    pub fn new(primary: Box<dyn JudgmentEngine>, fallback: Box<dyn JudgmentEngine>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl JudgmentEngine for TieredJudge {
    async fn judge(
        &self,
        intent: &CallIntent,
        endpoint: &EndpointSpec,
    ) -> Result<Judgment, CapabilityError> {
        match self.primary.judge(intent, endpoint).await {
            Ok(judgment) => Ok(judgment),
            Err(e @ CapabilityError::RateLimited { .. }) => Err(e),
            Err(e) => {
                tracing::debug!(
                    error = %e,
                    primary = self.primary.tier_name(),
                    fallback = self.fallback.tier_name(),
                    "primary judgment failed, falling back"
                );
                self.fallback.judge(intent, endpoint).await
            }
        }
    }

    fn tier_name(&self) -> &str {
        "tiered"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockJudge;
    use lc_protocol::HttpMethod;

    fn sample() -> (CallIntent, EndpointSpec) {
        (
            CallIntent::new(HttpMethod::Get, "/users"),
            EndpointSpec::new(HttpMethod::Get, "/users"),
        )
    }

    #[tokio::test]
    async fn primary_hit_skips_fallback() {
        let tiered = TieredJudge::new(
            Box::new(MockJudge::new().with_default(0.9)),
            Box::new(MockJudge::new().with_default(0.1)),
        );
        let (intent, endpoint) = sample();
        let j = tiered.judge(&intent, &endpoint).await.unwrap();
        assert!((j.score - 0.9).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn unavailable_primary_falls_back() {
        let tiered = TieredJudge::new(
            Box::new(MockJudge::failing(CapabilityError::Unavailable("down".into()))),
            Box::new(MockJudge::new().with_default(0.4)),
        );
        let (intent, endpoint) = sample();
        let j = tiered.judge(&intent, &endpoint).await.unwrap();
        assert!((j.score - 0.4).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn rate_limit_is_not_masked() {
        let tiered = TieredJudge::new(
            Box::new(MockJudge::failing(CapabilityError::RateLimited {
                retry_after_ms: Some(50),
            })),
            Box::new(MockJudge::new()),
        );
        let (intent, endpoint) = sample();
        let err = tiered.judge(&intent, &endpoint).await.unwrap_err();
        assert!(matches!(err, CapabilityError::RateLimited { .. }));
        assert_eq!(tiered.tier_name(), "tiered");
    }
}
