//! Shared test harness for E2E integration tests.
//!
//! Drives the real router over the sample catalog, or a pipeline wired to
//! mock capabilities when a test needs to control the signals.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use lc_engine::mock::{MockJudge, MockVectorSearch};
use lc_engine::{EngineConfig, JudgmentEngine, Pipeline, VectorSearch};
use lc_server::build_router;
use lc_server::state::{AppState, sample_catalog};

/// HTTP harness over the sample catalog (lexical retrieval, heuristic judge).
pub struct TestHarness {
    pub state: AppState,
    pub router: Router,
}

impl TestHarness {
    pub fn new() -> Self {
        let state = AppState::with_sample_catalog().unwrap();
        let router = build_router(state.clone());
        Self { state, router }
    }

    pub async fn request(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    pub async fn create_session(&self) -> String {
        let (status, json) = self.request("POST", "/api/v1/sessions", None).await;
        assert_eq!(status, StatusCode::OK);
        json["session_id"].as_str().unwrap().to_string()
    }

    /// POST an intent to a fresh session; returns the session id and outcome.
    pub async fn run_intent(&self, intent: Value) -> (String, Value) {
        let session = self.create_session().await;
        let (status, outcome) = self
            .request(
                "POST",
                &format!("/api/v1/sessions/{session}/runs"),
                Some(json!({ "intent": intent })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "run failed: {outcome}");
        (session, outcome)
    }

    pub async fn reject(&self, session: &str, reason: Option<&str>) -> (StatusCode, Value) {
        self.request(
            "POST",
            &format!("/api/v1/sessions/{session}/reject"),
            Some(json!({ "reason": reason })),
        )
        .await
    }

    pub async fn accept(&self, session: &str) -> (StatusCode, Value) {
        self.request("POST", &format!("/api/v1/sessions/{session}/accept"), None)
            .await
    }

    pub async fn get_session(&self, session: &str) -> (StatusCode, Value) {
        self.request("GET", &format!("/api/v1/sessions/{session}"), None)
            .await
    }
}

/// Pipeline over the sample catalog with mock capabilities.
pub struct MockPipeline {
    pub pipeline: Pipeline,
    pub vector: Arc<MockVectorSearch>,
    pub judge: Arc<MockJudge>,
}

impl MockPipeline {
    pub fn new(vector: MockVectorSearch, judge: MockJudge, config: EngineConfig) -> Self {
        let vector = Arc::new(vector);
        let judge = Arc::new(judge);
        let pipeline = Pipeline::new(
            Arc::new(sample_catalog().unwrap()),
            Some(Arc::clone(&vector) as Arc<dyn VectorSearch>),
            Some(Arc::clone(&judge) as Arc<dyn JudgmentEngine>),
            config,
        )
        .unwrap();
        Self {
            pipeline,
            vector,
            judge,
        }
    }

    /// Vector search ranking every sample endpoint, answering after `delay`.
    pub fn slow_vector(delay: Duration) -> MockVectorSearch {
        MockVectorSearch::with_results(vec![
            ("get_users", 0.9),
            ("get_users_id", 0.7),
            ("post_users", 0.6),
            ("delete_users_id", 0.5),
            ("get_orders", 0.2),
        ])
        .with_delay(delay)
    }
}
