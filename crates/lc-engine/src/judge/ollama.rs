//! Ollama-backed judgment engine.
//!
//! Calls the local Ollama HTTP API (`/api/chat`, JSON mode) to rate how well
//! an endpoint fits an extracted call. Transport failures, non-2xx responses
//! and malformed output all map to `CapabilityError` so the scorer can fall
//! back to retrieval-only scoring.

use std::time::Duration;

use async_trait::async_trait;
use lc_protocol::{CallIntent, EndpointSpec};
use serde::{Deserialize, Serialize};

use crate::capability::{CapabilityError, Judgment, JudgmentEngine};

const SYSTEM_PROMPT: &str = r#"You are an API matching assistant. You receive an API call observed in a log and one candidate endpoint from an API specification. Judge how likely it is that the observed call is an invocation of that endpoint.

Consider:
- HTTP method agreement
- path structure (static segments must agree; path parameters match any value)
- query parameters, headers and body fields the endpoint declares
- the endpoint summary and tags when the observed call is free text

Respond with ONLY a JSON object (no markdown, no explanation):
{"score": <0.0-1.0>, "rationale": "<one sentence>"}

Use 0.0 when the endpoint clearly does not fit and 1.0 only for an unambiguous match."#;

/// Configuration for the local Ollama judgment endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Ollama HTTP API base URL.
    #[serde(default = "default_host")]
    pub host: String,
    /// Model to use for judgment.
    #[serde(default = "default_model")]
    pub model: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Whether Ollama judgment is enabled.
    #[serde(default)]
    pub enabled: bool,
}

fn default_host() -> String {
    "http://localhost:11434".into()
}
fn default_model() -> String {
    "llama3.2:3b".into()
}
fn default_timeout_secs() -> u64 {
    5
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            enabled: false,
        }
    }
}

/// Ollama chat API request body.
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    format: &'a str,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Ollama chat API response (only fields we need).
#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Raw model output before validation.
#[derive(Deserialize)]
struct RawJudgment {
    score: f64,
    #[serde(default)]
    rationale: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

/// Judgment engine backed by a local Ollama model.
pub struct OllamaJudge {
    client: reqwest::Client,
    config: OllamaConfig,
}

impl OllamaJudge {
    pub fn new(config: OllamaConfig) -> Result<Self, CapabilityError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CapabilityError::Unavailable(format!("http client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Names of the models the server has pulled.
    pub async fn list_models(&self) -> Result<Vec<String>, CapabilityError> {
        let url = format!("{}/api/tags", self.config.host);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        if !response.status().is_success() {
            return Err(CapabilityError::Unavailable(format!(
                "ollama returned {}",
                response.status()
            )));
        }
        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| CapabilityError::Unavailable(format!("bad tags response: {e}")))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Whether the server is reachable and has the configured model.
    pub async fn check_connection(&self) -> bool {
        match self.list_models().await {
            Ok(models) => models.iter().any(|m| m == &self.config.model),
            Err(e) => {
                tracing::warn!(error = %e, "ollama health check failed");
                false
            }
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> CapabilityError {
        if e.is_timeout() {
            CapabilityError::Timeout {
                timeout_ms: self.config.timeout_secs * 1000,
            }
        } else {
            CapabilityError::Unavailable(e.to_string())
        }
    }
}

/// Render the user message describing the observed call and the candidate.
fn build_prompt(intent: &CallIntent, endpoint: &EndpointSpec) -> String {
    let observed = serde_json::to_string_pretty(&serde_json::json!({
        "method": intent.method,
        "path": intent.path_template_hint,
        "query": intent.query_params,
        "headers": intent.headers.iter().map(|(n, _)| n).collect::<Vec<_>>(),
        "body": intent.body,
        "text": intent.raw_text,
    }))
    .unwrap_or_default();
    format!(
        "Observed call:\n{observed}\n\nCandidate endpoint:\n{}",
        endpoint.search_text()
    )
}

/// Parse `Retry-After` (seconds) into milliseconds.
fn retry_after_ms(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<f64>().ok())
        .map(|secs| (secs * 1000.0) as u64)
}

#[async_trait]
impl JudgmentEngine for OllamaJudge {
    async fn judge(
        &self,
        intent: &CallIntent,
        endpoint: &EndpointSpec,
    ) -> Result<Judgment, CapabilityError> {
        let url = format!("{}/api/chat", self.config.host);
        let prompt = build_prompt(intent, endpoint);

        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            format: "json",
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "ollama request failed");
                self.transport_error(e)
            })?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(CapabilityError::RateLimited {
                retry_after_ms: retry_after_ms(&response),
            });
        }
        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "ollama returned non-200");
            return Err(CapabilityError::Unavailable(format!(
                "ollama returned {}",
                response.status()
            )));
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            tracing::warn!(error = %e, "failed to parse ollama response body");
            CapabilityError::Unavailable(format!("bad response body: {e}"))
        })?;

        let content = chat
            .message
            .map(|m| m.content)
            .ok_or_else(|| CapabilityError::Unavailable("response has no message".into()))?;

        let raw: RawJudgment = serde_json::from_str(&content).map_err(|e| {
            tracing::warn!(error = %e, content = %content, "ollama returned invalid JSON");
            CapabilityError::Unavailable(format!("invalid judgment JSON: {e}"))
        })?;

        if !raw.score.is_finite() {
            return Err(CapabilityError::Unavailable("non-finite score".into()));
        }

        Ok(Judgment {
            score: raw.score.clamp(0.0, 1.0),
            rationale: raw.rationale,
        })
    }

    fn tier_name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lc_protocol::HttpMethod;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Helper: build an Ollama chat response body.
    fn ollama_response(content: &str) -> serde_json::Value {
        serde_json::json!({
            "model": "llama3.2:3b",
            "message": {
                "role": "assistant",
                "content": content
            },
            "done": true
        })
    }

    /// Build a judge pointed at the mock server.
    fn judge_for(server: &MockServer) -> OllamaJudge {
        OllamaJudge::new(OllamaConfig {
            host: server.uri(),
            model: "llama3.2:3b".into(),
            timeout_secs: 2,
            enabled: true,
        })
        .unwrap()
    }

    fn sample() -> (CallIntent, EndpointSpec) {
        (
            CallIntent::new(HttpMethod::Get, "/users/42"),
            EndpointSpec::new(HttpMethod::Get, "/users/{id}").with_summary("Fetch one user"),
        )
    }

    async fn mount(server: &MockServer, template: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(template)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn judge_parses_score() {
        let server = MockServer::start().await;
        let body = ollama_response(r#"{"score": 0.92, "rationale": "method and path agree"}"#);
        mount(&server, ResponseTemplate::new(200).set_body_json(&body)).await;

        let (intent, endpoint) = sample();
        let judgment = judge_for(&server).judge(&intent, &endpoint).await.unwrap();
        assert!((judgment.score - 0.92).abs() < f64::EPSILON);
        assert_eq!(judgment.rationale, "method and path agree");
    }

    #[tokio::test]
    async fn judge_clamps_out_of_range_score() {
        let server = MockServer::start().await;
        let body = ollama_response(r#"{"score": 1.7}"#);
        mount(&server, ResponseTemplate::new(200).set_body_json(&body)).await;

        let (intent, endpoint) = sample();
        let judgment = judge_for(&server).judge(&intent, &endpoint).await.unwrap();
        assert_eq!(judgment.score, 1.0);
    }

    #[tokio::test]
    async fn rate_limit_maps_retry_after() {
        let server = MockServer::start().await;
        mount(
            &server,
            ResponseTemplate::new(429).insert_header("retry-after", "2"),
        )
        .await;

        let (intent, endpoint) = sample();
        let err = judge_for(&server).judge(&intent, &endpoint).await.unwrap_err();
        assert_eq!(
            err,
            CapabilityError::RateLimited {
                retry_after_ms: Some(2000)
            }
        );
    }

    #[tokio::test]
    async fn server_error_is_unavailable() {
        let server = MockServer::start().await;
        mount(&server, ResponseTemplate::new(500)).await;

        let (intent, endpoint) = sample();
        let err = judge_for(&server).judge(&intent, &endpoint).await.unwrap_err();
        assert!(matches!(err, CapabilityError::Unavailable(_)));
    }

    #[tokio::test]
    async fn invalid_json_is_unavailable() {
        let server = MockServer::start().await;
        let body = ollama_response("this is not json at all");
        mount(&server, ResponseTemplate::new(200).set_body_json(&body)).await;

        let (intent, endpoint) = sample();
        let err = judge_for(&server).judge(&intent, &endpoint).await.unwrap_err();
        assert!(matches!(err, CapabilityError::Unavailable(_)));
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let server = MockServer::start().await;
        mount(
            &server,
            ResponseTemplate::new(200).set_delay(Duration::from_secs(10)),
        )
        .await;

        // Client timeout is 2s, mock delays 10s
        let (intent, endpoint) = sample();
        let err = judge_for(&server).judge(&intent, &endpoint).await.unwrap_err();
        assert_eq!(err, CapabilityError::Timeout { timeout_ms: 2000 });
    }

    #[tokio::test]
    async fn check_connection_finds_model() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [{"name": "llama3.2:3b"}, {"name": "phi3:mini"}]
            })))
            .mount(&server)
            .await;

        let judge = judge_for(&server);
        assert_eq!(judge.list_models().await.unwrap().len(), 2);
        assert!(judge.check_connection().await);
    }

    #[test]
    fn config_defaults() {
        let config = OllamaConfig::default();
        assert_eq!(config.host, "http://localhost:11434");
        assert_eq!(config.model, "llama3.2:3b");
        assert_eq!(config.timeout_secs, 5);
        assert!(!config.enabled);
    }

    #[test]
    fn config_from_toml() {
        let toml_str = r#"
host = "http://192.168.1.50:11434"
model = "gemma:2b"
timeout_secs = 10
enabled = true
"#;
        let config: OllamaConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "http://192.168.1.50:11434");
        assert_eq!(config.model, "gemma:2b");
        assert_eq!(config.timeout_secs, 10);
        assert!(config.enabled);
    }

    #[test]
    fn prompt_lists_header_names_only() {
        let intent = CallIntent::new(HttpMethod::Get, "/users").with_header("Authorization", "Bearer secret");
        let endpoint = EndpointSpec::new(HttpMethod::Get, "/users");
        let prompt = build_prompt(&intent, &endpoint);
        assert!(prompt.contains("Authorization"));
        assert!(!prompt.contains("secret"));
    }
}
