//! API route definitions and router builder.

pub mod batch;
pub mod endpoints;
pub mod extract;
pub mod health;
pub mod sessions;

use axum::Router;
use axum::routing::{get, post};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        // Feedback sessions
        .route("/sessions", post(sessions::create_session))
        .route("/sessions/{id}", get(sessions::get_session))
        .route("/sessions/{id}/runs", post(sessions::run))
        .route("/sessions/{id}/accept", post(sessions::accept))
        .route("/sessions/{id}/reject", post(sessions::reject))
        // Stateless helpers
        .route("/extract", post(extract::extract))
        .route("/batch", post(batch::run_batch))
        // Catalog
        .route("/endpoints", get(endpoints::list_endpoints))
        .route("/endpoints/{id}", get(endpoints::get_endpoint));

    Router::new()
        .route("/health", get(health::health))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app() -> Router {
        build_router(AppState::with_sample_catalog().unwrap())
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    async fn new_session(app: &Router) -> String {
        let (status, json) = send(app, post_json("/api/v1/sessions", serde_json::json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        json["session_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let (status, json) = send(&app(), Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["endpoints"], 5);
        assert_eq!(json["sessions"], 0);
    }

    #[tokio::test]
    async fn health_counts_sessions() {
        let app = app();
        new_session(&app).await;
        new_session(&app).await;
        let (_, json) = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(json["sessions"], 2);
    }

    #[tokio::test]
    async fn list_endpoints() {
        let (status, json) = send(
            &app(),
            Request::get("/api/v1/endpoints").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn get_endpoint_not_found() {
        let (status, json) = send(
            &app(),
            Request::get("/api/v1/endpoints/get_nothing").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["status"], 404);
    }

    #[tokio::test]
    async fn run_structured_intent() {
        let app = app();
        let session = new_session(&app).await;
        let body = serde_json::json!({
            "intent": {
                "method": "GET",
                "path_template_hint": "/users",
                "query_params": {"limit": "20"}
            }
        });
        let (status, json) = send(&app, post_json(&format!("/api/v1/sessions/{session}/runs"), body)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["outcome"], "matched");
        assert_eq!(json["result"]["selected_endpoint_id"], "get_users");
        assert_eq!(json["result"]["is_executable"], true);
        assert_eq!(
            json["result"]["curl_command"],
            "curl -X GET 'https://api.example.com/users?limit=20'"
        );
    }

    #[tokio::test]
    async fn run_from_log_text_then_accept() {
        let app = app();
        let session = new_session(&app).await;
        let body = serde_json::json!({
            "log": "curl -X DELETE https://api.example.com/users/7 -H 'Authorization: Bearer abc'"
        });
        let (status, json) = send(&app, post_json(&format!("/api/v1/sessions/{session}/runs"), body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["result"]["selected_endpoint_id"], "delete_users_id");
        let curl = json["result"]["curl_command"].as_str().unwrap();
        assert!(curl.contains("'Authorization: ****'"));
        assert!(!curl.contains("abc"));

        let (status, json) = send(
            &app,
            post_json(&format!("/api/v1/sessions/{session}/accept"), serde_json::json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["selected_endpoint_id"], "delete_users_id");

        let (status, json) = send(
            &app,
            Request::get(format!("/api/v1/sessions/{session}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["phase"], "done");
    }

    #[tokio::test]
    async fn run_without_intent_or_log_is_bad_request() {
        let app = app();
        let session = new_session(&app).await;
        let (status, _) = send(
            &app,
            post_json(&format!("/api/v1/sessions/{session}/runs"), serde_json::json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let (status, _) = send(
            &app(),
            post_json(
                "/api/v1/sessions/0190a5b2-0000-7000-8000-000000000000/reject",
                serde_json::json!({"reason": "wrong"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn accept_without_result_is_conflict() {
        let app = app();
        let session = new_session(&app).await;
        let (status, json) = send(
            &app,
            post_json(&format!("/api/v1/sessions/{session}/accept"), serde_json::json!({})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["status"], 409);
    }

    #[tokio::test]
    async fn extract_detects_format() {
        let body = serde_json::json!({
            "text": "{\"method\":\"GET\",\"path\":\"/orders?status=open\"}\n"
        });
        let (status, json) = send(&app(), post_json("/api/v1/extract", body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["format"], "json_lines");
        assert_eq!(json["intents"][0]["intent"]["path_template_hint"], "/orders");
    }

    #[tokio::test]
    async fn extract_rejects_unknown_format() {
        let body = serde_json::json!({"text": "GET /users", "format": "syslog"});
        let (status, _) = send(&app(), post_json("/api/v1/extract", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn batch_keeps_order() {
        let body = serde_json::json!({
            "intents": [
                {"method": "GET", "path_template_hint": "/orders"},
                {"method": "GET", "path_template_hint": ""},
                {"method": "GET", "path_template_hint": "/users/3"}
            ]
        });
        let (status, json) = send(&app(), post_json("/api/v1/batch", body)).await;
        assert_eq!(status, StatusCode::OK);
        let items = json["items"].as_array().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0]["outcome"]["result"]["selected_endpoint_id"], "get_orders");
        assert!(items[1]["error"].is_string());
        assert_eq!(items[2]["outcome"]["result"]["selected_endpoint_id"], "get_users_id");
    }

    #[tokio::test]
    async fn empty_batch_is_bad_request() {
        let (status, _) = send(&app(), post_json("/api/v1/batch", serde_json::json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
