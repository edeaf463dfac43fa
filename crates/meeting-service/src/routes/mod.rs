//! HTTP routes for the meeting service.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::handlers;
use crate::middleware::http_metrics_middleware;
use crate::services::MeetingService;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Meeting lifecycle service.
    pub service: Arc<MeetingService>,

    /// Service configuration.
    pub config: Config,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/v1/meetings` and `/v1/meetings/:token[/satisfaction]` - meeting lifecycle
/// - `/v1/health` - Health check endpoint (store probe)
/// - `/metrics` - Prometheus scrape endpoint
/// - TraceLayer for request logging
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let api_routes = Router::new()
        .route("/v1/health", get(handlers::health_check))
        .route("/v1/meetings", post(handlers::create_meeting))
        .route(
            "/v1/meetings/:token",
            get(handlers::get_meeting).delete(handlers::delete_meeting),
        )
        .route(
            "/v1/meetings/:token/satisfaction",
            post(handlers::submit_satisfaction),
        )
        .with_state(state);

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. HTTP metrics - Record every response (outermost)
    api_routes
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(middleware::from_fn(http_metrics_middleware))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::crypto::TokenCipher;
    use crate::repositories::MemoryMeetingStore;
    use crate::services::call_client::mock::MockCallVariables;
    use crate::services::chat_client::mock::MockChatCloser;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::collections::HashMap;
    use std::num::NonZeroUsize;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        service: Arc<MeetingService>,
        calls: Arc<MockCallVariables>,
    }

    fn test_app() -> TestApp {
        let config = Config::from_vars(&HashMap::from([(
            "MEETING_TOKEN_SECRET".to_string(),
            "routes-test-secret-value".to_string(),
        )]))
        .unwrap();
        let calls = Arc::new(MockCallVariables::new());
        let service = Arc::new(MeetingService::new(
            Arc::new(MemoryMeetingStore::new(NonZeroUsize::new(32).unwrap())),
            Arc::new(TokenCipher::new(&config.token_secret).unwrap()),
            Arc::new(MockChatCloser::new()),
            calls.clone(),
        ));
        let state = Arc::new(AppState {
            service: service.clone(),
            config,
        });
        let handle = PrometheusBuilder::new().build_recorder().handle();

        TestApp {
            router: build_routes(state, handle),
            service,
            calls,
        }
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn create(app: &TestApp) -> String {
        let response = app
            .router
            .clone()
            .oneshot(json_request(
                "POST",
                "/v1/meetings",
                serde_json::json!({
                    "domain_id": 4,
                    "title": "Support call",
                    "expire_sec": 3600,
                    "base_path": "https://meet.example.com/m/",
                    "variables": {"queue": "billing"},
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = body_json(response).await;
        let token = body["id"].as_str().unwrap().to_string();
        assert_eq!(
            body["url"].as_str().unwrap(),
            format!("https://meet.example.com/m/{token}")
        );
        token
    }

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[tokio::test]
    async fn test_create_and_get_meeting() {
        let app = test_app();
        let token = create(&app).await;

        let response = app
            .router
            .clone()
            .oneshot(empty_request("GET", &format!("/v1/meetings/{token}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["id"], token.as_str());
        assert_eq!(body["domain_id"], 4);
        assert_eq!(body["title"], "Support call");
        assert_eq!(body["variables"]["queue"], "billing");
        assert_eq!(body["allow_satisfaction"], false);
        assert!(body.get("call_id").is_none());
    }

    #[tokio::test]
    async fn test_create_rejects_empty_title() {
        let app = test_app();
        let response = app
            .router
            .oneshot(json_request(
                "POST",
                "/v1/meetings",
                serde_json::json!({"domain_id": 1, "title": " ", "base_path": "https://x/m"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_rejected_tokens_share_one_response() {
        let app = test_app();
        let token = create(&app).await;

        // Flip one character so the token still decodes but fails authentication.
        let mut tampered: Vec<char> = token.chars().collect();
        tampered[20] = if tampered[20] == 'A' { 'B' } else { 'A' };
        let tampered: String = tampered.into_iter().collect();

        let mut bodies = Vec::new();
        for bad in ["not*base64", "c2hvcnQ", tampered.as_str()] {
            let response = app
                .router
                .clone()
                .oneshot(empty_request("GET", &format!("/v1/meetings/{bad}")))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "token {bad}");
            bodies.push(body_json(response).await);
        }

        assert!(bodies.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(bodies[0]["error"]["code"], "INVALID_TOKEN");
    }

    #[tokio::test]
    async fn test_delete_then_get_is_not_found() {
        let app = test_app();
        let token = create(&app).await;
        let uri = format!("/v1/meetings/{token}");

        let response = app
            .router
            .clone()
            .oneshot(empty_request("DELETE", &uri))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .router
            .clone()
            .oneshot(empty_request("GET", &uri))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .router
            .oneshot(empty_request("DELETE", &uri))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_satisfaction_flow() {
        let app = test_app();
        let token = create(&app).await;
        let uri = format!("/v1/meetings/{token}/satisfaction");
        let answer = serde_json::json!({"satisfaction": "5"});

        let response = app
            .router
            .clone()
            .oneshot(json_request("POST", &uri, answer.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        app.service
            .close_by_call(&token, "call-1", true)
            .await
            .unwrap();

        let response = app
            .router
            .clone()
            .oneshot(json_request("POST", &uri, answer.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(app.calls.call_count(), 1);

        let response = app
            .router
            .oneshot(json_request("POST", &uri, answer))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["error"]["code"], "NOT_ALLOWED");
    }

    #[tokio::test]
    async fn test_health_reports_backend() {
        let app = test_app();
        let response = app
            .router
            .oneshot(empty_request("GET", "/v1/health"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["backend"], "memory");
        assert_eq!(body["store"], "healthy");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let app = test_app();
        let response = app
            .router
            .oneshot(empty_request("GET", "/metrics"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let app = test_app();
        let response = app
            .router
            .oneshot(empty_request("GET", "/v1/unknown"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
