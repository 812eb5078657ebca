//! HTTP surface for the dispatch and self-test orchestrators

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use rxdispatch_core::{DispatchOrchestrator, DispatchRequest, SelfTestRequest, SelfTestRunner};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::Instrument;

use crate::error::{Error, Result};
use crate::logging::{generate_request_id, timing::Timer};

pub const SELF_TEST_PATH: &str = "/functions/v1/test-baremeds-integration";
pub const DISPATCH_PATH: &str = "/functions/v1/test-pharmacy-api";
pub const HEALTH_PATH: &str = "/health";

/// Request rejected before reaching an orchestrator
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("{0}")]
    InvalidInput(String),
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
        }));
        (StatusCode::BAD_REQUEST, body).into_response()
    }
}

/// Shared state for the router
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<DispatchOrchestrator>,
    self_test: Arc<SelfTestRunner>,
}

impl AppState {
    pub fn new(orchestrator: DispatchOrchestrator, self_test: SelfTestRunner) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            self_test: Arc::new(self_test),
        }
    }
}

/// Build the router with its CORS layer
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::GET, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
            header::CONTENT_TYPE,
        ]);

    Router::new()
        .route(SELF_TEST_PATH, post(self_test_handler))
        .route(DISPATCH_PATH, post(dispatch_handler))
        .route(HEALTH_PATH, get(health_handler))
        .with_state(state)
        .layer(cors)
}

/// Bind and serve until ctrl-c
pub async fn serve(state: AppState, bind: &str) -> Result<()> {
    let addr: SocketAddr = bind
        .parse()
        .map_err(|e| Error::config(format!("Invalid bind address '{}': {}", bind, e)))?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Server(format!("Failed to bind {}: {}", addr, e)))?;

    tracing::info!(%addr, "Server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Server(e.to_string()))?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}

/// Parse a JSON body; an empty body yields the default value when one is given
fn parse_body<T: DeserializeOwned>(body: &Bytes, default: Option<T>) -> std::result::Result<T, RequestError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        if let Some(default) = default {
            return Ok(default);
        }
    }
    Ok(serde_json::from_slice(body)?)
}

fn json_response(status: u16, body: Value) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(body)).into_response()
}

async fn self_test_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let request: SelfTestRequest = match parse_body(&body, Some(SelfTestRequest::default())) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };

    let span = tracing::info_span!("self_test", request_id = %generate_request_id(), pharmacy_id = ?request.pharmacy_id);
    async move {
        let _timer = Timer::new("self_test");
        let report = state.self_test.run(&request).await;
        tracing::info!(passed = report.tests_passed, failed = report.tests_failed, "Self-test finished");

        let status = report.http_status();
        match serde_json::to_value(&report) {
            Ok(body) => json_response(status, body),
            Err(e) => json_response(500, json!({"success": false, "error": e.to_string()})),
        }
    }
    .instrument(span)
    .await
}

async fn dispatch_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let request: DispatchRequest = match parse_body(&body, None) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };
    if request.pharmacy_id.trim().is_empty() {
        return RequestError::InvalidInput("pharmacy_id is required".to_string()).into_response();
    }

    let span = tracing::info_span!("dispatch", request_id = %generate_request_id(), pharmacy_id = %request.pharmacy_id);
    async move {
        let _timer = Timer::with_details("dispatch", &request.pharmacy_id);
        let outcome = state.orchestrator.dispatch_test_order(&request).await;
        tracing::info!(status = outcome.status, stage = %outcome.stage, attempts = outcome.attempts, "Dispatch finished");
        json_response(outcome.status, outcome.body)
    }
    .instrument(span)
    .await
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": rxdispatch_core::VERSION,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use rxdispatch_core::{
        AuthType, BaremedsClient, ClientConfig, InMemoryStore, LocalDiagnostics, PharmacyConfig,
        StaticTokenProvider,
    };
    use tower::ServiceExt;

    fn pharmacy(id: &str, enabled: bool) -> PharmacyConfig {
        PharmacyConfig {
            id: id.to_string(),
            name: Some("Test Pharmacy".into()),
            api_enabled: enabled,
            api_endpoint_url: Some("https://api.baremeds.com/api/site/42/orders".into()),
            api_auth_type: AuthType::Baremeds,
            api_auth_header_name: None,
            api_timeout_seconds: None,
        }
    }

    fn app() -> Router {
        let store = Arc::new(
            InMemoryStore::new()
                .with_pharmacy(pharmacy("ph-1", true))
                .with_pharmacy(pharmacy("ph-off", false)),
        );
        let base_url = "http://127.0.0.1:9";
        let diagnostics = Arc::new(LocalDiagnostics::new(store.clone(), base_url));
        let tokens = Arc::new(StaticTokenProvider::new("tok"));
        let client = BaremedsClient::new(ClientConfig::default().with_base_url(base_url)).unwrap();
        let orchestrator = DispatchOrchestrator::new(store, diagnostics, tokens.clone(), client)
            .with_default_dry_run(true);
        let runner = SelfTestRunner::new()
            .with_token_provider(tokens)
            .with_orchestrator(orchestrator.clone());
        router(AppState::new(orchestrator, runner))
    }

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn post_json(path: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(path)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let request = Request::builder().uri(HEALTH_PATH).body(Body::empty()).unwrap();
        let (status, body) = call(app(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], rxdispatch_core::VERSION);
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let request = Request::builder()
            .method("OPTIONS")
            .uri(DISPATCH_PATH)
            .header("origin", "https://admin.example.com")
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "authorization, apikey, content-type")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let headers = response.headers();
        assert_eq!(headers["access-control-allow-origin"], "*");
        let allowed = headers["access-control-allow-headers"].to_str().unwrap();
        assert!(allowed.contains("x-client-info"));
        assert!(allowed.contains("apikey"));
    }

    #[tokio::test]
    async fn test_malformed_json_is_400() {
        let (status, body) = call(app(), post_json(DISPATCH_PATH, "{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid JSON body"));
    }

    #[tokio::test]
    async fn test_blank_pharmacy_id_is_400() {
        let (status, body) = call(app(), post_json(DISPATCH_PATH, r#"{"pharmacy_id": " "}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "pharmacy_id is required");
    }

    #[tokio::test]
    async fn test_dispatch_disabled_pharmacy() {
        let (status, body) = call(app(), post_json(DISPATCH_PATH, r#"{"pharmacy_id": "ph-off"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Pharmacy API not enabled");
    }

    #[tokio::test]
    async fn test_dispatch_dry_run_by_default() {
        let (status, body) = call(app(), post_json(DISPATCH_PATH, r#"{"pharmacy_id": "ph-1"}"#)).await;
        assert_eq!(status, StatusCode::OK, "body: {}", body);
        assert_eq!(body["success"], true);
        assert_eq!(body["dry_run"], true);
        assert_eq!(
            body["response_body"]["would_send_to"],
            "http://127.0.0.1:9/api/site/42/orders"
        );
    }

    #[tokio::test]
    async fn test_self_test_empty_body_runs_pure_checks() {
        let (status, body) = call(app(), post_json(SELF_TEST_PATH, "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["tests_failed"], 0);
    }

    #[tokio::test]
    async fn test_self_test_full_run() {
        let (status, body) = call(
            app(),
            post_json(SELF_TEST_PATH, r#"{"pharmacy_id": "ph-1", "run_all_tests": true}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "body: {}", body);
        let names: Vec<&str> = body["details"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|d| d["test"].as_str())
            .collect();
        assert!(names.contains(&"token_retrieval"));
        assert!(names.contains(&"dry_run_dispatch"));
    }

    #[tokio::test]
    async fn test_self_test_failure_is_500() {
        let (status, body) = call(
            app(),
            post_json(SELF_TEST_PATH, r#"{"pharmacy_id": "missing"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
    }
}
