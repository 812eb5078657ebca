//! Integration tests for single-order dispatch

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use rxdispatch_core::{
    AuthType, CredentialType, DispatchOrchestrator, DispatchRequest, DispatchStage,
    HttpDiagnostics, HttpTokenProvider, InMemoryStore, OrderLineRecord, OrderRecord, RetryPolicy,
    StaticTokenProvider,
};

mod test_support;
use test_support::{
    client_for, credential, fast_retry_policy, harness, harness_with, harness_with_tokens,
    pharmacy, CountingDiagnostics, TEST_TOKEN,
};

const BAREMEDS_ENDPOINT: &str = "https://api.baremeds.com/api/site/42/orders";

#[tokio::test]
async fn test_disabled_pharmacy_rejected_before_diagnostics() {
    let mut config = pharmacy("ph-1", AuthType::Baremeds, BAREMEDS_ENDPOINT);
    config.api_enabled = false;

    let diagnostics = Arc::new(CountingDiagnostics::passing());
    let h = harness_with(InMemoryStore::new().with_pharmacy(config), "http://127.0.0.1:9", diagnostics);

    let outcome = h.orchestrator.dispatch_test_order(&DispatchRequest::new("ph-1")).await;

    assert_eq!(outcome.status, 400);
    assert_eq!(outcome.stage, DispatchStage::Aborted);
    assert_eq!(outcome.body["success"], false);
    assert_eq!(outcome.body["error"], "Pharmacy API not enabled");
    assert_eq!(h.diagnostics.calls(), 0);
}

#[tokio::test]
async fn test_unknown_pharmacy_and_missing_endpoint() {
    let mut no_endpoint = pharmacy("ph-2", AuthType::Bearer, "");
    no_endpoint.api_endpoint_url = None;
    let h = harness(InMemoryStore::new().with_pharmacy(no_endpoint), "http://127.0.0.1:9");

    let outcome = h.orchestrator.dispatch_test_order(&DispatchRequest::new("nope")).await;
    assert_eq!(outcome.status, 400);
    assert_eq!(outcome.body["error"], "Pharmacy not found");

    let outcome = h.orchestrator.dispatch_test_order(&DispatchRequest::new("ph-2")).await;
    assert_eq!(outcome.status, 400);
    assert_eq!(outcome.body["error"], "Pharmacy API endpoint URL not configured");
    assert_eq!(h.diagnostics.calls(), 0);
}

#[tokio::test]
async fn test_failed_diagnostics_returned_verbatim() {
    let store = InMemoryStore::new().with_pharmacy(pharmacy("ph-1", AuthType::Baremeds, BAREMEDS_ENDPOINT));
    let h = harness_with(store, "http://127.0.0.1:9", Arc::new(CountingDiagnostics::failing()));

    let outcome = h.orchestrator.dispatch_test_order(&DispatchRequest::new("ph-1")).await;

    assert_eq!(outcome.status, 400);
    assert_eq!(outcome.body["error"], "Pre-flight diagnostics failed");
    assert_eq!(outcome.body["diagnostics"]["success"], false);
    assert_eq!(outcome.body["diagnostics"]["checks"][0]["name"], "credentials");
    assert_eq!(h.diagnostics.calls(), 1);
}

#[tokio::test]
async fn test_remote_diagnostics_body_forwarded_unchanged() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/diagnostics"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": false, "error": "x"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/site/42/orders"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = InMemoryStore::new().with_pharmacy(pharmacy("ph-1", AuthType::Baremeds, BAREMEDS_ENDPOINT));
    let orchestrator = DispatchOrchestrator::new(
        Arc::new(store),
        Arc::new(HttpDiagnostics::new(format!("{}/diagnostics", server.uri()))),
        Arc::new(StaticTokenProvider::new(TEST_TOKEN)),
        client_for(&server.uri()),
    );

    let outcome = orchestrator.dispatch_test_order(&DispatchRequest::new("ph-1")).await;

    assert_eq!(outcome.status, 400);
    assert_eq!(outcome.body["error"], "Pre-flight diagnostics failed");
    assert_eq!(outcome.body["diagnostics"], json!({"success": false, "error": "x"}));
}

#[tokio::test]
async fn test_token_failure_aborts_before_sending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "invalid client secret"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/site/42/orders"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = InMemoryStore::new().with_pharmacy(pharmacy("ph-1", AuthType::Baremeds, BAREMEDS_ENDPOINT));
    let tokens = Arc::new(HttpTokenProvider::new(format!("{}/token", server.uri())));
    let h = harness_with_tokens(store, &server.uri(), Arc::new(CountingDiagnostics::passing()), tokens);

    let outcome = h.orchestrator.dispatch_test_order(&DispatchRequest::new("ph-1")).await;

    assert_eq!(outcome.status, 500);
    assert_eq!(outcome.stage, DispatchStage::Aborted);
    assert_eq!(outcome.body["success"], false);
    assert_eq!(outcome.body["error"], "Failed to get BareMeds token: invalid client secret");
    assert_eq!(outcome.body["failed_stage"], "payload_built");
    assert_eq!(outcome.attempts, 0);
    assert_eq!(outcome.trail.last(), Some(&DispatchStage::Aborted));
    assert!(!outcome.trail.contains(&DispatchStage::TokenAcquired));
}

#[tokio::test]
async fn test_baremeds_success_extracts_pharmacy_order_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/site/42/orders"))
        .and(header("authorization", format!("Bearer {}", TEST_TOKEN).as_str()))
        .and(body_partial_json(json!({"site_id": "42"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"data": {"id": "BM-77"}})))
        .expect(1)
        .mount(&server)
        .await;

    let store = InMemoryStore::new().with_pharmacy(pharmacy("ph-1", AuthType::Baremeds, BAREMEDS_ENDPOINT));
    let h = harness(store, &server.uri());

    let outcome = h.orchestrator.dispatch_test_order(&DispatchRequest::new("ph-1")).await;

    assert_eq!(outcome.status, 200, "body: {}", outcome.body);
    assert!(outcome.is_success());
    assert_eq!(outcome.body["success"], true);
    assert_eq!(outcome.body["pharmacy_order_id"], "BM-77");
    assert_eq!(outcome.body["response_status"], 201);
    assert!(outcome.body["test_order_id"].as_str().unwrap().starts_with("TEST-"));
    assert_eq!(outcome.attempts, 1);
    assert_eq!(h.diagnostics.calls(), 1);
    assert_eq!(
        outcome.trail,
        vec![
            DispatchStage::Init,
            DispatchStage::ConfigLoaded,
            DispatchStage::DiagnosticsChecked,
            DispatchStage::CredentialsLoaded,
            DispatchStage::PayloadBuilt,
            DispatchStage::TokenAcquired,
            DispatchStage::Sent,
            DispatchStage::Success,
        ]
    );
}

#[tokio::test]
async fn test_upstream_rejection_echoes_sent_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({"error": "invalid prescriber"})))
        .expect(1)
        .mount(&server)
        .await;

    let store = InMemoryStore::new().with_pharmacy(pharmacy("ph-1", AuthType::Baremeds, BAREMEDS_ENDPOINT));
    let h = harness(store, &server.uri());

    let outcome = h.orchestrator.dispatch_test_order(&DispatchRequest::new("ph-1")).await;

    assert_eq!(outcome.status, 422);
    assert_eq!(outcome.stage, DispatchStage::Failure);
    assert_eq!(outcome.body["success"], false);
    assert_eq!(outcome.body["response_body"]["error"], "invalid prescriber");
    assert_eq!(outcome.body["sent_payload"]["site_id"], "42");
    assert_eq!(outcome.body["endpoint"], format!("{}/api/site/42/orders", server.uri()));
    assert_eq!(outcome.body["retryable"], false);
}

#[tokio::test]
async fn test_retry_policy_opt_in_recovers_from_503() {
    let server = MockServer::start().await;
    let attempt = AtomicU32::new(0);
    Mock::given(method("POST"))
        .respond_with(move |_: &wiremock::Request| {
            if attempt.fetch_add(1, Ordering::SeqCst) == 0 {
                ResponseTemplate::new(503)
            } else {
                ResponseTemplate::new(200).set_body_json(json!({"order_id": 1001}))
            }
        })
        .expect(2)
        .mount(&server)
        .await;

    let store = InMemoryStore::new().with_pharmacy(pharmacy("ph-1", AuthType::Baremeds, BAREMEDS_ENDPOINT));
    let h = harness(store, &server.uri());
    let orchestrator = h.orchestrator.with_retry_policy(fast_retry_policy(3));

    let outcome = orchestrator.dispatch_test_order(&DispatchRequest::new("ph-1")).await;

    assert!(outcome.is_success());
    assert_eq!(outcome.attempts, 2);
    assert_eq!(outcome.body["pharmacy_order_id"], "1001");
}

#[tokio::test]
async fn test_default_policy_sends_once_on_503() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let store = InMemoryStore::new().with_pharmacy(pharmacy("ph-1", AuthType::Baremeds, BAREMEDS_ENDPOINT));
    let h = harness(store, &server.uri());
    assert_eq!(h.orchestrator.retry_policy(), &RetryPolicy::none());

    let outcome = h.orchestrator.dispatch_test_order(&DispatchRequest::new("ph-1")).await;

    assert_eq!(outcome.status, 503);
    assert_eq!(outcome.stage, DispatchStage::Failure);
    assert_eq!(outcome.body["retryable"], true);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(server.received_requests().await.unwrap_or_default().len(), 1);
}

#[tokio::test]
async fn test_default_policy_sends_once_on_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_millis(1500)))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = pharmacy("ph-1", AuthType::Baremeds, BAREMEDS_ENDPOINT);
    config.api_timeout_seconds = Some(1);
    let h = harness(InMemoryStore::new().with_pharmacy(config), &server.uri());

    let outcome = h.orchestrator.dispatch_test_order(&DispatchRequest::new("ph-1")).await;

    assert_eq!(outcome.status, 504);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(server.received_requests().await.unwrap_or_default().len(), 1);
}

#[tokio::test]
async fn test_timed_out_order_not_resent_even_with_retries_enabled() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_millis(1500)))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = pharmacy("ph-1", AuthType::Baremeds, BAREMEDS_ENDPOINT);
    config.api_timeout_seconds = Some(1);
    let h = harness(InMemoryStore::new().with_pharmacy(config), &server.uri());
    let orchestrator = h.orchestrator.with_retry_policy(fast_retry_policy(3));

    let outcome = orchestrator.dispatch_test_order(&DispatchRequest::new("ph-1")).await;

    assert_eq!(outcome.status, 504);
    assert_eq!(outcome.stage, DispatchStage::Failure);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(server.received_requests().await.unwrap_or_default().len(), 1);
}

#[tokio::test]
async fn test_api_key_pharmacy_sends_configured_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/orders"))
        .and(header("x-pharmacy-key", "k-123"))
        .and(body_partial_json(json!({"test_order": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"order_id": "GEN-5"})))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = pharmacy("ph-3", AuthType::ApiKey, &format!("{}/v2/orders", server.uri()));
    config.api_auth_header_name = Some("X-Pharmacy-Key".into());
    let store = InMemoryStore::new()
        .with_pharmacy(config)
        .with_credential(credential("ph-3", CredentialType::ApiKey, "k-123"));
    let h = harness(store, "https://unused.example.com");

    let outcome = h.orchestrator.dispatch_test_order(&DispatchRequest::new("ph-3")).await;

    assert!(outcome.is_success(), "body: {}", outcome.body);
    assert_eq!(outcome.body["pharmacy_order_id"], "GEN-5");
}

#[tokio::test]
async fn test_basic_auth_pharmacy() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Basic dXNlcjpwYXNz"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = InMemoryStore::new()
        .with_pharmacy(pharmacy("ph-4", AuthType::Basic, &format!("{}/orders", server.uri())))
        .with_credential(credential("ph-4", CredentialType::Username, "user"))
        .with_credential(credential("ph-4", CredentialType::Password, "pass"));
    let h = harness(store, "https://unused.example.com");

    let outcome = h.orchestrator.dispatch_test_order(&DispatchRequest::new("ph-4")).await;
    assert!(outcome.is_success(), "body: {}", outcome.body);
}

#[tokio::test]
async fn test_generic_branch_honors_dry_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = InMemoryStore::new()
        .with_pharmacy(pharmacy("ph-5", AuthType::Bearer, &format!("{}/orders", server.uri())))
        .with_credential(credential("ph-5", CredentialType::BearerToken, "secret-bearer"));
    let h = harness(store, "https://unused.example.com");

    let outcome = h
        .orchestrator
        .dispatch_test_order(&DispatchRequest::new("ph-5").with_dry_run(true))
        .await;

    assert!(outcome.is_success());
    assert_eq!(outcome.body["dry_run"], true);
    assert_eq!(outcome.body["response_body"]["headers"]["authorization"], "[REDACTED]");
    assert!(!outcome.body.to_string().contains("secret-bearer"));
}

#[tokio::test]
async fn test_missing_generic_credentials_abort() {
    let store = InMemoryStore::new()
        .with_pharmacy(pharmacy("ph-6", AuthType::Bearer, "https://pharmacy.example.com/orders"));
    let h = harness(store, "https://unused.example.com");

    let outcome = h.orchestrator.dispatch_test_order(&DispatchRequest::new("ph-6")).await;

    assert_eq!(outcome.status, 400);
    assert_eq!(outcome.stage, DispatchStage::Aborted);
    assert_eq!(outcome.body["failed_stage"], "payload_built");
}

#[tokio::test]
async fn test_timeout_becomes_structured_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let mut config = pharmacy("ph-7", AuthType::Baremeds, BAREMEDS_ENDPOINT);
    config.api_timeout_seconds = Some(1);
    let store = InMemoryStore::new().with_pharmacy(config);
    let h = harness(store, &server.uri());

    let outcome = h.orchestrator.dispatch_test_order(&DispatchRequest::new("ph-7")).await;

    assert_eq!(outcome.status, 504);
    assert_eq!(outcome.stage, DispatchStage::Failure);
    assert_eq!(outcome.body["success"], false);
    assert_eq!(outcome.body["error"], "Request timed out after 1 seconds");
    assert!(outcome.body["sent_payload"].is_object());
}

#[tokio::test]
async fn test_production_order_dispatch_uses_record_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "external_order_id": "ord-9",
            "patient": {"first_name": "Ada", "last_name": "Patient"},
            "medication": {"name": "Semaglutide", "quantity": 4}
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let store = InMemoryStore::new().with_pharmacy(pharmacy("ph-1", AuthType::Baremeds, BAREMEDS_ENDPOINT));
    let h = harness(store, &server.uri());

    let order = OrderRecord::from_value(&json!({"id": "ord-9", "patient_first_name": "Ada"}));
    let line = OrderLineRecord::from_value(&json!({"medication_name": "Semaglutide", "quantity": 4}));
    let outcome = h
        .orchestrator
        .dispatch_order(&DispatchRequest::new("ph-1"), &order, &line)
        .await;

    assert!(outcome.is_success(), "body: {}", outcome.body);
    assert_eq!(outcome.body["order_id"], "ord-9");
    assert_eq!(outcome.body["message"], "Order sent successfully");
    assert!(outcome.body.get("test_order_id").is_none());
}
