//! Integration tests for the REST configuration store and HTTP diagnostics

use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use rxdispatch_core::{
    AuthType, CredentialType, DiagnosticsCheck, Error, HttpDiagnostics, PharmacyStore, RestStore,
};

mod test_support;

#[tokio::test]
async fn test_rest_store_reads_pharmacy_row() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/pharmacies"))
        .and(query_param("id", "eq.ph-1"))
        .and(header("apikey", "service-key"))
        .and(header("authorization", "Bearer service-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": "ph-1",
            "name": "Main Street",
            "api_enabled": true,
            "api_endpoint_url": "https://api.baremeds.com/api/site/3/orders",
            "api_auth_type": "baremeds",
            "api_timeout_seconds": 20,
            "created_at": "2024-01-01T00:00:00Z"
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let store = RestStore::new(format!("{}/rest/v1", server.uri()), "service-key").unwrap();
    let pharmacy = store.get_pharmacy("ph-1").await.unwrap().unwrap();

    assert_eq!(pharmacy.api_auth_type, AuthType::Baremeds);
    assert_eq!(pharmacy.timeout_seconds(), 20);
}

#[tokio::test]
async fn test_rest_store_missing_row_and_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/pharmacies"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/pharmacy_api_credentials"))
        .and(query_param("pharmacy_id", "eq.ph-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"pharmacy_id": "ph-1", "credential_type": "api_key", "credential_value": "k"}
        ])))
        .mount(&server)
        .await;

    let store = RestStore::new(server.uri(), "key").unwrap();
    assert!(store.get_pharmacy("ph-1").await.unwrap().is_none());

    let credentials = store.get_credentials("ph-1").await.unwrap();
    assert_eq!(credentials.get(&CredentialType::ApiKey), Some("k"));
}

#[tokio::test]
async fn test_rest_store_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_string(r#"{"message":"JWT expired"}"#))
        .mount(&server)
        .await;

    let store = RestStore::new(server.uri(), "key").unwrap();
    let err = store.get_pharmacy("ph-1").await.unwrap_err();
    assert!(matches!(err, Error::Store { .. }));
    assert!(err.to_string().contains("401"));
}

#[tokio::test]
async fn test_http_diagnostics_report() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "checks": [{"name": "token", "passed": false, "message": "token service down"}],
            "duration_ms": 40
        })))
        .mount(&server)
        .await;

    let pharmacy = test_support::pharmacy("ph-1", AuthType::Baremeds, "https://x.com/site/1");
    let report = HttpDiagnostics::new(server.uri()).check(&pharmacy).await.unwrap();

    assert!(!report.success);
    assert_eq!(report.checks[0].message, "token service down");
    assert_eq!(report.to_value()["duration_ms"], 40);
}

#[tokio::test]
async fn test_http_diagnostics_unreachable() {
    let pharmacy = test_support::pharmacy("ph-1", AuthType::Baremeds, "https://x.com/site/1");
    let err = HttpDiagnostics::new("http://127.0.0.1:9/diagnostics")
        .check(&pharmacy)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Diagnostics { .. }));
    assert_eq!(err.status_code(), 400);
}
