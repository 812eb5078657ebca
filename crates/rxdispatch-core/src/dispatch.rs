//! Single-order dispatch orchestration
//!
//! Sequences one dispatch through its stages:
//!
//! ```text
//! Init → ConfigLoaded → DiagnosticsChecked → CredentialsLoaded → PayloadBuilt
//!      → TokenAcquired (baremeds only) → Sent → Success | Failure
//! ```
//!
//! Any of the configuration, diagnostics, credential and token steps can end
//! the dispatch early in `Aborted`. Every path produces a structured JSON body
//! and an HTTP status; nothing is raised to the caller.
//!
//! A dispatch sends its order once. `Failure` is terminal for the invocation;
//! resending is a new invocation. A retry policy can be opted into with
//! [`DispatchOrchestrator::with_retry_policy`], and even then a timed-out
//! order is never resent.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use crate::diagnostics::DiagnosticsCheck;
use crate::http::{
    auth_headers, is_retryable_status_code, BaremedsClient, ErrorClassification, FetchOptions,
    FetchResponse, Retried, RetryPolicy,
};
use crate::payload::{
    create_generic_order_payload, create_production_order_payload, create_test_order_payload,
    PrescriptionPayload,
};
use crate::site_id::{endpoint_path, extract_site_id_from_url};
use crate::store::PharmacyStore;
use crate::token::TokenProvider;
use crate::types::{AuthType, Credentials, OrderLineRecord, OrderRecord, PharmacyConfig};
use crate::{Error, Result};

/// Error text when diagnostics reject a dispatch
pub const DIAGNOSTICS_FAILED: &str = "Pre-flight diagnostics failed";

/// Keys checked, in order, for the pharmacy's own order id
const ORDER_ID_KEYS: [&str; 3] = ["order_id", "baremeds_order_id", "id"];

/// Lifecycle stage of one dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStage {
    Init,
    ConfigLoaded,
    DiagnosticsChecked,
    CredentialsLoaded,
    PayloadBuilt,
    TokenAcquired,
    Sent,
    Success,
    Failure,
    Aborted,
}

impl DispatchStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Aborted)
    }
}

impl fmt::Display for DispatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        write!(f, "{}", name)
    }
}

/// Inbound dispatch request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub pharmacy_id: String,
    #[serde(default)]
    pub dry_run: Option<bool>,
}

impl DispatchRequest {
    pub fn new(pharmacy_id: impl Into<String>) -> Self {
        Self {
            pharmacy_id: pharmacy_id.into(),
            dry_run: None,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = Some(dry_run);
        self
    }
}

/// Result of a dispatch: the HTTP status and JSON body to answer with
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub status: u16,
    pub body: Value,
    /// Terminal stage reached
    pub stage: DispatchStage,
    /// Every stage passed through, from `Init` to `stage`
    pub trail: Vec<DispatchStage>,
    /// Calls made to the pharmacy API, zero when aborted before sending
    pub attempts: u32,
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        self.stage == DispatchStage::Success
    }

    fn aborted(trail: StageTrail, error: &Error) -> Self {
        Self {
            status: error.status_code(),
            body: json!({
                "success": false,
                "error": error.to_string(),
                "failed_stage": trail.current(),
            }),
            stage: DispatchStage::Aborted,
            trail: trail.finish(DispatchStage::Aborted),
            attempts: 0,
        }
    }
}

/// Stages visited by one dispatch
#[derive(Debug, Clone)]
struct StageTrail(Vec<DispatchStage>);

impl StageTrail {
    fn new() -> Self {
        Self(vec![DispatchStage::Init])
    }

    fn current(&self) -> DispatchStage {
        self.0.last().copied().unwrap_or(DispatchStage::Init)
    }

    fn advance(&mut self, to: DispatchStage) {
        tracing::trace!(from = %self.current(), to = %to, "Dispatch stage");
        self.0.push(to);
    }

    fn finish(mut self, terminal: DispatchStage) -> Vec<DispatchStage> {
        self.advance(terminal);
        self.0
    }
}

/// Pharmacy's own order id from a response body, top level first, then under `data`
pub fn extract_pharmacy_order_id(body: &Value) -> Option<String> {
    let lookup = |object: &Value| {
        ORDER_ID_KEYS.iter().find_map(|key| match object.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    };
    lookup(body).or_else(|| body.get("data").and_then(lookup))
}

/// Where the payload of a dispatch comes from
enum OrderSource<'a> {
    Test,
    Production(&'a OrderRecord, &'a OrderLineRecord),
}

impl OrderSource<'_> {
    fn build(&self, site_id: Option<&str>) -> PrescriptionPayload {
        match self {
            OrderSource::Test => create_test_order_payload(site_id),
            OrderSource::Production(order, line) => create_production_order_payload(order, line, site_id),
        }
    }

    /// Response key carrying our id for the order
    fn id_key(&self) -> &'static str {
        match self {
            OrderSource::Test => "test_order_id",
            OrderSource::Production(..) => "order_id",
        }
    }

    fn sent_message(&self) -> &'static str {
        match self {
            OrderSource::Test => "Test order sent successfully",
            OrderSource::Production(..) => "Order sent successfully",
        }
    }
}

/// Orchestrates dispatches against configured pharmacies
#[derive(Clone)]
pub struct DispatchOrchestrator {
    store: Arc<dyn PharmacyStore>,
    diagnostics: Arc<dyn DiagnosticsCheck>,
    tokens: Arc<dyn TokenProvider>,
    client: BaremedsClient,
    retry_policy: RetryPolicy,
    default_dry_run: bool,
}

impl DispatchOrchestrator {
    pub fn new(
        store: Arc<dyn PharmacyStore>,
        diagnostics: Arc<dyn DiagnosticsCheck>,
        tokens: Arc<dyn TokenProvider>,
        client: BaremedsClient,
    ) -> Self {
        Self {
            store,
            diagnostics,
            tokens,
            client,
            retry_policy: RetryPolicy::none(),
            default_dry_run: false,
        }
    }

    /// Opt into retrying transient upstream statuses in the send stage.
    ///
    /// Timed-out attempts are never repeated whatever the policy says.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Dry-run mode used when a request does not say
    pub fn with_default_dry_run(mut self, dry_run: bool) -> Self {
        self.default_dry_run = dry_run;
        self
    }

    pub fn client(&self) -> &BaremedsClient {
        &self.client
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Send a synthetic, clearly-marked test order to the pharmacy
    pub async fn dispatch_test_order(&self, request: &DispatchRequest) -> DispatchOutcome {
        self.run(request, OrderSource::Test).await
    }

    /// Send a real order built from source records
    pub async fn dispatch_order(
        &self,
        request: &DispatchRequest,
        order: &OrderRecord,
        line: &OrderLineRecord,
    ) -> DispatchOutcome {
        self.run(request, OrderSource::Production(order, line)).await
    }

    /// Pharmacy configuration, validated for dispatch
    pub async fn load_pharmacy(&self, pharmacy_id: &str) -> Result<PharmacyConfig> {
        let pharmacy = self
            .store
            .get_pharmacy(pharmacy_id)
            .await?
            .ok_or_else(|| Error::not_found("pharmacy", "Pharmacy not found"))?;

        if !pharmacy.api_enabled {
            return Err(Error::configuration("Pharmacy API not enabled"));
        }
        if pharmacy.endpoint_url().is_none() {
            return Err(Error::configuration("Pharmacy API endpoint URL not configured"));
        }
        Ok(pharmacy)
    }

    async fn run(&self, request: &DispatchRequest, source: OrderSource<'_>) -> DispatchOutcome {
        let dry_run = request.dry_run.unwrap_or(self.default_dry_run);
        let pharmacy_id = request.pharmacy_id.as_str();
        tracing::info!(pharmacy_id, dry_run, "Starting pharmacy dispatch");

        let mut trail = StageTrail::new();
        let pharmacy = match self.load_pharmacy(pharmacy_id).await {
            Ok(pharmacy) => pharmacy,
            Err(e) => return self.abort(trail, e),
        };
        trail.advance(DispatchStage::ConfigLoaded);

        match self.diagnostics.check(&pharmacy).await {
            Ok(report) if report.success => {}
            Ok(report) => {
                tracing::warn!(pharmacy_id, "Pre-flight diagnostics failed, not dispatching");
                return DispatchOutcome {
                    status: 400,
                    body: json!({
                        "success": false,
                        "error": DIAGNOSTICS_FAILED,
                        "diagnostics": report.to_value(),
                    }),
                    stage: DispatchStage::Aborted,
                    trail: trail.finish(DispatchStage::Aborted),
                    attempts: 0,
                };
            }
            Err(e) => return self.abort(trail, e),
        }
        trail.advance(DispatchStage::DiagnosticsChecked);

        let credentials = match self.store.get_credentials(pharmacy_id).await {
            Ok(credentials) => credentials,
            Err(e) => return self.abort(trail, e),
        };
        trail.advance(DispatchStage::CredentialsLoaded);
        tracing::debug!(pharmacy_id, count = credentials.len(), "Loaded pharmacy credentials");

        let options = FetchOptions::dry_run(dry_run)
            .with_timeout(Duration::from_secs(pharmacy.timeout_seconds()));
        let policy = if dry_run {
            RetryPolicy::none()
        } else {
            self.retry_policy.clone().without_timeout_retries()
        };

        match pharmacy.api_auth_type {
            AuthType::Baremeds => {
                self.send_baremeds(&pharmacy, &source, &options, &policy, trail).await
            }
            AuthType::Bearer | AuthType::ApiKey | AuthType::Basic => {
                self.send_generic(&pharmacy, &credentials, &source, &options, &policy, trail)
                    .await
            }
        }
    }

    async fn send_baremeds(
        &self,
        pharmacy: &PharmacyConfig,
        source: &OrderSource<'_>,
        options: &FetchOptions,
        policy: &RetryPolicy,
        mut trail: StageTrail,
    ) -> DispatchOutcome {
        // load_pharmacy guarantees an endpoint
        let endpoint_url = pharmacy.endpoint_url().unwrap_or_default();
        let site_id = extract_site_id_from_url(endpoint_url);
        let payload = source.build(site_id.as_deref());
        trail.advance(DispatchStage::PayloadBuilt);

        let token = match self.tokens.get_token(&pharmacy.id).await {
            Ok(token) => token,
            Err(e) => return self.abort(trail, e),
        };
        trail.advance(DispatchStage::TokenAcquired);

        let path = endpoint_path(endpoint_url);
        let endpoint = self.client.full_url(&path);
        let sent_payload = payload.to_value();
        tracing::info!(
            pharmacy = pharmacy.display_name(),
            endpoint = %endpoint,
            site_id = site_id.as_deref().unwrap_or("none"),
            external_order_id = %payload.external_order_id,
            "Sending BareMeds order"
        );

        let retried = self
            .client
            .fetch_with_retry(&path, &sent_payload, &token, options, policy)
            .await;
        trail.advance(DispatchStage::Sent);

        interpret(retried, source, &payload.external_order_id, sent_payload, &endpoint, trail)
    }

    async fn send_generic(
        &self,
        pharmacy: &PharmacyConfig,
        credentials: &Credentials,
        source: &OrderSource<'_>,
        options: &FetchOptions,
        policy: &RetryPolicy,
        mut trail: StageTrail,
    ) -> DispatchOutcome {
        let endpoint = pharmacy.endpoint_url().unwrap_or_default().to_string();
        let prescription = source.build(None);
        let payload = create_generic_order_payload(&prescription);
        trail.advance(DispatchStage::PayloadBuilt);

        let headers = match auth_headers(pharmacy, credentials) {
            Ok(headers) => headers,
            Err(e) => return self.abort(trail, e),
        };

        let sent_payload = payload.to_value();
        tracing::info!(
            pharmacy = pharmacy.display_name(),
            endpoint = %endpoint,
            auth_type = %pharmacy.api_auth_type,
            order_id = %payload.order_id,
            "Sending generic pharmacy order"
        );

        let retried = self
            .client
            .send_raw_with_retry(&endpoint, &sent_payload, &headers, options, policy)
            .await;
        trail.advance(DispatchStage::Sent);

        interpret(retried, source, &payload.order_id, sent_payload, &endpoint, trail)
    }

    fn abort(&self, trail: StageTrail, error: Error) -> DispatchOutcome {
        tracing::warn!(stage = %trail.current(), error = %error, "Dispatch aborted");
        DispatchOutcome::aborted(trail, &error)
    }
}

fn interpret(
    retried: Retried<FetchResponse>,
    source: &OrderSource<'_>,
    order_id: &str,
    sent_payload: Value,
    endpoint: &str,
    trail: StageTrail,
) -> DispatchOutcome {
    let attempts = retried.attempts;

    match retried.result {
        Ok(response) if response.is_success() => {
            let response_body = response.json_or_text();
            let message = if response.dry_run {
                "Dry run completed - request was not sent to the pharmacy"
            } else {
                source.sent_message()
            };

            let mut body = Map::new();
            body.insert("success".into(), json!(true));
            body.insert("message".into(), json!(message));
            body.insert(source.id_key().into(), json!(order_id));
            if let Some(order_id) = extract_pharmacy_order_id(&response_body) {
                body.insert("pharmacy_order_id".into(), json!(order_id));
            }
            body.insert("response_status".into(), json!(response.status));
            body.insert("response_body".into(), response_body);
            body.insert("dry_run".into(), json!(response.dry_run));
            body.insert("attempts".into(), json!(attempts));

            tracing::info!(order_id, status = response.status, attempts, "Dispatch succeeded");
            DispatchOutcome {
                status: 200,
                body: Value::Object(body),
                stage: DispatchStage::Success,
                trail: trail.finish(DispatchStage::Success),
                attempts,
            }
        }
        Ok(response) => {
            let classification = ErrorClassification::classify_status(response.status);
            tracing::warn!(
                order_id,
                status = response.status,
                classification = %classification,
                attempts,
                "Pharmacy API rejected order"
            );
            DispatchOutcome {
                status: response.status,
                body: json!({
                    "success": false,
                    "error": format!("Pharmacy API returned status {}", response.status),
                    "classification": classification,
                    "response_status": response.status,
                    "response_body": response.json_or_text(),
                    "sent_payload": sent_payload,
                    "endpoint": endpoint,
                    "retryable": is_retryable_status_code(response.status),
                    "attempts": attempts,
                }),
                stage: DispatchStage::Failure,
                trail: trail.finish(DispatchStage::Failure),
                attempts,
            }
        }
        Err(error) => {
            let classification = ErrorClassification::classify_error(&error);
            tracing::error!(order_id, error = %error, attempts, "Pharmacy API request failed");
            DispatchOutcome {
                status: error.status_code(),
                body: json!({
                    "success": false,
                    "error": error.to_string(),
                    "classification": classification,
                    "response_status": Value::Null,
                    "response_body": Value::Null,
                    "sent_payload": sent_payload,
                    "endpoint": endpoint,
                    "retryable": error.is_transient(),
                    "attempts": attempts,
                }),
                stage: DispatchStage::Failure,
                trail: trail.finish(DispatchStage::Failure),
                attempts,
            }
        }
    }
}
