//! Shared test support utilities for integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use async_trait::async_trait;
use rxdispatch_core::diagnostics::{CheckResult, DiagnosticsCheck, DiagnosticsReport};
use rxdispatch_core::{
    AuthType, BaremedsClient, ClientConfig, CredentialType, DispatchOrchestrator, InMemoryStore,
    PharmacyConfig, PharmacyCredential, Result, RetryPolicy, StaticTokenProvider, TokenProvider,
};

pub const TEST_TOKEN: &str = "test-token";

/// Create an enabled pharmacy with the given auth type and endpoint
pub fn pharmacy(id: &str, auth: AuthType, endpoint: &str) -> PharmacyConfig {
    PharmacyConfig {
        id: id.to_string(),
        name: Some(format!("{} Pharmacy", id)),
        api_enabled: true,
        api_endpoint_url: Some(endpoint.to_string()),
        api_auth_type: auth,
        api_auth_header_name: None,
        api_timeout_seconds: None,
    }
}

/// Create a credential row
pub fn credential(pharmacy_id: &str, credential_type: CredentialType, value: &str) -> PharmacyCredential {
    PharmacyCredential {
        pharmacy_id: pharmacy_id.to_string(),
        credential_type,
        credential_value: value.to_string(),
    }
}

/// Client pointed at a mock server
pub fn client_for(base_url: &str) -> BaremedsClient {
    BaremedsClient::new(ClientConfig::default().with_base_url(base_url)).expect("client builds")
}

/// Retry policy with millisecond delays
pub fn fast_retry_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new(max_attempts).with_base_delay(1).with_max_delay(5)
}

/// Diagnostics stub that records how often it was consulted
#[derive(Debug, Default)]
pub struct CountingDiagnostics {
    calls: AtomicUsize,
    fail: bool,
}

impl CountingDiagnostics {
    pub fn passing() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiagnosticsCheck for CountingDiagnostics {
    async fn check(&self, pharmacy: &PharmacyConfig) -> Result<DiagnosticsReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let check = if self.fail {
            CheckResult::fail("credentials", "Missing credential(s)", &["Add credentials"])
        } else {
            CheckResult::pass("credentials", "ok")
        };
        Ok(DiagnosticsReport::from_checks(&pharmacy.id, vec![check]))
    }
}

/// Everything a dispatch test needs, with handles kept for assertions
pub struct Harness {
    pub orchestrator: DispatchOrchestrator,
    pub diagnostics: Arc<CountingDiagnostics>,
}

/// Orchestrator over an in-memory store, a static token and the given base URL
pub fn harness(store: InMemoryStore, base_url: &str) -> Harness {
    harness_with(store, base_url, Arc::new(CountingDiagnostics::passing()))
}

pub fn harness_with(store: InMemoryStore, base_url: &str, diagnostics: Arc<CountingDiagnostics>) -> Harness {
    let tokens: Arc<dyn TokenProvider> = Arc::new(StaticTokenProvider::new(TEST_TOKEN));
    harness_with_tokens(store, base_url, diagnostics, tokens)
}

/// Orchestrator with its default (one-shot) send policy and the given token source
pub fn harness_with_tokens(
    store: InMemoryStore,
    base_url: &str,
    diagnostics: Arc<CountingDiagnostics>,
    tokens: Arc<dyn TokenProvider>,
) -> Harness {
    let orchestrator = DispatchOrchestrator::new(
        Arc::new(store),
        diagnostics.clone(),
        tokens,
        client_for(base_url),
    );

    Harness {
        orchestrator,
        diagnostics,
    }
}
