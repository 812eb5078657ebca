//! Rxdispatch Core - Pharmacy order dispatch engine
//!
//! This crate provides the core functionality for sending prescription orders
//! to external pharmacy APIs and testing those integrations safely.
//!
//! # Main Components
//!
//! - **Error Handling**: Comprehensive error types using `thiserror` and `anyhow`
//! - **Core Types**: Pharmacy configuration, credentials and order records
//! - **Payload Builders**: Test and production prescription payloads
//! - **HTTP Layer**: Authenticated fetch client with dry-run, auth handlers and retry
//! - **Orchestrators**: Single-order dispatch and the integration self-test
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rxdispatch_core::{
//!     BaremedsClient, ClientConfig, DispatchOrchestrator, DispatchRequest, InMemoryStore,
//!     LocalDiagnostics, StaticTokenProvider,
//! };
//!
//! async fn example() -> rxdispatch_core::Result<()> {
//!     let config = ClientConfig::from_env();
//!     let store = Arc::new(InMemoryStore::new());
//!     let diagnostics = Arc::new(LocalDiagnostics::new(store.clone(), config.base_url.clone()));
//!     let tokens = Arc::new(StaticTokenProvider::new("token"));
//!     let orchestrator =
//!         DispatchOrchestrator::new(store, diagnostics, tokens, BaremedsClient::new(config)?);
//!
//!     let outcome = orchestrator
//!         .dispatch_test_order(&DispatchRequest::new("pharmacy-1").with_dry_run(true))
//!         .await;
//!     println!("{} {}", outcome.status, outcome.body);
//!     Ok(())
//! }
//! ```

pub mod diagnostics;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod payload;
pub mod redaction;
pub mod selftest;
pub mod site_id;
pub mod store;
pub mod token;
pub mod types;

// Re-export main types for convenience
pub use error::{Error, ErrorKind, Result};
pub use types::{
    AuthType, CredentialType, Credentials, OrderLineRecord, OrderRecord, PharmacyConfig,
    PharmacyCredential,
};

pub use diagnostics::{CheckResult, DiagnosticsCheck, DiagnosticsReport, HttpDiagnostics, LocalDiagnostics};
pub use dispatch::{DispatchOrchestrator, DispatchOutcome, DispatchRequest, DispatchStage};
pub use http::{
    BaremedsClient, ClientConfig, ErrorClassification, FetchOptions, FetchResponse, RetryPolicy,
};
pub use payload::{
    create_generic_order_payload, create_production_order_payload, create_test_order_payload,
    GenericOrderPayload, PrescriptionPayload,
};
pub use selftest::{SelfTestReport, SelfTestRequest, SelfTestRunner, TestDetail};
pub use site_id::extract_site_id_from_url;
pub use store::{InMemoryStore, PharmacyStore, RestStore};
pub use token::{HttpTokenProvider, StaticTokenProvider, TokenProvider};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
