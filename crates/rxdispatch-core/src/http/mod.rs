//! HTTP layer for pharmacy API communication
//!
//! This module provides:
//! - An authenticated fetch client with dry-run support
//! - Authentication handlers for each pharmacy auth scheme
//! - Status classification and the retryable-status predicate
//! - A retry driver with exponential backoff
//! - Timeout guards for outbound requests

pub mod auth;
pub mod client;
pub mod error;
pub mod retry;
pub mod timeout;

pub use auth::{auth_headers, create_auth_handler, AuthHandler, ApiKeyAuth, BasicAuth, BearerAuth};
pub use client::{BaremedsClient, ClientConfig, FetchOptions, FetchResponse};
pub use error::{is_retryable_status_code, ErrorClassification};
pub use retry::{
    backoff_delay, calculate_backoff_delay, execute_with_retry, Retried, RetryDecision,
    RetryHandler, RetryPolicy, RetryableOutcome, DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_DELAY_MS,
};
pub use timeout::with_timeout;

// Re-export commonly used types
pub use reqwest::{Method, StatusCode};
