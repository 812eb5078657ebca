//! HTTP status classification for retry logic
//!
//! Maps upstream status codes and transport failures onto a small set of
//! classes, and answers the one question callers care about: retry or not.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether an upstream HTTP status is worth retrying.
///
/// True for 429 and every 5xx. Everything else (2xx/3xx need no retry, other
/// 4xx will not change on repeat) is false.
pub fn is_retryable_status_code(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

/// Classification of HTTP errors for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClassification {
    /// Request completed with 2xx/3xx
    Success,
    /// Client errors (4xx) - should not retry
    ClientError,
    /// Authentication errors (401/403) - should not retry
    AuthenticationError,
    /// Rate limiting (429) - should retry with backoff
    RateLimitError,
    /// Server errors (5xx) - should retry
    ServerError,
    /// Connection-level failures - should retry
    NetworkError,
    /// Request exceeded its time budget - should retry
    TimeoutError,
    /// Unknown errors - default to no retry
    Unknown,
}

impl ErrorClassification {
    /// Classify an HTTP status code
    pub fn classify_status(status: u16) -> Self {
        match status {
            200..=399 => ErrorClassification::Success,
            401 | 403 => ErrorClassification::AuthenticationError,
            429 => ErrorClassification::RateLimitError,
            400..=499 => ErrorClassification::ClientError,
            500..=599 => ErrorClassification::ServerError,
            _ => ErrorClassification::Unknown,
        }
    }

    /// Classify a crate error
    pub fn classify_error(error: &crate::Error) -> Self {
        match error {
            crate::Error::Timeout { .. } => ErrorClassification::TimeoutError,
            crate::Error::Transport { .. } => ErrorClassification::NetworkError,
            crate::Error::Http { status_code: Some(code), .. } => Self::classify_status(*code),
            _ => ErrorClassification::Unknown,
        }
    }

    /// Check if this error type should be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorClassification::ServerError
                | ErrorClassification::NetworkError
                | ErrorClassification::TimeoutError
                | ErrorClassification::RateLimitError
        )
    }
}

impl fmt::Display for ErrorClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorClassification::Success => "success",
            ErrorClassification::ClientError => "client_error",
            ErrorClassification::AuthenticationError => "authentication_error",
            ErrorClassification::RateLimitError => "rate_limit_error",
            ErrorClassification::ServerError => "server_error",
            ErrorClassification::NetworkError => "network_error",
            ErrorClassification::TimeoutError => "timeout_error",
            ErrorClassification::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}
