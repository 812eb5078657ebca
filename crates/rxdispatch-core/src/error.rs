//! Error types for the rxdispatch core library
//!
//! This module defines the error handling system for pharmacy dispatch,
//! using thiserror for ergonomic error definitions and anyhow for flexible error contexts.

use std::fmt;
use thiserror::Error;
use serde::{Deserialize, Serialize};

/// Main error type for dispatch operations
#[derive(Error, Debug)]
pub enum Error {
    /// Pharmacy configuration is unusable (disabled, missing endpoint, bad auth setup)
    #[error("{message}")]
    Configuration {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// A looked-up record does not exist
    #[error("{message}")]
    NotFound {
        message: String,
        resource: String,
    },

    /// Validation errors for inputs
    #[error("Validation error: {field} - {message}")]
    Validation {
        field: String,
        message: String,
        expected: Option<String>,
    },

    /// Network-level failure talking to an upstream (DNS, connect, reset)
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// An outbound request exceeded its time budget
    #[error("Request timed out after {seconds} seconds")]
    Timeout {
        seconds: u64,
    },

    /// Bearer token acquisition failed
    #[error("{message}")]
    Token {
        message: String,
    },

    /// Pre-flight diagnostics collaborator failed or could not be reached
    #[error("Diagnostics error: {message}")]
    Diagnostics {
        message: String,
    },

    /// Configuration store failures
    #[error("Store error: {message}")]
    Store {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// JSON parsing and serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// Upstream answered with an unexpected HTTP status
    #[error("HTTP error: {message}")]
    Http {
        message: String,
        status_code: Option<u16>,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Generic internal error with context
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Convenience type alias for Results using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Broad family an error belongs to, used to pick the HTTP status of a failure response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Detected before any network call, never retried
    Configuration,
    /// Pre-flight check rejected the dispatch
    Diagnostics,
    /// DNS, connect, reset or timeout
    Transport,
    /// Upstream answered non-2xx
    Upstream,
    /// Anything else
    Internal,
}

impl Error {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            source: None,
        }
    }

    /// Create a not-found error for the given resource kind
    pub fn not_found(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Create a store error without an underlying source
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            source: None,
        }
    }

    /// Create a transport error from a reqwest failure
    pub fn transport(err: reqwest::Error) -> Self {
        Self::Transport {
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Error family for response mapping
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } | Self::NotFound { .. } | Self::Validation { .. } => {
                ErrorKind::Configuration
            }
            Self::Diagnostics { .. } => ErrorKind::Diagnostics,
            Self::Transport { .. } | Self::Timeout { .. } => ErrorKind::Transport,
            Self::Http { .. } => ErrorKind::Upstream,
            Self::Token { .. } | Self::Store { .. } | Self::Json { .. } | Self::Internal { .. } => {
                ErrorKind::Internal
            }
        }
    }

    /// HTTP status an operator-facing handler should answer with for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Configuration { .. }
            | Self::NotFound { .. }
            | Self::Validation { .. }
            | Self::Diagnostics { .. } => 400,
            Self::Timeout { .. } => 504,
            Self::Transport { .. } => 502,
            Self::Http { status_code, .. } => status_code.unwrap_or(502),
            Self::Token { .. } | Self::Store { .. } | Self::Json { .. } | Self::Internal { .. } => {
                500
            }
        }
    }

    /// Whether repeating the same call could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } => true,
            Self::Http { status_code: Some(code), .. } => {
                crate::http::error::is_retryable_status_code(*code)
            }
            _ => false,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Configuration => write!(f, "configuration"),
            ErrorKind::Diagnostics => write!(f, "diagnostics"),
            ErrorKind::Transport => write!(f, "transport"),
            ErrorKind::Upstream => write!(f, "upstream"),
            ErrorKind::Internal => write!(f, "internal"),
        }
    }
}

// Conversion implementations
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::transport(err)
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal {
            message: err.to_string(),
            source: err,
        }
    }
}
