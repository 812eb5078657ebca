//! Timeout guard for outbound requests
//!
//! Wraps a request future in `tokio::time::timeout` so an unresponsive
//! upstream surfaces as [`Error::Timeout`] instead of hanging the handler.

use std::future::Future;
use std::time::Duration;
use crate::{Error, Result};

/// Default request timeout when neither the pharmacy nor the caller sets one
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Seconds to report for a duration, never zero
pub fn reported_seconds(timeout: Duration) -> u64 {
    timeout.as_secs().max(1)
}

/// Run a fallible future under a deadline
pub async fn with_timeout<F, T>(future: F, timeout: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            seconds: reported_seconds(timeout),
        }),
    }
}
