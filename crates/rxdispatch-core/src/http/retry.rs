//! Retry logic with exponential backoff for outbound pharmacy calls
//!
//! The fetch client never retries on its own. Callers that want resilience
//! against transient upstream failures wrap their call in [`execute_with_retry`].

use std::future::Future;
use std::time::Duration;
use backoff::{ExponentialBackoff, backoff::Backoff};
use serde::{Deserialize, Serialize};
use crate::http::error::ErrorClassification;
use crate::Result;

/// Default first backoff step in milliseconds
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;

/// Default backoff ceiling in milliseconds
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Exponential backoff delay for a zero-indexed attempt: `min(base * 2^attempt, max)`.
///
/// Saturates instead of overflowing, so very large attempt numbers simply
/// return `max_delay_ms`. No jitter is applied here; see [`RetryPolicy::jitter`].
pub fn calculate_backoff_delay(attempt: u32, base_delay_ms: u64, max_delay_ms: u64) -> u64 {
    let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
    base_delay_ms.saturating_mul(factor).min(max_delay_ms)
}

/// [`calculate_backoff_delay`] with the default base and ceiling
pub fn backoff_delay(attempt: u32) -> u64 {
    calculate_backoff_delay(attempt, DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_DELAY_MS)
}

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_attempts: u32,
    /// Base delay for exponential backoff (in milliseconds)
    pub base_delay_ms: u64,
    /// Maximum delay between retries (in milliseconds)
    pub max_delay_ms: u64,
    /// Randomize delays to spread out concurrent retries
    pub jitter: bool,
    /// Whether a timed-out attempt may be repeated; a timed-out POST may
    /// still have been accepted upstream
    pub retry_timeouts: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter: false,
            retry_timeouts: true,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy with custom settings
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// A policy that performs exactly one attempt
    pub fn none() -> Self {
        Self::new(0)
    }

    /// Set the base delay
    pub fn with_base_delay(mut self, millis: u64) -> Self {
        self.base_delay_ms = millis;
        self
    }

    /// Set the maximum delay
    pub fn with_max_delay(mut self, millis: u64) -> Self {
        self.max_delay_ms = millis;
        self
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Never repeat an attempt that timed out
    pub fn without_timeout_retries(mut self) -> Self {
        self.retry_timeouts = false;
        self
    }

    /// Create the randomized exponential backoff used when jitter is on
    pub fn create_backoff(&self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(self.base_delay_ms),
            max_interval: Duration::from_millis(self.max_delay_ms),
            multiplier: 2.0,
            max_elapsed_time: None, // We handle max attempts separately
            ..Default::default()
        };

        if !self.jitter {
            backoff.randomization_factor = 0.0;
        }

        backoff.reset();
        backoff
    }
}

/// Anything the retry driver can inspect to decide whether to go again
pub trait RetryableOutcome {
    /// Whether the same call could succeed if repeated
    fn is_retryable(&self) -> bool;

    /// Server-provided delay hint, if any
    fn retry_after(&self) -> Option<Duration> {
        None
    }

    /// Whether the attempt ended because it ran out of time
    fn is_timeout(&self) -> bool {
        false
    }
}

impl RetryableOutcome for crate::Error {
    fn is_retryable(&self) -> bool {
        ErrorClassification::classify_error(self).is_retryable()
    }

    fn is_timeout(&self) -> bool {
        matches!(self, crate::Error::Timeout { .. })
    }
}

/// Decision on whether to retry a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the request after the specified delay
    Retry { delay: Duration },
    /// Do not retry the request
    NoRetry,
}

/// Retry bookkeeping for a single logical request
#[derive(Debug)]
pub struct RetryHandler {
    policy: RetryPolicy,
    attempts: u32,
    backoff: ExponentialBackoff,
}

impl RetryHandler {
    /// Create a new retry handler with the given policy
    pub fn new(policy: RetryPolicy) -> Self {
        let backoff = policy.create_backoff();
        Self {
            policy,
            attempts: 0,
            backoff,
        }
    }

    /// Determine if a request should be retried based on its outcome
    pub fn should_retry<O: RetryableOutcome + ?Sized>(&mut self, outcome: &O) -> RetryDecision {
        if self.attempts >= self.policy.max_attempts {
            return RetryDecision::NoRetry;
        }

        if !outcome.is_retryable() {
            return RetryDecision::NoRetry;
        }

        if outcome.is_timeout() && !self.policy.retry_timeouts {
            return RetryDecision::NoRetry;
        }

        let delay = self.calculate_delay(outcome.retry_after());
        self.attempts += 1;

        RetryDecision::Retry { delay }
    }

    /// Calculate the delay before the next retry
    fn calculate_delay(&mut self, retry_after: Option<Duration>) -> Duration {
        let ceiling = Duration::from_millis(self.policy.max_delay_ms);

        // Retry-After wins over the computed schedule, but never past the ceiling
        if let Some(hint) = retry_after {
            return hint.min(ceiling);
        }

        if self.policy.jitter {
            return self.backoff.next_backoff().unwrap_or(ceiling);
        }

        Duration::from_millis(calculate_backoff_delay(
            self.attempts,
            self.policy.base_delay_ms,
            self.policy.max_delay_ms,
        ))
    }

    /// Reset the retry handler for a new request
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.backoff.reset();
    }

    /// Get the number of retries made so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Final result of a retried operation
#[derive(Debug)]
pub struct Retried<T> {
    /// Outcome of the last attempt
    pub result: Result<T>,
    /// Total number of calls made, including the first
    pub attempts: u32,
}

impl<T> Retried<T> {
    /// Drop the attempt count
    pub fn into_result(self) -> Result<T> {
        self.result
    }
}

/// Execute an operation with retry logic.
///
/// Retries while the outcome (a successful value such as a 503 response, or an
/// error such as a timeout) reports itself retryable and the policy still has
/// attempts left. Non-retryable outcomes are returned immediately.
pub async fn execute_with_retry<F, Fut, T>(mut operation: F, policy: &RetryPolicy) -> Retried<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
    T: RetryableOutcome,
{
    let mut handler = RetryHandler::new(policy.clone());
    let mut calls = 0u32;

    loop {
        calls += 1;
        let result = operation(calls).await;

        let decision = match &result {
            Ok(value) => handler.should_retry(value),
            Err(error) => handler.should_retry(error),
        };

        match decision {
            RetryDecision::Retry { delay } => {
                log::warn!(
                    "Attempt {} failed with a retryable outcome, retrying after {:?}",
                    calls,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            RetryDecision::NoRetry => {
                let retryable_and_exhausted = match &result {
                    Ok(value) => value.is_retryable(),
                    Err(error) => error.is_retryable(),
                };
                if retryable_and_exhausted && calls > 1 {
                    log::error!("Request still failing after {} attempts, giving up", calls);
                }
                return Retried { result, attempts: calls };
            }
        }
    }
}
