//! Authenticated fetch client for the BareMeds API
//!
//! Injects the bearer token, logs request and response with secrets redacted,
//! and supports a dry-run mode that validates configuration end to end
//! without sending any traffic. The client performs no retries itself; see
//! [`BaremedsClient::fetch_with_retry`] for the policy-driven wrapper.

use std::time::{Duration, Instant};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client as ReqwestClient, Method};
use serde_json::{json, Value};
use crate::http::retry::{execute_with_retry, Retried, RetryPolicy, RetryableOutcome};
use crate::http::timeout::{reported_seconds, with_timeout, DEFAULT_REQUEST_TIMEOUT};
use crate::redaction;
use crate::{Error, Result};

/// Environment variable overriding the BareMeds base URL
pub const BASE_URL_ENV: &str = "BAREMEDS_API_URL";

/// Base URL used when nothing is configured
pub const DEFAULT_BASE_URL: &str = "https://staging-api.baremeds.com";

/// Characters of the response body included in debug logs
const PREVIEW_CHARS: usize = 500;

/// Configuration for the fetch client
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base URL endpoint paths are appended to
    pub base_url: String,
    /// Default request timeout
    pub timeout: Duration,
    /// User-Agent header value
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: format!("rxdispatch/{}", crate::VERSION),
        }
    }
}

impl ClientConfig {
    /// Defaults with the base URL taken from `BAREMEDS_API_URL` when set
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
            if !base_url.trim().is_empty() {
                config.base_url = base_url.trim().to_string();
            }
        }
        config
    }

    /// Override the base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the default timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Per-call options
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Log and fabricate a response instead of sending
    pub dry_run: bool,
    /// HTTP method, POST by default
    pub method: Method,
    /// Extra headers; these override the defaults on name collision
    pub headers: Vec<(String, String)>,
    /// Override of the client's default timeout
    pub timeout: Option<Duration>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            method: Method::POST,
            headers: Vec::new(),
            timeout: None,
        }
    }
}

impl FetchOptions {
    pub fn dry_run(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Fully-read upstream response
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    /// True when fabricated by a dry run
    pub dry_run: bool,
}

impl FetchResponse {
    /// 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parsed JSON body, if it is JSON
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }

    /// Parsed JSON body, or the raw text as a JSON string
    pub fn json_or_text(&self) -> Value {
        self.json().unwrap_or_else(|| Value::String(self.body.clone()))
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

impl RetryableOutcome for FetchResponse {
    fn is_retryable(&self) -> bool {
        !self.dry_run && crate::http::error::is_retryable_status_code(self.status)
    }

    fn retry_after(&self) -> Option<Duration> {
        self.header("retry-after")
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }
}

/// Fetch client for the BareMeds API and other pharmacy endpoints
#[derive(Debug, Clone)]
pub struct BaremedsClient {
    client: ReqwestClient,
    config: ClientConfig,
}

impl BaremedsClient {
    /// Create a new client from an explicit configuration
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = ReqwestClient::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(e.into()),
            })?;

        Ok(Self { client, config })
    }

    /// Create with configuration read from the environment
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Base URL joined with an endpoint path
    pub fn full_url(&self, endpoint: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        if endpoint.is_empty() {
            base.to_string()
        } else if endpoint.starts_with('/') {
            format!("{}{}", base, endpoint)
        } else {
            format!("{}/{}", base, endpoint)
        }
    }

    /// Send `payload` to `endpoint` with `Authorization: Bearer <token>`.
    ///
    /// Non-2xx responses are returned, not raised. Transport failures are
    /// logged and returned as errors.
    pub async fn fetch(
        &self,
        endpoint: &str,
        payload: &Value,
        token: &str,
        options: &FetchOptions,
    ) -> Result<FetchResponse> {
        let mut headers = vec![
            (CONTENT_TYPE.as_str().to_string(), "application/json".to_string()),
            (AUTHORIZATION.as_str().to_string(), format!("Bearer {}", token)),
        ];
        headers.extend(options.headers.iter().cloned());

        let url = self.full_url(endpoint);
        self.send(&url, payload, &headers, options).await
    }

    /// [`fetch`](Self::fetch) wrapped in the retry driver
    pub async fn fetch_with_retry(
        &self,
        endpoint: &str,
        payload: &Value,
        token: &str,
        options: &FetchOptions,
        policy: &RetryPolicy,
    ) -> Retried<FetchResponse> {
        execute_with_retry(|_| self.fetch(endpoint, payload, token, options), policy).await
    }

    /// Send to an absolute URL with exactly the given headers.
    ///
    /// Used by pharmacies that authenticate with their own header scheme.
    pub async fn send_raw(
        &self,
        url: &str,
        payload: &Value,
        headers: &[(String, String)],
        options: &FetchOptions,
    ) -> Result<FetchResponse> {
        let mut all_headers = vec![(CONTENT_TYPE.as_str().to_string(), "application/json".to_string())];
        all_headers.extend(headers.iter().cloned());
        all_headers.extend(options.headers.iter().cloned());
        self.send(url, payload, &all_headers, options).await
    }

    /// [`send_raw`](Self::send_raw) wrapped in the retry driver
    pub async fn send_raw_with_retry(
        &self,
        url: &str,
        payload: &Value,
        headers: &[(String, String)],
        options: &FetchOptions,
        policy: &RetryPolicy,
    ) -> Retried<FetchResponse> {
        execute_with_retry(|_| self.send_raw(url, payload, headers, options), policy).await
    }

    async fn send(
        &self,
        url: &str,
        payload: &Value,
        headers: &[(String, String)],
        options: &FetchOptions,
    ) -> Result<FetchResponse> {
        let header_map = build_header_map(headers)?;
        let logged_headers = redaction::sanitize_headers(
            header_map
                .iter()
                .map(|(name, value)| (name.as_str(), value.to_str().unwrap_or("<binary>"))),
        );

        if options.dry_run {
            return Ok(self.dry_run_response(url, payload, &options.method, logged_headers));
        }

        tracing::info!(
            method = %options.method,
            url = %url,
            headers = %logged_headers,
            "Sending pharmacy API request"
        );
        tracing::debug!(payload = %redaction::sanitize(payload), "Request payload");

        let timeout = options.timeout.unwrap_or(self.config.timeout);
        let mut request = self
            .client
            .request(options.method.clone(), url)
            .headers(header_map)
            .timeout(timeout);
        if options.method != Method::GET {
            request = request.json(payload);
        }

        let started = Instant::now();
        let outcome = with_timeout(
            async {
                let response = request.send().await?;
                let status = response.status().as_u16();
                let response_headers = response
                    .headers()
                    .iter()
                    .map(|(name, value)| {
                        (name.as_str().to_string(), value.to_str().unwrap_or_default().to_string())
                    })
                    .collect::<Vec<_>>();
                let body = response.text().await?;
                Ok::<_, Error>((status, response_headers, body))
            },
            timeout,
        )
        .await;

        let (status, response_headers, body) = match outcome {
            Ok(parts) => parts,
            Err(error) => {
                let error = normalize_transport_error(error, timeout);
                tracing::error!(
                    url = %url,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %error,
                    "Pharmacy API request failed before a response was received"
                );
                return Err(error);
            }
        };

        let response = FetchResponse {
            status,
            headers: response_headers,
            body,
            dry_run: false,
        };
        log_response(url, &response, started.elapsed());
        Ok(response)
    }

    fn dry_run_response(
        &self,
        url: &str,
        payload: &Value,
        method: &Method,
        logged_headers: Value,
    ) -> FetchResponse {
        let payload_size_bytes = serde_json::to_vec(payload).map(|b| b.len()).unwrap_or(0);

        tracing::info!(
            method = %method,
            url = %url,
            headers = %logged_headers,
            payload_size_bytes,
            "DRY RUN: request not sent"
        );
        tracing::debug!(payload = %redaction::sanitize(payload), "DRY RUN payload");

        let body = json!({
            "dry_run": true,
            "message": "Dry run - request was not sent",
            "would_send_to": url,
            "method": method.as_str(),
            "headers": logged_headers,
            "payload": payload,
            "payload_size_bytes": payload_size_bytes,
        });

        FetchResponse {
            status: 200,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: body.to_string(),
            dry_run: true,
        }
    }
}

fn build_header_map(headers: &[(String, String)]) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| Error::Validation {
            field: "headers".to_string(),
            message: format!("Invalid header name '{}'", name),
            expected: None,
        })?;
        let header_value = HeaderValue::from_str(value).map_err(|_| Error::Validation {
            field: "headers".to_string(),
            message: format!("Invalid value for header '{}'", name),
            expected: None,
        })?;
        // later entries override earlier ones
        map.insert(header_name, header_value);
    }
    Ok(map)
}

fn normalize_transport_error(error: Error, timeout: Duration) -> Error {
    match error {
        Error::Transport { source: Some(ref e), .. } if e.is_timeout() => Error::Timeout {
            seconds: reported_seconds(timeout),
        },
        other => other,
    }
}

fn log_response(url: &str, response: &FetchResponse, elapsed: Duration) {
    let preview: String = response.body.chars().take(PREVIEW_CHARS).collect();
    tracing::info!(
        url = %url,
        status = response.status,
        elapsed_ms = elapsed.as_millis() as u64,
        "Pharmacy API responded"
    );
    tracing::debug!(preview = %redaction::redact_sensitive(&preview), "Response body preview");

    if response.is_success() {
        return;
    }

    let sanitized = redaction::sanitize(&response.json_or_text());
    if response.status >= 500 {
        tracing::error!(url = %url, status = response.status, body = %sanitized, "Pharmacy API server error");
    } else {
        tracing::warn!(url = %url, status = response.status, body = %sanitized, "Pharmacy API returned non-success status");
    }
}
