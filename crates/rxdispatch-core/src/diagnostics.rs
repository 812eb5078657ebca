//! Pre-flight diagnostics for pharmacy dispatch
//!
//! A dispatch is only attempted once diagnostics pass. Diagnostics either run
//! locally against the configuration store or are delegated to a remote
//! diagnostics service; either way the report is passed back to the caller
//! verbatim when it fails.

use std::fmt;
use std::sync::Arc;
use async_trait::async_trait;
use colored::Colorize;
use reqwest::Client as ReqwestClient;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use crate::site_id::extract_site_id_from_url;
use crate::store::PharmacyStore;
use crate::types::{AuthType, CredentialType, Credentials, PharmacyConfig};
use crate::{Error, Result};

/// Outcome of a single diagnostic check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_actions: Vec<String>,
}

impl CheckResult {
    pub fn pass(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            message: message.into(),
            suggested_actions: Vec::new(),
        }
    }

    pub fn fail(name: &str, message: impl Into<String>, actions: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            message: message.into(),
            suggested_actions: actions.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// Full diagnostics report for one pharmacy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsReport {
    pub success: bool,
    #[serde(default)]
    pub pharmacy_id: Option<String>,
    #[serde(default)]
    pub checks: Vec<CheckResult>,
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Fields a remote diagnostics service returned beyond the ones above
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    /// Body exactly as a remote diagnostics service sent it
    #[serde(skip)]
    pub raw: Option<Value>,
}

impl DiagnosticsReport {
    /// Build from a list of checks; passes only when every check passed
    pub fn from_checks(pharmacy_id: &str, checks: Vec<CheckResult>) -> Self {
        Self {
            success: checks.iter().all(|c| c.passed),
            pharmacy_id: Some(pharmacy_id.to_string()),
            checks,
            timestamp: Some(chrono::Utc::now().to_rfc3339()),
            extra: Map::new(),
            raw: None,
        }
    }

    /// Interpret an arbitrary JSON body from a diagnostics service.
    ///
    /// The body is kept as received and [`to_value`](Self::to_value) returns it unchanged.
    pub fn from_value(value: Value) -> Self {
        let raw = Some(value.clone());
        match serde_json::from_value::<DiagnosticsReport>(value.clone()) {
            Ok(report) => Self { raw, ..report },
            Err(_) => Self {
                success: value.get("success").and_then(Value::as_bool).unwrap_or(false),
                pharmacy_id: None,
                checks: Vec::new(),
                timestamp: None,
                extra: match value {
                    Value::Object(map) => map,
                    other => {
                        let mut map = Map::new();
                        map.insert("response".to_string(), other);
                        map
                    }
                },
                raw,
            },
        }
    }

    /// Failed checks only
    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().filter(|c| !c.passed)
    }

    /// Report as JSON, for response bodies
    pub fn to_value(&self) -> Value {
        if let Some(raw) = &self.raw {
            return raw.clone();
        }
        serde_json::to_value(self).unwrap_or_else(|_| json!({ "success": self.success }))
    }

    /// Format for terminal output
    pub fn format_display(&self, use_color: bool) -> String {
        let mut output = String::new();
        let title = if self.success { "DIAGNOSTICS PASSED" } else { "DIAGNOSTICS FAILED" };
        let header = format!("\n{}\n {} \n{}\n", "═".repeat(50), title, "═".repeat(50));

        if !use_color {
            output.push_str(&header);
        } else if self.success {
            output.push_str(&header.green().bold().to_string());
        } else {
            output.push_str(&header.red().bold().to_string());
        }

        if let Some(ref id) = self.pharmacy_id {
            output.push_str(&format!("\n📍 Pharmacy: {}\n", id));
        }

        output.push('\n');
        for check in &self.checks {
            let mark = match (check.passed, use_color) {
                (true, true) => "✓".green().to_string(),
                (false, true) => "✗".red().to_string(),
                (true, false) => "✓".to_string(),
                (false, false) => "✗".to_string(),
            };
            output.push_str(&format!("  {} {}: {}\n", mark, check.name, check.message));
        }

        let actions: Vec<&String> = self.failures().flat_map(|c| &c.suggested_actions).collect();
        if !actions.is_empty() {
            output.push_str("\n💡 Suggested actions:\n");
            for (i, action) in actions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, action));
            }
        }

        output.push_str(&format!("\n{}\n", "═".repeat(50)));
        output
    }
}

impl fmt::Display for DiagnosticsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_display(false))
    }
}

/// Pre-flight check run before a dispatch
#[async_trait]
pub trait DiagnosticsCheck: Send + Sync {
    async fn check(&self, pharmacy: &PharmacyConfig) -> Result<DiagnosticsReport>;
}

/// Diagnostics evaluated in-process from configuration and credentials
#[derive(Clone)]
pub struct LocalDiagnostics {
    store: Arc<dyn PharmacyStore>,
    base_url: String,
}

impl LocalDiagnostics {
    pub fn new(store: Arc<dyn PharmacyStore>, base_url: impl Into<String>) -> Self {
        Self {
            store,
            base_url: base_url.into(),
        }
    }

    fn check_endpoint(pharmacy: &PharmacyConfig) -> CheckResult {
        let Some(endpoint) = pharmacy.endpoint_url() else {
            return CheckResult::fail(
                "endpoint_url",
                "Pharmacy API endpoint URL not configured",
                &["Set api_endpoint_url on the pharmacy record"],
            );
        };

        match url::Url::parse(endpoint) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                CheckResult::pass("endpoint_url", format!("Endpoint {} is well formed", endpoint))
            }
            Ok(url) => CheckResult::fail(
                "endpoint_url",
                format!("Unsupported URL scheme '{}'", url.scheme()),
                &["Use an http or https endpoint URL"],
            ),
            Err(e) => CheckResult::fail(
                "endpoint_url",
                format!("Endpoint URL is invalid: {}", e),
                &["Check the endpoint URL for typos", "Include the scheme, e.g. https://"],
            ),
        }
    }

    fn check_base_url(&self) -> CheckResult {
        match url::Url::parse(&self.base_url) {
            Ok(_) => CheckResult::pass("base_url", format!("BareMeds API base URL {}", self.base_url)),
            Err(e) => CheckResult::fail(
                "base_url",
                format!("BareMeds API base URL '{}' is invalid: {}", self.base_url, e),
                &["Set BAREMEDS_API_URL to the BareMeds API root"],
            ),
        }
    }

    fn check_site_id(pharmacy: &PharmacyConfig) -> CheckResult {
        match pharmacy.endpoint_url().and_then(extract_site_id_from_url) {
            Some(site_id) => CheckResult::pass("site_id", format!("Site id {}", site_id)),
            None => CheckResult::pass("site_id", "No site id in endpoint URL; payloads omit site_id"),
        }
    }

    fn check_credentials(pharmacy: &PharmacyConfig, credentials: &Credentials) -> CheckResult {
        let required: &[CredentialType] = match pharmacy.api_auth_type {
            AuthType::Bearer => &[CredentialType::BearerToken],
            AuthType::ApiKey => &[CredentialType::ApiKey],
            AuthType::Basic => &[CredentialType::Username, CredentialType::Password],
            AuthType::Baremeds => &[],
        };

        let missing: Vec<String> = required
            .iter()
            .filter(|t| credentials.get(t).is_none())
            .map(|t| serde_json::to_value(t).ok().and_then(|v| v.as_str().map(str::to_string)).unwrap_or_default())
            .collect();

        if missing.is_empty() {
            CheckResult::pass(
                "credentials",
                format!("{} credential(s) present for {} auth", credentials.len(), pharmacy.api_auth_type),
            )
        } else {
            CheckResult::fail(
                "credentials",
                format!("Missing credential(s) for {} auth: {}", pharmacy.api_auth_type, missing.join(", ")),
                &["Add the missing credentials for this pharmacy in the admin console"],
            )
        }
    }
}

#[async_trait]
impl DiagnosticsCheck for LocalDiagnostics {
    async fn check(&self, pharmacy: &PharmacyConfig) -> Result<DiagnosticsReport> {
        let mut checks = vec![if pharmacy.api_enabled {
            CheckResult::pass("api_enabled", "Pharmacy API is enabled")
        } else {
            CheckResult::fail(
                "api_enabled",
                "Pharmacy API not enabled",
                &["Enable the API integration for this pharmacy"],
            )
        }];

        checks.push(Self::check_endpoint(pharmacy));
        if pharmacy.api_auth_type == AuthType::Baremeds {
            checks.push(self.check_base_url());
            checks.push(Self::check_site_id(pharmacy));
        }

        let credentials = self.store.get_credentials(&pharmacy.id).await?;
        checks.push(Self::check_credentials(pharmacy, &credentials));

        let report = DiagnosticsReport::from_checks(&pharmacy.id, checks);
        tracing::debug!(pharmacy_id = %pharmacy.id, success = report.success, "Local diagnostics complete");
        Ok(report)
    }
}

/// Diagnostics delegated to a remote service that answers `{ success, ... }`
#[derive(Debug, Clone)]
pub struct HttpDiagnostics {
    client: ReqwestClient,
    url: String,
    auth_key: Option<String>,
}

impl HttpDiagnostics {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: ReqwestClient::new(),
            url: url.into(),
            auth_key: None,
        }
    }

    pub fn with_auth_key(mut self, key: impl Into<String>) -> Self {
        self.auth_key = Some(key.into());
        self
    }
}

#[async_trait]
impl DiagnosticsCheck for HttpDiagnostics {
    async fn check(&self, pharmacy: &PharmacyConfig) -> Result<DiagnosticsReport> {
        let mut request = self.client.post(&self.url).json(&json!({ "pharmacy_id": pharmacy.id }));
        if let Some(key) = &self.auth_key {
            request = request.header("apikey", key).bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| Error::Diagnostics {
            message: format!("Diagnostics service unreachable: {}", e),
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|e| Error::Diagnostics {
            message: format!("Failed to read diagnostics response: {}", e),
        })?;

        match serde_json::from_str::<Value>(&body) {
            Ok(value) => Ok(DiagnosticsReport::from_value(value)),
            Err(_) => Err(Error::Diagnostics {
                message: format!("Diagnostics service returned {} with a non-JSON body", status.as_u16()),
            }),
        }
    }
}
