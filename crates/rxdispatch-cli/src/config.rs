//! Configuration management for the CLI
//!
//! This module handles loading and merging configuration from:
//! - Default values
//! - Configuration files (YAML/JSON/TOML)
//! - Environment variables
//!
//! and assembles the dispatch orchestrator from it.

use crate::error::{Error, Result};
use async_trait::async_trait;
use rxdispatch_core::http::client::BASE_URL_ENV;
use rxdispatch_core::redaction;
use rxdispatch_core::{
    AuthType, BaremedsClient, ClientConfig, DiagnosticsCheck, DispatchOrchestrator,
    HttpDiagnostics, HttpTokenProvider, InMemoryStore, LocalDiagnostics, PharmacyConfig,
    PharmacyCredential, PharmacyStore, RestStore, RetryPolicy, StaticTokenProvider,
    TokenProvider,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Environment variable overriding the server bind address
pub const BIND_ENV: &str = "RXDISPATCH_BIND";

/// Environment variable forcing dry-run dispatches
pub const DRY_RUN_ENV: &str = "RXDISPATCH_DRY_RUN";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Outbound pharmacy API settings
    pub api: ApiSettings,

    /// Retry policy for the send stage
    pub retry: RetrySettings,

    /// HTTP server settings
    pub server: ServerSettings,

    /// Where pharmacy configuration is read from
    pub store: StoreSettings,

    /// BareMeds token service
    pub token_service: TokenServiceSettings,

    /// Pre-flight diagnostics
    pub diagnostics: DiagnosticsSettings,

    /// Pharmacies served by the in-memory store
    pub pharmacies: Vec<PharmacyConfig>,

    /// Credentials served by the in-memory store
    pub credentials: Vec<PharmacyCredential>,

    /// Logging settings
    pub logging: LogSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// BareMeds base URL; endpoint paths are appended to it
    pub base_url: Option<String>,
    /// Client-wide timeout in seconds
    pub timeout_seconds: Option<u64>,
    /// Dry-run mode for requests that do not say
    pub default_dry_run: bool,
}

/// Resending of orders that got a 429 or 5xx; off unless `max_retries` is set
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::none();
        Self {
            max_retries: policy.max_attempts,
            base_delay_ms: policy.base_delay_ms,
            max_delay_ms: policy.max_delay_ms,
            jitter: policy.jitter,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Socket address the server listens on
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

/// Store backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Pharmacies and credentials from this file
    #[default]
    Memory,
    /// PostgREST-style REST endpoint
    Rest,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub kind: StoreKind,
    pub url: Option<String>,
    pub service_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenServiceSettings {
    pub url: Option<String>,
    pub auth_key: Option<String>,
    /// Fixed token, for local testing without a token service
    pub static_token: Option<String>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsSettings {
    /// Remote diagnostics endpoint; local checks run when unset
    pub url: Option<String>,
    pub auth_key: Option<String>,
}

/// Logging section of the config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: Option<String>,
    /// Log format (compact, full, json)
    pub format: Option<String>,
    /// Log file path
    pub file: Option<PathBuf>,
    /// Per-module levels
    pub modules: Option<HashMap<String, String>>,
}

/// Outcome of `config validate`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Collaborators assembled from the configuration
pub struct Components {
    pub orchestrator: DispatchOrchestrator,
    pub tokens: Arc<dyn TokenProvider>,
}

/// Serialized file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Yaml,
    Toml,
    Json,
}

impl FileFormat {
    fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => Self::Yaml,
            Some("toml") => Self::Toml,
            _ => Self::Json,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Yaml => "YAML",
            Self::Toml => "TOML",
            Self::Json => "JSON",
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_str_with_format(&content, FileFormat::from_path(path)).map_err(|e| {
            tracing::debug!(path = %path.display(), error = %e, "Config parse failed");
            Error::InvalidFormat {
                path: path.to_path_buf(),
                expected: format!("{} ({})", FileFormat::from_path(path).name(), e),
            }
        })
    }

    fn from_str_with_format(content: &str, format: FileFormat) -> Result<Self> {
        Ok(match format {
            FileFormat::Yaml => serde_yaml::from_str(content)?,
            FileFormat::Toml => {
                toml::from_str(content).map_err(|e| Error::config(e.to_string()))?
            }
            FileFormat::Json => serde_json::from_str(content)?,
        })
    }

    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        for path in Self::default_config_paths() {
            if path.exists() {
                tracing::debug!(path = %path.display(), "Using config file");
                return Self::from_file(&path);
            }
        }

        // Return default config if no config file found
        Ok(Self::default())
    }

    /// Load configuration from a specific file or default locations, then
    /// apply environment overrides
    pub fn load_with_file(file: Option<&Path>) -> Result<Self> {
        let mut config = match file {
            Some(path) => Self::from_file(path)?,
            None => Self::load()?,
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Get default configuration file paths to check
    fn default_config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // Current directory
        for name in ["rxdispatch", ".rxdispatch"] {
            for ext in ["yaml", "yml", "toml", "json"] {
                paths.push(PathBuf::from(format!("{}.{}", name, ext)));
            }
        }

        // User config directory
        if let Some(config_dir) = dirs::config_dir() {
            let app_dir = config_dir.join("rxdispatch");
            for ext in ["yaml", "toml", "json"] {
                paths.push(app_dir.join(format!("config.{}", ext)));
            }
        }

        paths
    }

    /// Apply `RXDISPATCH_BIND`, `RXDISPATCH_DRY_RUN` and `BAREMEDS_API_URL`
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup(BIND_ENV).filter(|v| !v.trim().is_empty()) {
            self.server.bind = bind.trim().to_string();
        }
        if let Some(dry_run) = lookup(DRY_RUN_ENV) {
            let dry_run = dry_run.trim().to_lowercase();
            self.api.default_dry_run = dry_run == "true" || dry_run == "1";
        }
        if let Some(base_url) = lookup(BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.api.base_url = Some(base_url.trim().to_string());
        }
    }

    /// Client configuration with the configured base URL and timeout
    pub fn client_config(&self) -> ClientConfig {
        let mut client = ClientConfig::default();
        if let Some(base_url) = &self.api.base_url {
            client = client.with_base_url(base_url.clone());
        }
        if let Some(secs) = self.api.timeout_seconds.filter(|s| *s > 0) {
            client = client.with_timeout(Duration::from_secs(secs));
        }
        client
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry.max_retries)
            .with_base_delay(self.retry.base_delay_ms)
            .with_max_delay(self.retry.max_delay_ms)
            .with_jitter(self.retry.jitter)
    }

    pub fn build_store(&self) -> Result<Arc<dyn PharmacyStore>> {
        match self.store.kind {
            StoreKind::Memory => Ok(Arc::new(InMemoryStore::from_rows(
                self.pharmacies.clone(),
                self.credentials.clone(),
            ))),
            StoreKind::Rest => {
                let url = self
                    .store
                    .url
                    .as_deref()
                    .ok_or_else(|| Error::config("store.url is required for the rest store"))?;
                let key = self
                    .store
                    .service_key
                    .as_deref()
                    .ok_or_else(|| Error::config("store.service_key is required for the rest store"))?;
                Ok(Arc::new(RestStore::new(url, key)?))
            }
        }
    }

    pub fn build_token_provider(&self) -> Arc<dyn TokenProvider> {
        let settings = &self.token_service;
        if let Some(url) = &settings.url {
            let mut provider = HttpTokenProvider::new(url.clone());
            if let Some(key) = &settings.auth_key {
                provider = provider.with_auth_key(key.clone());
            }
            if let Some(secs) = settings.timeout_seconds.filter(|s| *s > 0) {
                provider = provider.with_timeout(Duration::from_secs(secs));
            }
            return Arc::new(provider);
        }
        match &settings.static_token {
            Some(token) => Arc::new(StaticTokenProvider::new(token.clone())),
            None => Arc::new(MissingTokenProvider),
        }
    }

    pub fn build_diagnostics(&self, store: Arc<dyn PharmacyStore>) -> Arc<dyn DiagnosticsCheck> {
        match &self.diagnostics.url {
            Some(url) => {
                let mut diagnostics = HttpDiagnostics::new(url.clone());
                if let Some(key) = &self.diagnostics.auth_key {
                    diagnostics = diagnostics.with_auth_key(key.clone());
                }
                Arc::new(diagnostics)
            }
            None => Arc::new(LocalDiagnostics::new(store, self.client_config().base_url)),
        }
    }

    /// Assemble the orchestrator and token provider
    pub fn build_components(&self) -> Result<Components> {
        let store = self.build_store()?;
        let diagnostics = self.build_diagnostics(store.clone());
        let tokens = self.build_token_provider();
        let client = BaremedsClient::new(self.client_config())?;

        let orchestrator = DispatchOrchestrator::new(store, diagnostics, tokens.clone(), client)
            .with_retry_policy(self.retry_policy())
            .with_default_dry_run(self.api.default_dry_run);

        Ok(Components { orchestrator, tokens })
    }

    /// Check the configuration for problems without contacting anything
    pub fn validate(&self) -> ValidationReport {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if let Some(base_url) = &self.api.base_url {
            if url::Url::parse(base_url).is_err() {
                errors.push(format!("api.base_url is not a valid URL: {}", base_url));
            }
        }
        if self.server.bind.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!("server.bind is not a socket address: {}", self.server.bind));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            warnings.push("retry.base_delay_ms exceeds retry.max_delay_ms; every delay is capped".to_string());
        }

        match self.store.kind {
            StoreKind::Rest => {
                if self.store.url.is_none() {
                    errors.push("store.url is required for the rest store".to_string());
                }
                if self.store.service_key.is_none() {
                    errors.push("store.service_key is required for the rest store".to_string());
                }
                if !self.pharmacies.is_empty() {
                    warnings.push("pharmacies are ignored when store.kind is rest".to_string());
                }
            }
            StoreKind::Memory => self.validate_pharmacies(&mut errors, &mut warnings),
        }

        ValidationReport {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    fn validate_pharmacies(&self, errors: &mut Vec<String>, warnings: &mut Vec<String>) {
        let mut seen = HashSet::new();
        let mut needs_token_service = false;

        for pharmacy in &self.pharmacies {
            if !seen.insert(pharmacy.id.as_str()) {
                errors.push(format!("Duplicate pharmacy id '{}'", pharmacy.id));
            }
            if !pharmacy.api_enabled {
                continue;
            }
            match pharmacy.endpoint_url() {
                None => errors.push(format!(
                    "Pharmacy '{}' is enabled but has no api_endpoint_url",
                    pharmacy.id
                )),
                Some(url) if pharmacy.api_auth_type == AuthType::Baremeds => {
                    needs_token_service = true;
                    if rxdispatch_core::extract_site_id_from_url(url).is_none() {
                        warnings.push(format!(
                            "Pharmacy '{}' endpoint has no site id; orders will omit it",
                            pharmacy.id
                        ));
                    }
                }
                Some(_) => {}
            }
        }

        for credential in &self.credentials {
            if !seen.contains(credential.pharmacy_id.as_str()) {
                warnings.push(format!(
                    "Credential for unknown pharmacy '{}'",
                    credential.pharmacy_id
                ));
            }
        }

        if needs_token_service
            && self.token_service.url.is_none()
            && self.token_service.static_token.is_none()
        {
            errors.push(
                "BareMeds pharmacies need token_service.url or token_service.static_token".to_string(),
            );
        }
    }

    /// Serialized form with every secret replaced, for display
    pub fn redacted_value(&self) -> Result<Value> {
        let mut value = serde_json::to_value(self)?;
        if let Some(Value::Array(credentials)) = value.get_mut("credentials") {
            for credential in credentials {
                if let Some(secret) = credential.get_mut("credential_value") {
                    *secret = Value::String(redaction::REDACTED.to_string());
                }
            }
        }
        redaction::redact_json_value(&mut value);
        Ok(value)
    }
}

/// Token provider used when no token service is configured
struct MissingTokenProvider;

#[async_trait]
impl TokenProvider for MissingTokenProvider {
    async fn get_token(&self, _pharmacy_id: &str) -> rxdispatch_core::Result<String> {
        Err(rxdispatch_core::Error::Token {
            message: "Failed to get BareMeds token: token service not configured".to_string(),
        })
    }
}

/// Builder for creating configurations programmatically
#[cfg(test)]
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

#[cfg(test)]
impl ConfigBuilder {
    /// Create a new config builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the BareMeds base URL
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.api.base_url = Some(base_url.into());
        self
    }

    /// Add a pharmacy to the in-memory store
    pub fn pharmacy(mut self, pharmacy: PharmacyConfig) -> Self {
        self.config.pharmacies.push(pharmacy);
        self
    }

    /// Add a credential to the in-memory store
    pub fn credential(mut self, credential: PharmacyCredential) -> Self {
        self.config.credentials.push(credential);
        self
    }

    /// Use a fixed token instead of a token service
    pub fn static_token(mut self, token: impl Into<String>) -> Self {
        self.config.token_service.static_token = Some(token.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> Config {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rxdispatch_core::CredentialType;
    use std::io::Write;

    fn write_config(ext: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(&format!(".{}", ext))
            .tempfile()
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn baremeds_pharmacy(id: &str, url: &str) -> PharmacyConfig {
        PharmacyConfig {
            id: id.to_string(),
            name: None,
            api_enabled: true,
            api_endpoint_url: Some(url.to_string()),
            api_auth_type: AuthType::Baremeds,
            api_auth_header_name: None,
            api_timeout_seconds: None,
        }
    }

    #[test]
    fn test_yaml_config() {
        let file = write_config(
            "yaml",
            r#"
api:
  base_url: https://api.baremeds.com
retry:
  max_retries: 5
pharmacies:
  - id: ph-1
    api_enabled: true
    api_endpoint_url: https://api.baremeds.com/api/site/12/orders
    api_auth_type: baremeds
credentials:
  - pharmacy_id: ph-1
    credential_type: client_secret
    credential_value: s3cret
token_service:
  static_token: tok
"#,
        );

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.api.base_url.as_deref(), Some("https://api.baremeds.com"));
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.pharmacies[0].api_auth_type, AuthType::Baremeds);
        assert_eq!(config.credentials[0].credential_type, CredentialType::ClientSecret);
        assert!(config.validate().valid);
    }

    #[test]
    fn test_toml_and_json_config() {
        let toml_file = write_config(
            "toml",
            r#"
[server]
bind = "0.0.0.0:9000"

[store]
kind = "rest"
url = "https://db.example.com/rest/v1"
service_key = "service"
"#,
        );
        let config = Config::from_file(toml_file.path()).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.store.kind, StoreKind::Rest);
        assert!(config.build_store().is_ok());

        let json_file = write_config("json", r#"{"api": {"default_dry_run": true}}"#);
        let config = Config::from_file(json_file.path()).unwrap();
        assert!(config.api.default_dry_run);
        assert_eq!(config.server.bind, "127.0.0.1:8000");
    }

    #[test]
    fn test_invalid_and_missing_files() {
        let file = write_config("yaml", "api: [not, a, map");
        assert!(matches!(
            Config::from_file(file.path()),
            Err(Error::InvalidFormat { .. })
        ));
        assert!(matches!(
            Config::from_file(Path::new("/nonexistent/rxdispatch.yaml")),
            Err(Error::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        let env: HashMap<&str, &str> = HashMap::from([
            (BIND_ENV, "0.0.0.0:8080"),
            (DRY_RUN_ENV, "1"),
            (BASE_URL_ENV, " https://api.baremeds.com "),
        ]);
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert!(config.api.default_dry_run);
        assert_eq!(config.client_config().base_url, "https://api.baremeds.com");
    }

    #[test]
    fn test_client_config_defaults_to_staging() {
        let config = Config::default();
        assert_eq!(
            config.client_config().base_url,
            rxdispatch_core::http::client::DEFAULT_BASE_URL
        );
        assert_eq!(config.retry_policy(), RetryPolicy::none());
        assert_eq!(config.retry.max_retries, 0);
    }

    #[test]
    fn test_validate_reports_problems() {
        let mut disabled = baremeds_pharmacy("ph-2", "https://x.com");
        disabled.api_enabled = false;
        let mut no_endpoint = baremeds_pharmacy("ph-3", "");
        no_endpoint.api_endpoint_url = None;

        let config = ConfigBuilder::new()
            .pharmacy(baremeds_pharmacy("ph-1", "https://api.baremeds.com/orders"))
            .pharmacy(baremeds_pharmacy("ph-1", "https://api.baremeds.com/api/site/1/orders"))
            .pharmacy(disabled)
            .pharmacy(no_endpoint)
            .credential(PharmacyCredential {
                pharmacy_id: "ghost".into(),
                credential_type: CredentialType::ApiKey,
                credential_value: "k".into(),
            })
            .build();

        let report = config.validate();
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("Duplicate pharmacy id 'ph-1'")));
        assert!(report.errors.iter().any(|e| e.contains("'ph-3' is enabled but has no api_endpoint_url")));
        assert!(report.errors.iter().any(|e| e.contains("token_service")));
        assert!(report.warnings.iter().any(|w| w.contains("no site id")));
        assert!(report.warnings.iter().any(|w| w.contains("unknown pharmacy 'ghost'")));
    }

    #[test]
    fn test_rest_store_requires_url() {
        let mut config = Config::default();
        config.store.kind = StoreKind::Rest;
        assert!(matches!(config.build_store(), Err(Error::Config(_))));
        assert_eq!(config.validate().errors.len(), 2);
    }

    #[test]
    fn test_redacted_value_hides_secrets() {
        let mut config = ConfigBuilder::new()
            .static_token("tok-123")
            .credential(PharmacyCredential {
                pharmacy_id: "ph-1".into(),
                credential_type: CredentialType::Password,
                credential_value: "hunter2".into(),
            })
            .build();
        config.store.service_key = Some("service-key".into());

        let value = config.redacted_value().unwrap();
        let text = value.to_string();
        assert!(!text.contains("hunter2"));
        assert!(!text.contains("tok-123"));
        assert!(!text.contains("service-key"));
        assert_eq!(value["credentials"][0]["pharmacy_id"], "ph-1");
    }

    #[tokio::test]
    async fn test_missing_token_provider_errors() {
        let config = Config::default();
        let tokens = config.build_token_provider();
        let err = tokens.get_token("ph-1").await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to get BareMeds token"));
    }

    #[test]
    fn test_build_components() {
        let config = ConfigBuilder::new()
            .base_url("http://127.0.0.1:9")
            .static_token("t")
            .build();
        let components = config.build_components().unwrap();
        assert_eq!(components.orchestrator.client().config().base_url, "http://127.0.0.1:9");
        assert_eq!(components.orchestrator.retry_policy().max_attempts, 0);
    }
}
