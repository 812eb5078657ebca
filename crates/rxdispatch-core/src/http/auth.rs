//! Authentication handling for pharmacy APIs
//!
//! Supports the header schemes pharmacies are configured with:
//! - Bearer tokens (`bearer`, and `baremeds` once a token is issued)
//! - API keys in a configurable header (`api_key`)
//! - HTTP basic auth (`basic`)

use std::collections::HashMap;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use crate::types::{AuthType, CredentialType, Credentials, PharmacyConfig};
use crate::{Error, Result};

/// Header used for API keys when the pharmacy does not name one
pub const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";

/// Trait for handling pharmacy-specific authentication
pub trait AuthHandler: Send + Sync {
    /// Apply authentication to request headers
    fn apply_auth(&self, headers: &mut HashMap<String, String>) -> Result<()>;

    /// Validate that required credentials are available
    fn validate_credentials(&self) -> Result<()>;
}

fn missing(what: &str) -> Error {
    Error::configuration(format!("Pharmacy credential '{}' not configured", what))
}

/// `Authorization: Bearer <token>`
#[derive(Debug, Clone)]
pub struct BearerAuth {
    token: Option<String>,
}

impl BearerAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: Some(token.into()) }
    }

    pub fn from_credentials(credentials: &Credentials) -> Self {
        Self {
            token: credentials.get(&CredentialType::BearerToken).map(str::to_string),
        }
    }
}

impl AuthHandler for BearerAuth {
    fn apply_auth(&self, headers: &mut HashMap<String, String>) -> Result<()> {
        let token = self.token.as_ref().ok_or_else(|| missing("bearer_token"))?;
        headers.insert("Authorization".to_string(), format!("Bearer {}", token));
        Ok(())
    }

    fn validate_credentials(&self) -> Result<()> {
        self.token.as_ref().map(|_| ()).ok_or_else(|| missing("bearer_token"))
    }
}

/// API key in a named header
#[derive(Debug, Clone)]
pub struct ApiKeyAuth {
    header_name: String,
    api_key: Option<String>,
}

impl ApiKeyAuth {
    pub fn new(header_name: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            header_name: header_name.into(),
            api_key: Some(api_key.into()),
        }
    }

    pub fn from_config(config: &PharmacyConfig, credentials: &Credentials) -> Self {
        let header_name = config
            .api_auth_header_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_API_KEY_HEADER)
            .to_string();

        Self {
            header_name,
            api_key: credentials.get(&CredentialType::ApiKey).map(str::to_string),
        }
    }

    pub fn header_name(&self) -> &str {
        &self.header_name
    }
}

impl AuthHandler for ApiKeyAuth {
    fn apply_auth(&self, headers: &mut HashMap<String, String>) -> Result<()> {
        let key = self.api_key.as_ref().ok_or_else(|| missing("api_key"))?;
        headers.insert(self.header_name.clone(), key.clone());
        Ok(())
    }

    fn validate_credentials(&self) -> Result<()> {
        self.api_key.as_ref().map(|_| ()).ok_or_else(|| missing("api_key"))
    }
}

/// `Authorization: Basic base64(username:password)`
#[derive(Debug, Clone)]
pub struct BasicAuth {
    username: Option<String>,
    password: Option<String>,
}

impl BasicAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    pub fn from_credentials(credentials: &Credentials) -> Self {
        Self {
            username: credentials.get(&CredentialType::Username).map(str::to_string),
            password: credentials.get(&CredentialType::Password).map(str::to_string),
        }
    }
}

impl AuthHandler for BasicAuth {
    fn apply_auth(&self, headers: &mut HashMap<String, String>) -> Result<()> {
        self.validate_credentials()?;
        let user = self.username.as_deref().unwrap_or_default();
        let pass = self.password.as_deref().unwrap_or_default();
        let encoded = STANDARD.encode(format!("{}:{}", user, pass));
        headers.insert("Authorization".to_string(), format!("Basic {}", encoded));
        Ok(())
    }

    fn validate_credentials(&self) -> Result<()> {
        if self.username.is_none() {
            return Err(missing("username"));
        }
        if self.password.is_none() {
            return Err(missing("password"));
        }
        Ok(())
    }
}

/// Factory for the handler matching a pharmacy's auth type.
///
/// `baremeds` pharmacies authenticate with a token issued per dispatch, so
/// they have no static handler.
pub fn create_auth_handler(
    config: &PharmacyConfig,
    credentials: &Credentials,
) -> Result<Box<dyn AuthHandler>> {
    match config.api_auth_type {
        AuthType::Bearer => Ok(Box::new(BearerAuth::from_credentials(credentials))),
        AuthType::ApiKey => Ok(Box::new(ApiKeyAuth::from_config(config, credentials))),
        AuthType::Basic => Ok(Box::new(BasicAuth::from_credentials(credentials))),
        AuthType::Baremeds => Err(Error::configuration(
            "BareMeds pharmacies authenticate with an issued token, not static credentials",
        )),
    }
}

/// Headers for a pharmacy as an ordered list, ready for the fetch client
pub fn auth_headers(config: &PharmacyConfig, credentials: &Credentials) -> Result<Vec<(String, String)>> {
    let handler = create_auth_handler(config, credentials)?;
    let mut headers = HashMap::new();
    handler.apply_auth(&mut headers)?;

    let mut headers: Vec<_> = headers.into_iter().collect();
    headers.sort();
    Ok(headers)
}
