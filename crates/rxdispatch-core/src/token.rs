//! Bearer token acquisition for BareMeds pharmacies
//!
//! Tokens come from a sibling service that is treated as a black box: it is
//! given a pharmacy id and answers with `{ "token": "..." }`.

use std::time::Duration;
use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use serde::Deserialize;
use serde_json::json;
use crate::{Error, Result};

/// Prefix of every token acquisition error
pub const TOKEN_ERROR_PREFIX: &str = "Failed to get BareMeds token";

/// Source of bearer tokens for a pharmacy
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn get_token(&self, pharmacy_id: &str) -> Result<String>;
}

fn token_error(detail: impl std::fmt::Display) -> Error {
    Error::Token {
        message: format!("{}: {}", TOKEN_ERROR_PREFIX, detail),
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Token service reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpTokenProvider {
    client: ReqwestClient,
    url: String,
    auth_key: Option<String>,
    timeout: Duration,
}

impl HttpTokenProvider {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: ReqwestClient::new(),
            url: url.into(),
            auth_key: None,
            timeout: Duration::from_secs(15),
        }
    }

    /// Key sent as both `apikey` and bearer auth to the token service
    pub fn with_auth_key(mut self, key: impl Into<String>) -> Self {
        self.auth_key = Some(key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl TokenProvider for HttpTokenProvider {
    async fn get_token(&self, pharmacy_id: &str) -> Result<String> {
        let mut request = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&json!({ "pharmacy_id": pharmacy_id }));
        if let Some(key) = &self.auth_key {
            request = request.header("apikey", key).bearer_auth(key);
        }

        let response = request.send().await.map_err(token_error)?;
        let status = response.status();
        let body = response.text().await.map_err(token_error)?;
        let parsed: Option<TokenResponse> = serde_json::from_str(&body).ok();

        if !status.is_success() {
            let detail = parsed
                .and_then(|p| p.error)
                .unwrap_or_else(|| format!("token service returned {}", status.as_u16()));
            tracing::warn!(pharmacy_id, status = status.as_u16(), "Token service rejected request");
            return Err(token_error(detail));
        }

        match parsed {
            Some(TokenResponse { token: Some(token), .. }) if !token.is_empty() => {
                tracing::debug!(pharmacy_id, "Obtained BareMeds token");
                Ok(token)
            }
            Some(TokenResponse { error: Some(error), .. }) => Err(token_error(error)),
            _ => Err(token_error("response did not contain a token")),
        }
    }
}

/// Fixed token, for local runs and tests
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn get_token(&self, _pharmacy_id: &str) -> Result<String> {
        Ok(self.token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticTokenProvider::new("tok");
        assert_eq!(provider.get_token("any").await.unwrap(), "tok");
    }

    #[test]
    fn test_error_message_shape() {
        let err = token_error("invalid client secret");
        assert_eq!(err.to_string(), "Failed to get BareMeds token: invalid client secret");
    }

    #[test]
    fn test_response_parsing() {
        let parsed: TokenResponse = serde_json::from_str(r#"{"error":"nope"}"#).unwrap();
        assert!(parsed.token.is_none());
        assert_eq!(parsed.error.as_deref(), Some("nope"));
    }
}
