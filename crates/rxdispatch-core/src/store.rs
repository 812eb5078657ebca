//! Read-only access to pharmacy configuration and credentials
//!
//! The dispatch subsystem never writes to the store. Two implementations are
//! provided: an in-memory store populated from configuration, and a REST
//! store speaking the PostgREST query dialect of the hosted database.

use std::collections::HashMap;
use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use serde::de::DeserializeOwned;
use crate::types::{Credentials, PharmacyConfig, PharmacyCredential};
use crate::{Error, Result};

/// Lookup of pharmacy rows and their credentials
#[async_trait]
pub trait PharmacyStore: Send + Sync {
    /// Pharmacy by id, `None` when no such row exists
    async fn get_pharmacy(&self, pharmacy_id: &str) -> Result<Option<PharmacyConfig>>;

    /// All credentials of a pharmacy, possibly empty
    async fn get_credentials(&self, pharmacy_id: &str) -> Result<Credentials>;
}

/// Store backed by maps, loaded once at startup
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    pharmacies: HashMap<String, PharmacyConfig>,
    credentials: HashMap<String, Vec<PharmacyCredential>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from configuration rows; credentials are grouped by `pharmacy_id`
    pub fn from_rows(pharmacies: Vec<PharmacyConfig>, credentials: Vec<PharmacyCredential>) -> Self {
        let mut store = Self::new();
        for pharmacy in pharmacies {
            store.insert_pharmacy(pharmacy);
        }
        for credential in credentials {
            store.insert_credential(credential);
        }
        store
    }

    pub fn insert_pharmacy(&mut self, pharmacy: PharmacyConfig) {
        self.pharmacies.insert(pharmacy.id.clone(), pharmacy);
    }

    pub fn insert_credential(&mut self, credential: PharmacyCredential) {
        self.credentials
            .entry(credential.pharmacy_id.clone())
            .or_default()
            .push(credential);
    }

    pub fn with_pharmacy(mut self, pharmacy: PharmacyConfig) -> Self {
        self.insert_pharmacy(pharmacy);
        self
    }

    pub fn with_credential(mut self, credential: PharmacyCredential) -> Self {
        self.insert_credential(credential);
        self
    }

    /// Ids of all known pharmacies, sorted
    pub fn pharmacy_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.pharmacies.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

#[async_trait]
impl PharmacyStore for InMemoryStore {
    async fn get_pharmacy(&self, pharmacy_id: &str) -> Result<Option<PharmacyConfig>> {
        Ok(self.pharmacies.get(pharmacy_id).cloned())
    }

    async fn get_credentials(&self, pharmacy_id: &str) -> Result<Credentials> {
        Ok(Credentials::new(
            self.credentials.get(pharmacy_id).cloned().unwrap_or_default(),
        ))
    }
}

/// Store reading the `pharmacies` and `pharmacy_api_credentials` tables over REST
#[derive(Debug, Clone)]
pub struct RestStore {
    client: ReqwestClient,
    base_url: String,
    service_key: String,
}

impl RestStore {
    pub const PHARMACIES_TABLE: &'static str = "pharmacies";
    pub const CREDENTIALS_TABLE: &'static str = "pharmacy_api_credentials";

    /// `base_url` is the REST root, e.g. `https://db.example.com/rest/v1`
    pub fn new(base_url: impl Into<String>, service_key: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into();
        url::Url::parse(&base_url).map_err(|e| Error::Configuration {
            message: format!("Invalid store URL '{}': {}", base_url, e),
            source: Some(e.into()),
        })?;

        Ok(Self {
            client: ReqwestClient::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.into(),
        })
    }

    async fn select<T: DeserializeOwned>(&self, table: &str, column: &str, value: &str) -> Result<Vec<T>> {
        let url = format!("{}/{}", self.base_url, table);
        let filter = format!("eq.{}", value);

        tracing::debug!(table, column, "Querying configuration store");

        let response = self
            .client
            .get(&url)
            .query(&[(column, filter.as_str()), ("select", "*")])
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .send()
            .await
            .map_err(|e| Error::Store {
                message: format!("Request to {} failed: {}", table, e),
                source: Some(e.into()),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::store(format!(
                "Query on {} returned {}: {}",
                table,
                status.as_u16(),
                crate::redaction::redact_sensitive(&body)
            )));
        }

        response.json::<Vec<T>>().await.map_err(|e| Error::Store {
            message: format!("Unexpected {} rows: {}", table, e),
            source: Some(e.into()),
        })
    }
}

#[async_trait]
impl PharmacyStore for RestStore {
    async fn get_pharmacy(&self, pharmacy_id: &str) -> Result<Option<PharmacyConfig>> {
        let rows: Vec<PharmacyConfig> = self.select(Self::PHARMACIES_TABLE, "id", pharmacy_id).await?;
        Ok(rows.into_iter().next())
    }

    async fn get_credentials(&self, pharmacy_id: &str) -> Result<Credentials> {
        let rows: Vec<PharmacyCredential> = self
            .select(Self::CREDENTIALS_TABLE, "pharmacy_id", pharmacy_id)
            .await?;
        Ok(Credentials::new(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AuthType, CredentialType};

    fn pharmacy(id: &str) -> PharmacyConfig {
        PharmacyConfig {
            id: id.to_string(),
            name: Some("Test Pharmacy".into()),
            api_enabled: true,
            api_endpoint_url: Some("https://api.example.com/site/1/orders".into()),
            api_auth_type: AuthType::Baremeds,
            api_auth_header_name: None,
            api_timeout_seconds: None,
        }
    }

    #[tokio::test]
    async fn test_in_memory_lookup() {
        let store = InMemoryStore::from_rows(
            vec![pharmacy("ph-1"), pharmacy("ph-2")],
            vec![PharmacyCredential {
                pharmacy_id: "ph-1".into(),
                credential_type: CredentialType::ApiKey,
                credential_value: "k".into(),
            }],
        );

        assert_eq!(store.pharmacy_ids(), vec!["ph-1", "ph-2"]);
        assert!(store.get_pharmacy("ph-1").await.unwrap().is_some());
        assert!(store.get_pharmacy("missing").await.unwrap().is_none());
        assert_eq!(store.get_credentials("ph-1").await.unwrap().len(), 1);
        assert!(store.get_credentials("ph-2").await.unwrap().is_empty());
    }

    #[test]
    fn test_rest_store_rejects_bad_url() {
        assert!(matches!(RestStore::new("not a url", "key"), Err(Error::Configuration { .. })));
        let store = RestStore::new("https://db.example.com/rest/v1/", "key").unwrap();
        assert_eq!(store.base_url, "https://db.example.com/rest/v1");
    }
}
