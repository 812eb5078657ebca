//! Core type definitions for pharmacy dispatch
//!
//! Pharmacy configuration and credentials as read from the configuration
//! store, and the loosely-populated order records payloads are built from.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Default outbound timeout when a pharmacy does not configure one
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

// ============================================================================
// Pharmacy configuration
// ============================================================================

/// How requests to a pharmacy API are authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    /// `Authorization: Bearer <bearer_token>`
    Bearer,
    /// API key in a configurable header
    ApiKey,
    /// `Authorization: Basic base64(username:password)`
    Basic,
    /// Token obtained from the token service, BareMeds payload shape
    Baremeds,
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthType::Bearer => write!(f, "bearer"),
            AuthType::ApiKey => write!(f, "api_key"),
            AuthType::Basic => write!(f, "basic"),
            AuthType::Baremeds => write!(f, "baremeds"),
        }
    }
}

/// One external pharmacy integration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PharmacyConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub api_enabled: bool,
    #[serde(default)]
    pub api_endpoint_url: Option<String>,
    pub api_auth_type: AuthType,
    #[serde(default)]
    pub api_auth_header_name: Option<String>,
    #[serde(default)]
    pub api_timeout_seconds: Option<u64>,
}

impl PharmacyConfig {
    /// Configured timeout, falling back to the default
    pub fn timeout_seconds(&self) -> u64 {
        match self.api_timeout_seconds {
            Some(secs) if secs > 0 => secs,
            _ => DEFAULT_TIMEOUT_SECONDS,
        }
    }

    /// Endpoint URL if set and non-blank
    pub fn endpoint_url(&self) -> Option<&str> {
        self.api_endpoint_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// Display name for logs
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

// ============================================================================
// Credentials
// ============================================================================

/// Kind of secret stored for a pharmacy
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    BearerToken,
    ApiKey,
    Username,
    Password,
    ClientId,
    ClientSecret,
    #[serde(untagged)]
    Other(String),
}

/// One stored secret for a pharmacy
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct PharmacyCredential {
    #[serde(default)]
    pub pharmacy_id: String,
    pub credential_type: CredentialType,
    pub credential_value: String,
}

impl fmt::Debug for PharmacyCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PharmacyCredential")
            .field("pharmacy_id", &self.pharmacy_id)
            .field("credential_type", &self.credential_type)
            .field("credential_value", &crate::redaction::REDACTED)
            .finish()
    }
}

/// All credentials of one pharmacy, looked up by type
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Credentials {
    entries: Vec<PharmacyCredential>,
}

impl Credentials {
    pub fn new(entries: Vec<PharmacyCredential>) -> Self {
        Self { entries }
    }

    /// First non-empty value of the given type
    pub fn get(&self, credential_type: &CredentialType) -> Option<&str> {
        self.entries
            .iter()
            .find(|c| &c.credential_type == credential_type && !c.credential_value.is_empty())
            .map(|c| c.credential_value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Types present, for diagnostics output
    pub fn types(&self) -> Vec<&CredentialType> {
        self.entries.iter().map(|c| &c.credential_type).collect()
    }
}

// ============================================================================
// Order records
// ============================================================================

/// Source order row. Every field is optional; payload builders substitute defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderRecord {
    pub id: Option<String>,
    pub patient_first_name: Option<String>,
    pub patient_last_name: Option<String>,
    pub patient_date_of_birth: Option<String>,
    pub patient_gender: Option<String>,
    pub patient_email: Option<String>,
    pub patient_phone: Option<String>,
    pub shipping_address_line1: Option<String>,
    pub shipping_address_line2: Option<String>,
    pub shipping_city: Option<String>,
    pub shipping_state: Option<String>,
    pub shipping_zip: Option<String>,
    pub shipping_country: Option<String>,
    pub shipping_method: Option<String>,
    pub provider_first_name: Option<String>,
    pub provider_last_name: Option<String>,
    pub provider_npi: Option<String>,
    pub provider_dea: Option<String>,
    pub provider_phone: Option<String>,
    pub notes: Option<String>,
}

/// Source order line row (one medication)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderLineRecord {
    pub medication_name: Option<String>,
    pub ndc: Option<String>,
    pub strength: Option<String>,
    pub dosage_form: Option<String>,
    pub quantity: Option<u32>,
    pub refills: Option<u32>,
    pub days_supply: Option<u32>,
    pub directions: Option<String>,
}

/// Read a field as text: strings are trimmed, numbers and booleans stringified
fn text_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Read a field as a count: unsigned numbers or numeric strings
fn count_field(value: &Value, key: &str) -> Option<u32> {
    match value.get(key)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// First present text field among several aliases
fn text_any(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| text_field(value, key))
}

impl OrderRecord {
    /// Build from an arbitrary JSON row; unknown or mistyped fields become absent.
    pub fn from_value(value: &Value) -> Self {
        Self {
            id: text_any(value, &["id", "order_id"]),
            patient_first_name: text_field(value, "patient_first_name"),
            patient_last_name: text_field(value, "patient_last_name"),
            patient_date_of_birth: text_any(value, &["patient_date_of_birth", "patient_dob"]),
            patient_gender: text_field(value, "patient_gender"),
            patient_email: text_field(value, "patient_email"),
            patient_phone: text_field(value, "patient_phone"),
            shipping_address_line1: text_any(value, &["shipping_address_line1", "shipping_address"]),
            shipping_address_line2: text_field(value, "shipping_address_line2"),
            shipping_city: text_field(value, "shipping_city"),
            shipping_state: text_field(value, "shipping_state"),
            shipping_zip: text_any(value, &["shipping_zip", "shipping_postal_code"]),
            shipping_country: text_field(value, "shipping_country"),
            shipping_method: text_field(value, "shipping_method"),
            provider_first_name: text_field(value, "provider_first_name"),
            provider_last_name: text_field(value, "provider_last_name"),
            provider_npi: text_field(value, "provider_npi"),
            provider_dea: text_field(value, "provider_dea"),
            provider_phone: text_field(value, "provider_phone"),
            notes: text_field(value, "notes"),
        }
    }
}

impl OrderLineRecord {
    /// Build from an arbitrary JSON row; unknown or mistyped fields become absent.
    pub fn from_value(value: &Value) -> Self {
        Self {
            medication_name: text_any(value, &["medication_name", "product_name", "name"]),
            ndc: text_field(value, "ndc"),
            strength: text_field(value, "strength"),
            dosage_form: text_field(value, "dosage_form"),
            quantity: count_field(value, "quantity"),
            refills: count_field(value, "refills"),
            days_supply: count_field(value, "days_supply"),
            directions: text_any(value, &["directions", "sig"]),
        }
    }
}
