//! Prescription payload builders
//!
//! Turns test fixtures or sparse order records into the wire shapes the
//! pharmacy APIs accept. Builders never fail: every absent source field
//! degrades to one of the documented defaults below.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use crate::types::{OrderLineRecord, OrderRecord};

/// Text placeholder for unknown names, cities and similar
pub const DEFAULT_UNKNOWN: &str = "Unknown";
/// Patient last name when absent
pub const DEFAULT_PATIENT_LAST_NAME: &str = "Patient";
/// Prescriber last name when absent
pub const DEFAULT_PRESCRIBER_LAST_NAME: &str = "Provider";
/// Gender code when absent
pub const DEFAULT_GENDER: &str = "U";
/// Date of birth when absent
pub const DEFAULT_DATE_OF_BIRTH: &str = "1900-01-01";
/// State code when absent
pub const DEFAULT_STATE: &str = "XX";
/// Postal code when absent
pub const DEFAULT_ZIP: &str = "00000";
/// Country code when absent
pub const DEFAULT_COUNTRY: &str = "US";
/// Medication name when absent
pub const DEFAULT_MEDICATION_NAME: &str = "Unknown Medication";
/// Directions (sig) when absent
pub const DEFAULT_DIRECTIONS: &str = "As directed";
/// Quantity when absent
pub const DEFAULT_QUANTITY: u32 = 1;
/// Refills when absent
pub const DEFAULT_REFILLS: u32 = 0;
/// Days supply when absent
pub const DEFAULT_DAYS_SUPPLY: u32 = 30;
/// Shipping method when absent
pub const DEFAULT_SHIPPING_METHOD: &str = "standard";

/// Marker every synthetic order carries in its notes
pub const TEST_ORDER_NOTES: &str = "TEST ORDER - DO NOT PROCESS. Generated by pharmacy integration test.";

static ORDER_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Unique id: `<prefix>-<unix millis>-<process-wide sequence>`
fn generate_order_id(prefix: &str) -> String {
    let sequence = ORDER_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}-{}", prefix, Utc::now().timestamp_millis(), sequence)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: String,
    pub gender: String,
    pub email: String,
    pub phone: String,
    pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prescriber {
    pub first_name: String,
    pub last_name: String,
    pub npi: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dea: Option<String>,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medication {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ndc: Option<String>,
    pub strength: String,
    pub dosage_form: String,
    pub quantity: u32,
    pub refills: u32,
    pub days_supply: u32,
    pub directions: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipping {
    pub recipient_name: String,
    pub address: Address,
    pub method: String,
}

/// BareMeds prescription order. Always structurally complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescriptionPayload {
    pub external_order_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    pub patient: Patient,
    pub prescriber: Prescriber,
    pub medication: Medication,
    pub shipping: Shipping,
    pub notes: String,
}

impl PrescriptionPayload {
    /// Serialize to a JSON value for the fetch client
    pub fn to_value(&self) -> serde_json::Value {
        // plain structs with string keys cannot fail to serialize
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Medication entry in the generic order shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericMedication {
    pub name: String,
    pub strength: String,
    pub quantity: u32,
    pub refills: u32,
    pub directions: String,
}

/// Order shape for bearer / api_key / basic pharmacies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericOrderPayload {
    pub order_id: String,
    pub test_order: bool,
    pub patient: Patient,
    pub prescriber: Prescriber,
    pub medications: Vec<GenericMedication>,
    pub shipping_address: Address,
    pub notes: String,
}

impl GenericOrderPayload {
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Synthetic, clearly-marked test prescription with a fresh external order id
pub fn create_test_order_payload(site_id: Option<&str>) -> PrescriptionPayload {
    let address = Address {
        line1: "123 Test Street".to_string(),
        line2: Some("Suite 100".to_string()),
        city: "Austin".to_string(),
        state: "TX".to_string(),
        zip: "78701".to_string(),
        country: DEFAULT_COUNTRY.to_string(),
    };

    PrescriptionPayload {
        external_order_id: generate_order_id("TEST"),
        site_id: site_id.map(str::to_string),
        patient: Patient {
            first_name: "Test".to_string(),
            last_name: "Patient".to_string(),
            date_of_birth: "1990-01-01".to_string(),
            gender: DEFAULT_GENDER.to_string(),
            email: "test.patient@example.com".to_string(),
            phone: "555-555-0100".to_string(),
            address: address.clone(),
        },
        prescriber: Prescriber {
            first_name: "Test".to_string(),
            last_name: "Provider".to_string(),
            npi: "1234567890".to_string(),
            dea: None,
            phone: "555-555-0199".to_string(),
        },
        medication: Medication {
            name: "Test Medication".to_string(),
            ndc: None,
            strength: "10mg".to_string(),
            dosage_form: "tablet".to_string(),
            quantity: 30,
            refills: 0,
            days_supply: 30,
            directions: "TEST - DO NOT DISPENSE".to_string(),
        },
        shipping: Shipping {
            recipient_name: "Test Patient".to_string(),
            address,
            method: DEFAULT_SHIPPING_METHOD.to_string(),
        },
        notes: TEST_ORDER_NOTES.to_string(),
    }
}

fn or_default(value: &Option<String>, default: &str) -> String {
    value.clone().unwrap_or_else(|| default.to_string())
}

/// Map order and order-line records into a prescription, defaulting every absent field
pub fn create_production_order_payload(
    order: &OrderRecord,
    line: &OrderLineRecord,
    site_id: Option<&str>,
) -> PrescriptionPayload {
    let address = Address {
        line1: or_default(&order.shipping_address_line1, DEFAULT_UNKNOWN),
        line2: order.shipping_address_line2.clone(),
        city: or_default(&order.shipping_city, DEFAULT_UNKNOWN),
        state: or_default(&order.shipping_state, DEFAULT_STATE),
        zip: or_default(&order.shipping_zip, DEFAULT_ZIP),
        country: or_default(&order.shipping_country, DEFAULT_COUNTRY),
    };

    let first_name = or_default(&order.patient_first_name, DEFAULT_UNKNOWN);
    let last_name = or_default(&order.patient_last_name, DEFAULT_PATIENT_LAST_NAME);
    let recipient_name = format!("{} {}", first_name, last_name);

    PrescriptionPayload {
        external_order_id: order
            .id
            .clone()
            .unwrap_or_else(|| generate_order_id("ORDER")),
        site_id: site_id.map(str::to_string),
        patient: Patient {
            first_name,
            last_name,
            date_of_birth: or_default(&order.patient_date_of_birth, DEFAULT_DATE_OF_BIRTH),
            gender: or_default(&order.patient_gender, DEFAULT_GENDER),
            email: or_default(&order.patient_email, ""),
            phone: or_default(&order.patient_phone, ""),
            address: address.clone(),
        },
        prescriber: Prescriber {
            first_name: or_default(&order.provider_first_name, DEFAULT_UNKNOWN),
            last_name: or_default(&order.provider_last_name, DEFAULT_PRESCRIBER_LAST_NAME),
            npi: or_default(&order.provider_npi, ""),
            dea: order.provider_dea.clone(),
            phone: or_default(&order.provider_phone, ""),
        },
        medication: Medication {
            name: or_default(&line.medication_name, DEFAULT_MEDICATION_NAME),
            ndc: line.ndc.clone(),
            strength: or_default(&line.strength, ""),
            dosage_form: or_default(&line.dosage_form, ""),
            quantity: line.quantity.unwrap_or(DEFAULT_QUANTITY),
            refills: line.refills.unwrap_or(DEFAULT_REFILLS),
            days_supply: line.days_supply.unwrap_or(DEFAULT_DAYS_SUPPLY),
            directions: or_default(&line.directions, DEFAULT_DIRECTIONS),
        },
        shipping: Shipping {
            recipient_name,
            address,
            method: or_default(&order.shipping_method, DEFAULT_SHIPPING_METHOD),
        },
        notes: or_default(&order.notes, ""),
    }
}

/// Generic (non-BareMeds) order shape carrying the same prescription
pub fn create_generic_order_payload(prescription: &PrescriptionPayload) -> GenericOrderPayload {
    let medication = &prescription.medication;
    GenericOrderPayload {
        order_id: prescription.external_order_id.clone(),
        test_order: prescription.notes.contains("DO NOT PROCESS"),
        patient: prescription.patient.clone(),
        prescriber: prescription.prescriber.clone(),
        medications: vec![GenericMedication {
            name: medication.name.clone(),
            strength: medication.strength.clone(),
            quantity: medication.quantity,
            refills: medication.refills,
            directions: medication.directions.clone(),
        }],
        shipping_address: prescription.shipping.address.clone(),
        notes: prescription.notes.clone(),
    }
}
