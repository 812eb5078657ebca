//! Sensitive data redaction for anything that ends up in logs
//!
//! Response bodies, request headers and payload previews all pass through
//! here before they are written out.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Replacement written in place of a secret value
pub const REDACTED: &str = "[REDACTED]";

static SECRET_PAIR_REGEX: OnceLock<Regex> = OnceLock::new();
static BEARER_REGEX: OnceLock<Regex> = OnceLock::new();

fn secret_pair_regex() -> &'static Regex {
    SECRET_PAIR_REGEX.get_or_init(|| {
        Regex::new(
            r#"(?i)\b(api[_-]?key|apikey|token|access_token|password|passwd|secret|client_secret|ssn|credit_card)(["']?\s*[=:]\s*["']?)([^\s"'&,}]+)"#,
        )
        .expect("valid redaction pattern")
    })
}

fn bearer_regex() -> &'static Regex {
    BEARER_REGEX.get_or_init(|| {
        Regex::new(r"(?i)\b(bearer|basic)\s+[a-z0-9._~+/=-]+").expect("valid bearer pattern")
    })
}

/// Check if a JSON key or header name names a secret
pub fn is_sensitive_key(key: &str) -> bool {
    let key_lower = key.to_lowercase().replace('-', "_");
    key_lower.contains("token")
        || key_lower.contains("password")
        || key_lower.contains("passwd")
        || key_lower.contains("api_key")
        || key_lower.contains("apikey")
        || key_lower.ends_with("_key")
        || key_lower.contains("secret")
        || key_lower == "ssn"
        || key_lower.ends_with("_ssn")
        || key_lower.contains("credit_card")
        || key_lower.contains("card_number")
        || key_lower == "authorization"
}

/// Redact sensitive information from free text
pub fn redact_sensitive(input: &str) -> String {
    let result = secret_pair_regex().replace_all(input, format!("$1$2{}", REDACTED).as_str());
    bearer_regex()
        .replace_all(&result, format!("$1 {}", REDACTED).as_str())
        .into_owned()
}

/// Redact sensitive information from a JSON value in place
pub fn redact_json_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if is_sensitive_key(key) && !val.is_null() {
                    *val = Value::String(REDACTED.to_string());
                } else {
                    redact_json_value(val);
                }
            }
        }
        Value::Array(arr) => {
            for item in arr.iter_mut() {
                redact_json_value(item);
            }
        }
        Value::String(s) => {
            *s = redact_sensitive(s);
        }
        _ => {}
    }
}

/// Redacted copy of a JSON value
pub fn sanitize(value: &Value) -> Value {
    let mut copy = value.clone();
    redact_json_value(&mut copy);
    copy
}

/// Redacted copy of a header list, as a JSON object for logging
pub fn sanitize_headers<'a, I>(headers: I) -> Value
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let map = headers
        .into_iter()
        .map(|(name, value)| {
            let shown = if is_sensitive_key(name) {
                REDACTED.to_string()
            } else {
                value.to_string()
            };
            (name.to_string(), Value::String(shown))
        })
        .collect();
    Value::Object(map)
}
