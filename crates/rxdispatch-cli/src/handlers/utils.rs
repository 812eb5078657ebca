//! Shared utilities for command handlers

use crate::error::{Error, Result};
use rxdispatch_core::{OrderLineRecord, OrderRecord};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Load an order file.
///
/// The file holds an `order` object and a `line` object (or a `lines`
/// array, first entry used). A flat object is read as both.
pub fn load_order_file(path: &Path) -> Result<(OrderRecord, OrderLineRecord)> {
    if !path.exists() {
        return Err(Error::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let content = fs::read_to_string(path)?;

    let is_yaml = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s == "yaml" || s == "yml")
        .unwrap_or(false);

    let value: Value = if is_yaml {
        serde_yaml::from_str(&content).map_err(|_| Error::InvalidFormat {
            path: path.to_path_buf(),
            expected: "YAML".to_string(),
        })?
    } else {
        serde_json::from_str(&content).map_err(|_| Error::InvalidFormat {
            path: path.to_path_buf(),
            expected: "JSON".to_string(),
        })?
    };

    order_from_value(&value).ok_or_else(|| Error::InvalidFormat {
        path: path.to_path_buf(),
        expected: "order object".to_string(),
    })
}

fn order_from_value(value: &Value) -> Option<(OrderRecord, OrderLineRecord)> {
    if !value.is_object() {
        return None;
    }
    let order = value.get("order").filter(|v| v.is_object()).unwrap_or(value);
    let line = value
        .get("line")
        .filter(|v| v.is_object())
        .or_else(|| value.get("lines").and_then(|lines| lines.get(0)))
        .unwrap_or(value);

    Some((OrderRecord::from_value(order), OrderLineRecord::from_value(line)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_nested_order_and_line() {
        let (order, line) = order_from_value(&json!({
            "order": {"id": "ord-1", "patient_first_name": "Ada"},
            "line": {"medication_name": "Amoxicillin", "quantity": "30"}
        }))
        .unwrap();
        assert_eq!(order.id.as_deref(), Some("ord-1"));
        assert_eq!(line.medication_name.as_deref(), Some("Amoxicillin"));
        assert_eq!(line.quantity, Some(30));
    }

    #[test]
    fn test_lines_array_and_flat_rows() {
        let (_, line) = order_from_value(&json!({
            "order": {"id": "ord-2"},
            "lines": [{"product_name": "Metformin"}, {"product_name": "Ignored"}]
        }))
        .unwrap();
        assert_eq!(line.medication_name.as_deref(), Some("Metformin"));

        let (order, line) = order_from_value(&json!({"id": 7, "medication_name": "Lisinopril"})).unwrap();
        assert_eq!(order.id.as_deref(), Some("7"));
        assert_eq!(line.medication_name.as_deref(), Some("Lisinopril"));

        assert!(order_from_value(&json!([1, 2])).is_none());
    }

    #[test]
    fn test_load_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "order:\n  id: ord-9\nline:\n  medication_name: Atorvastatin").unwrap();

        let (order, line) = load_order_file(file.path()).unwrap();
        assert_eq!(order.id.as_deref(), Some("ord-9"));
        assert_eq!(line.medication_name.as_deref(), Some("Atorvastatin"));
    }

    #[test]
    fn test_load_missing_and_invalid() {
        assert!(matches!(
            load_order_file(Path::new("/nonexistent/order.json")),
            Err(Error::FileNotFound { .. })
        ));

        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(load_order_file(file.path()), Err(Error::InvalidFormat { .. })));
    }
}
