//! Payload preview command handler

use super::utils::load_order_file;
use crate::cli::{PayloadArgs, PayloadKind};
use crate::error::{Error, Result};
use crate::output::OutputWriter;
use rxdispatch_core::{
    create_generic_order_payload, create_production_order_payload, create_test_order_payload,
    extract_site_id_from_url,
};
use serde_json::Value;

/// Handle the payload command
pub fn handle_payload(args: PayloadArgs, output: &mut OutputWriter) -> Result<()> {
    let site_id = args
        .site_id
        .clone()
        .or_else(|| args.endpoint.as_deref().and_then(extract_site_id_from_url));

    let payload = build_payload(&args, site_id.as_deref())?;
    output.data(&payload)
}

fn build_payload(args: &PayloadArgs, site_id: Option<&str>) -> Result<Value> {
    if args.kind == PayloadKind::Test {
        return Ok(create_test_order_payload(site_id).to_value());
    }

    let path = args.order.as_deref().ok_or_else(|| {
        Error::invalid_args("--order is required for production and generic payloads")
    })?;
    let (order, line) = load_order_file(path)?;
    let prescription = create_production_order_payload(&order, &line, site_id);

    Ok(match args.kind {
        PayloadKind::Generic => create_generic_order_payload(&prescription).to_value(),
        _ => prescription.to_value(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args(kind: PayloadKind, order: Option<std::path::PathBuf>) -> PayloadArgs {
        PayloadArgs {
            kind,
            order,
            site_id: None,
            endpoint: None,
        }
    }

    #[test]
    fn test_test_payload_with_site_id() {
        let payload = build_payload(&args(PayloadKind::Test, None), Some("42")).unwrap();
        assert_eq!(payload["site_id"], "42");
        assert!(payload["external_order_id"].as_str().unwrap().starts_with("TEST-"));
    }

    #[test]
    fn test_production_requires_order_file() {
        let err = build_payload(&args(PayloadKind::Production, None), None).unwrap_err();
        assert!(err.should_show_help());
    }

    #[test]
    fn test_generic_payload_from_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"order": {{"id": "ord-1"}}, "line": {{"medication_name": "Amoxicillin"}}}}"#
        )
        .unwrap();

        let payload = build_payload(
            &args(PayloadKind::Generic, Some(file.path().to_path_buf())),
            None,
        )
        .unwrap();
        assert!(payload.to_string().contains("Amoxicillin"));
    }
}
