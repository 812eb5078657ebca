//! Configuration command handlers

use crate::cli::{ConfigAction, ConfigArgs, ConfigFormat, ConfigShowArgs};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::output::OutputWriter;
use serde_json::Value;

/// Handle the config command
pub async fn handle_config(
    args: ConfigArgs,
    config: &Config,
    output: &mut OutputWriter,
) -> Result<()> {
    match args.action {
        ConfigAction::Show(show_args) => handle_config_show(show_args, config, output),
        ConfigAction::Validate => handle_config_validate(config, output),
    }
}

/// Handle config show subcommand
fn handle_config_show(
    args: ConfigShowArgs,
    config: &Config,
    output: &mut OutputWriter,
) -> Result<()> {
    let mut redacted = config.redacted_value()?;
    strip_nulls(&mut redacted);

    let content = match args.format {
        ConfigFormat::Toml => toml::to_string_pretty(&redacted)
            .map_err(|e| Error::config(format!("Failed to serialize as TOML: {}", e)))?,
        ConfigFormat::Json => serde_json::to_string_pretty(&redacted)?,
        ConfigFormat::Yaml => serde_yaml::to_string(&redacted)?,
    };

    output.writeln(content.trim_end())
}

/// Drop unset fields; TOML has no null
fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}

/// Handle config validate subcommand
fn handle_config_validate(config: &Config, output: &mut OutputWriter) -> Result<()> {
    let report = config.validate();

    output.section("Configuration Check")?;
    for error in &report.errors {
        output.error(&format!("✗ {}", error))?;
    }
    for warning in &report.warnings {
        output.warning(&format!("⚠ {}", warning))?;
    }
    if report.valid {
        output.success(&format!(
            "✓ Configuration is valid ({} pharmacies, {} warning(s))",
            config.pharmacies.len(),
            report.warnings.len()
        ))?;
    }

    if output.format() != crate::cli::OutputFormat::Human {
        output.data(&report)?;
    }

    if report.valid {
        Ok(())
    } else {
        Err(Error::config(format!(
            "{} configuration error(s) found",
            report.errors.len()
        )))
    }
}
