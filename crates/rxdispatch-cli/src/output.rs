//! Output formatting and writing utilities
//!
//! This module provides utilities for formatting and writing output
//! in various formats (JSON, YAML, human-readable), with dedicated
//! rendering for self-test reports and dispatch outcomes.

use crate::cli::OutputFormat;
use crate::error::Result;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use rxdispatch_core::redaction;
use rxdispatch_core::{DispatchOutcome, SelfTestReport};
use serde::Serialize;
use serde_json::Value;
use std::io::{self, Write};
use std::time::Duration;
use is_terminal::IsTerminal;
use tracing::{debug, trace};

/// Trait for formatting output with specialized support for report types
pub trait OutputFormatter {
    /// Format a serializable value
    fn format<T: Serialize>(&self, value: &T) -> Result<String>;

    /// Format a self-test report
    fn format_self_test_report(&self, report: &SelfTestReport, use_color: bool) -> Result<String>;

    /// Format the status and body of a dispatch
    fn format_dispatch_outcome(&self, outcome: &DispatchOutcome, use_color: bool) -> Result<String>;
}

impl OutputFormatter for OutputFormat {
    fn format<T: Serialize>(&self, value: &T) -> Result<String> {
        match self {
            OutputFormat::Json => Ok(serde_json::to_string(value)?),
            OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(value)?),
            OutputFormat::Yaml => Ok(serde_yaml::to_string(value)?),
            OutputFormat::Human => {
                // For human format, use pretty JSON as fallback
                Ok(serde_json::to_string_pretty(value)?)
            }
        }
    }

    fn format_self_test_report(&self, report: &SelfTestReport, use_color: bool) -> Result<String> {
        match self {
            OutputFormat::Human => Ok(format_self_test_report_human(report, use_color)),
            _ => self.format(report),
        }
    }

    fn format_dispatch_outcome(&self, outcome: &DispatchOutcome, use_color: bool) -> Result<String> {
        match self {
            OutputFormat::Human => format_dispatch_outcome_human(outcome, use_color),
            _ => self.format(&serde_json::json!({
                "status": outcome.status,
                "stage": outcome.stage,
                "trail": outcome.trail,
                "attempts": outcome.attempts,
                "body": outcome.body,
            })),
        }
    }
}

/// Output writer that handles different output formats and colors
pub struct OutputWriter {
    format: OutputFormat,
    use_color: bool,
    show_progress: bool,
    quiet: bool,
    writer: Box<dyn Write>,
}

impl OutputWriter {
    /// Create a new output writer
    pub fn new(format: OutputFormat, use_color: bool, quiet: bool) -> Self {
        Self {
            format,
            use_color,
            show_progress: !quiet && format == OutputFormat::Human && io::stderr().is_terminal(),
            quiet,
            writer: Box::new(io::stdout()),
        }
    }

    /// Create an output writer with a custom writer
    #[cfg(test)]
    pub fn with_writer(format: OutputFormat, use_color: bool, quiet: bool, writer: Box<dyn Write>) -> Self {
        Self {
            format,
            use_color,
            show_progress: false, // No progress bars with custom writers
            quiet,
            writer,
        }
    }

    /// Get the output format
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Write raw output
    pub fn write(&mut self, content: &str) -> Result<()> {
        write!(self.writer, "{}", content)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Write a line of output
    pub fn writeln(&mut self, content: &str) -> Result<()> {
        writeln!(self.writer, "{}", content)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Write an info message
    pub fn info(&mut self, message: &str) -> Result<()> {
        debug!("Output info: {}", message);

        if self.quiet || self.format != OutputFormat::Human {
            return Ok(());
        }

        if self.use_color {
            self.writeln(&format!("{} {}", "ℹ".blue(), message))
        } else {
            self.writeln(&format!("INFO: {}", message))
        }
    }

    /// Write a success message
    pub fn success(&mut self, message: &str) -> Result<()> {
        if self.quiet || self.format != OutputFormat::Human {
            return Ok(());
        }

        if self.use_color {
            self.writeln(&message.green().to_string())
        } else {
            self.writeln(message)
        }
    }

    /// Write a warning message
    pub fn warning(&mut self, message: &str) -> Result<()> {
        if self.format != OutputFormat::Human {
            return Ok(());
        }

        if self.use_color {
            self.writeln(&message.yellow().to_string())
        } else {
            self.writeln(&format!("WARNING: {}", message))
        }
    }

    /// Write an error message
    pub fn error(&mut self, message: &str) -> Result<()> {
        if self.format != OutputFormat::Human {
            return Ok(());
        }

        if self.use_color {
            self.writeln(&message.red().to_string())
        } else {
            self.writeln(&format!("ERROR: {}", message))
        }
    }

    /// Write a section header
    pub fn section(&mut self, title: &str) -> Result<()> {
        if self.quiet || self.format != OutputFormat::Human {
            return Ok(());
        }

        self.writeln("")?;
        if self.use_color {
            self.writeln(&format!("═══ {} ═══", title).bright_blue().to_string())
        } else {
            self.writeln(&format!("=== {} ===", title))
        }
    }

    /// Write data in the configured format
    pub fn data<T: Serialize>(&mut self, value: &T) -> Result<()> {
        if tracing::enabled!(tracing::Level::TRACE) {
            let mut value_json = serde_json::to_value(value)?;
            redaction::redact_json_value(&mut value_json);
            trace!("Outputting data: {}", value_json);
        }

        let formatted = self.format.format(value)?;
        self.write_formatted(&formatted)
    }

    /// Write a self-test report
    pub fn self_test_report(&mut self, report: &SelfTestReport) -> Result<()> {
        let formatted = self.format.format_self_test_report(report, self.use_color)?;
        self.write_formatted(&formatted)
    }

    /// Write a dispatch outcome
    pub fn dispatch_outcome(&mut self, outcome: &DispatchOutcome) -> Result<()> {
        let formatted = self.format.format_dispatch_outcome(outcome, self.use_color)?;
        self.write_formatted(&formatted)
    }

    fn write_formatted(&mut self, formatted: &str) -> Result<()> {
        if formatted.ends_with('\n') {
            self.write(formatted)
        } else {
            self.writeln(formatted)
        }
    }

    /// Create a spinner for indeterminate progress
    pub fn spinner(&self, message: &str) -> Option<ProgressBar> {
        if !self.show_progress {
            return None;
        }

        let pb = ProgressBar::new_spinner();
        pb.set_style(default_spinner_style());
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    }
}

/// Helper function to create a spinner style
pub fn default_spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Format a self-test report for human reading
fn format_self_test_report_human(report: &SelfTestReport, use_color: bool) -> String {
    let mut output = String::new();

    output.push_str("═══ Integration Self-Test ═══\n\n");

    for detail in &report.details {
        let mark = match (detail.passed, use_color) {
            (true, true) => "✓".green().to_string(),
            (true, false) => "✓".to_string(),
            (false, true) => "✗".red().to_string(),
            (false, false) => "✗".to_string(),
        };
        output.push_str(&format!("  {} {}\n", mark, detail.test));

        if !detail.passed {
            if let Some(expected) = &detail.expected {
                output.push_str(&format!("      Expected: {}\n", format_value_compact(expected)));
            }
            if let Some(actual) = &detail.actual {
                output.push_str(&format!("      Actual:   {}\n", format_value_compact(actual)));
            }
            if let Some(error) = &detail.error {
                output.push_str(&format!("      Error:    {}\n", error));
            }
        }
    }

    output.push('\n');
    let summary = format!(
        "{} ({} run, {} passed, {} failed)",
        report.message, report.tests_run, report.tests_passed, report.tests_failed
    );
    if use_color {
        let colored = if report.success { summary.green() } else { summary.red() };
        output.push_str(&colored.to_string());
    } else {
        output.push_str(&summary);
    }
    output.push('\n');

    output
}

/// Format a dispatch outcome for human reading
fn format_dispatch_outcome_human(outcome: &DispatchOutcome, use_color: bool) -> Result<String> {
    let mut output = String::new();
    let body = &outcome.body;

    let headline = if outcome.is_success() {
        let message = body["message"].as_str().unwrap_or("Order sent");
        format!("✅ {}", message)
    } else {
        let error = body["error"].as_str().unwrap_or("Dispatch failed");
        format!("❌ {}", error)
    };
    if use_color {
        let colored = if outcome.is_success() { headline.green() } else { headline.red() };
        output.push_str(&colored.to_string());
    } else {
        output.push_str(&headline);
    }
    output.push('\n');

    output.push_str(&format!("  Status:   {}\n", outcome.status));
    output.push_str(&format!("  Stage:    {}\n", outcome.stage));
    output.push_str(&format!("  Attempts: {}\n", outcome.attempts));
    if body["dry_run"].as_bool() == Some(true) {
        output.push_str("  Mode:     dry run (nothing was sent)\n");
    }
    for key in ["test_order_id", "order_id", "pharmacy_order_id", "classification", "endpoint"] {
        if let Some(value) = body.get(key).filter(|v| !v.is_null()) {
            output.push_str(&format!("  {}: {}\n", key, format_value_compact(value)));
        }
    }

    if let Some(diagnostics) = body.get("diagnostics") {
        output.push_str("\n🩺 Diagnostics:\n");
        let report = rxdispatch_core::DiagnosticsReport::from_value(diagnostics.clone());
        output.push_str(&report.format_display(use_color));
        output.push('\n');
    }

    if let Some(response) = body.get("response_body").filter(|v| !v.is_null()) {
        let mut response = response.clone();
        redaction::redact_json_value(&mut response);
        output.push_str("\n📝 Response Body:\n");
        output.push_str(&serde_json::to_string_pretty(&response)?);
        output.push('\n');
    }

    Ok(output)
}

/// Format a JSON value in a compact, human-readable way
fn format_value_compact(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(arr) => {
            if arr.len() <= 3 {
                format!("[{}]", arr.iter()
                    .map(format_value_compact)
                    .collect::<Vec<_>>()
                    .join(", "))
            } else {
                format!("[{} items]", arr.len())
            }
        }
        Value::Object(obj) => {
            if obj.len() <= 2 {
                let items: Vec<String> = obj.iter()
                    .map(|(k, v)| format!("{}: {}", k, format_value_compact(v)))
                    .collect();
                format!("{{{}}}", items.join(", "))
            } else {
                format!("{{{} fields}}", obj.len())
            }
        }
    }
}
