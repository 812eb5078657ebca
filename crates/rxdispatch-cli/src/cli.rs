//! Command-line interface argument parsing and definitions
//!
//! This module defines the CLI structure using clap's derive API,
//! providing a type-safe and well-documented command interface.

use clap::{Parser, Subcommand, ValueEnum};
use is_terminal::IsTerminal;
use std::path::PathBuf;

/// rxdispatch - pharmacy order dispatch and integration testing
///
/// Sends prescription orders to external pharmacy APIs, runs the integration
/// self-test suite, and serves both over HTTP.
#[derive(Parser, Debug)]
#[command(
    name = "rxdispatch",
    version,
    author,
    about,
    long_about = None,
    propagate_version = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Enable verbose output (can be used multiple times for increased verbosity)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "RXDISPATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format for results
    #[arg(short, long, value_enum, global = true, default_value = "human")]
    pub output: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// The subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the dispatch and self-test endpoints over HTTP
    Serve(ServeArgs),

    /// Run the integration self-test suite
    SelfTest(SelfTestArgs),

    /// Send a test order (or a real order from a file) to a pharmacy
    Dispatch(DispatchArgs),

    /// Extract the BareMeds site id from an endpoint URL
    SiteId(SiteIdArgs),

    /// Print the payload that would be sent for an order
    Payload(PayloadArgs),

    /// Inspect and validate configuration
    Config(ConfigArgs),

    /// Generate shell completions for the specified shell
    Completions(CompletionsArgs),
}

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to listen on (overrides server.bind)
    #[arg(short, long, value_name = "ADDR")]
    pub bind: Option<String>,
}

/// Arguments for the self-test command
#[derive(Parser, Debug)]
pub struct SelfTestArgs {
    /// Also check this pharmacy's configuration
    #[arg(short, long)]
    pub pharmacy: Option<String>,

    /// Include token retrieval and a dry-run dispatch
    #[arg(long)]
    pub all: bool,
}

/// Arguments for the dispatch command
#[derive(Parser, Debug)]
pub struct DispatchArgs {
    /// Pharmacy to dispatch to
    #[arg(value_name = "PHARMACY_ID")]
    pub pharmacy_id: String,

    /// Build and log the request without sending it
    #[arg(long, conflicts_with = "live")]
    pub dry_run: bool,

    /// Send even when dry run is the configured default
    #[arg(long)]
    pub live: bool,

    /// Order file (JSON or YAML) with `order` and `line` objects; a test order is sent when absent
    #[arg(long, value_name = "FILE")]
    pub order: Option<PathBuf>,

    /// Send exactly once even when retry.max_retries is configured
    #[arg(long)]
    pub no_retry: bool,
}

impl DispatchArgs {
    /// Explicit dry-run choice, if any flag was given
    pub fn dry_run_override(&self) -> Option<bool> {
        if self.dry_run {
            Some(true)
        } else if self.live {
            Some(false)
        } else {
            None
        }
    }
}

/// Arguments for the site-id command
#[derive(Parser, Debug)]
pub struct SiteIdArgs {
    /// Pharmacy endpoint URL
    #[arg(value_name = "URL")]
    pub url: String,
}

/// Arguments for the payload command
#[derive(Parser, Debug)]
pub struct PayloadArgs {
    /// Which payload to build
    #[arg(value_enum, default_value = "test")]
    pub kind: PayloadKind,

    /// Order file (JSON or YAML) with `order` and `line` objects
    #[arg(long, value_name = "FILE")]
    pub order: Option<PathBuf>,

    /// Site id to stamp on the payload
    #[arg(long)]
    pub site_id: Option<String>,

    /// Take the site id from this endpoint URL
    #[arg(long, value_name = "URL", conflicts_with = "site_id")]
    pub endpoint: Option<String>,
}

/// Payload shapes
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum PayloadKind {
    /// Synthetic test order
    Test,
    /// BareMeds order built from an order file
    Production,
    /// Generic pharmacy order built from an order file
    Generic,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration with secrets redacted
    Show(ConfigShowArgs),

    /// Check the configuration for problems
    Validate,
}

/// Arguments for config show
#[derive(Parser, Debug)]
pub struct ConfigShowArgs {
    /// Output format
    #[arg(short, long, value_enum, default_value = "yaml")]
    pub format: ConfigFormat,
}

/// Configuration file formats
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ConfigFormat {
    /// TOML format
    Toml,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
}

/// Arguments for generating shell completions
#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Output format options
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable formatted output
    Human,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
    /// Pretty-printed JSON output
    JsonPretty,
}

/// Supported shells for completion generation
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the effective verbosity level (considering quiet flag)
    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }

    /// Check if colored output should be used
    pub fn use_color(&self) -> bool {
        !self.no_color && std::io::stdout().is_terminal()
    }
}

impl Shell {
    /// Convert to clap_complete shell type
    pub fn to_clap_shell(self) -> clap_complete::Shell {
        match self {
            Shell::Bash => clap_complete::Shell::Bash,
            Shell::Zsh => clap_complete::Shell::Zsh,
            Shell::Fish => clap_complete::Shell::Fish,
            Shell::PowerShell => clap_complete::Shell::PowerShell,
            Shell::Elvish => clap_complete::Shell::Elvish,
        }
    }
}
