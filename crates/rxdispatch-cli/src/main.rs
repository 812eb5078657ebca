//! rxdispatch CLI - pharmacy order dispatch and integration testing
//!
//! This is the main entry point for the rxdispatch binary, providing
//! commands for dispatching orders, running the integration self-test,
//! and serving both over HTTP.

mod cli;
mod config;
mod error;
mod handlers;
mod logging;
mod output;
mod server;

use cli::{Cli, Commands};
use colored::control;
use config::Config;
use error::Result;
use logging::{timing::Timer, LoggingConfig};
use output::OutputWriter;
use std::process;
use tracing::instrument;
use tracing_appender::non_blocking::WorkerGuard;

#[tokio::main]
async fn main() {
    // A missing .env file is fine
    let _ = dotenv::dotenv();

    let cli = Cli::parse_args();
    control::set_override(cli.use_color());

    let config = match Config::load_with_file(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => exit_with(&e),
    };

    let log_guard = match init_logging(&cli, &config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            None
        }
    };

    match run(cli, config).await {
        Ok(()) => {
            drop(log_guard);
            process::exit(0);
        }
        Err(e) => {
            drop(log_guard);
            exit_with(&e)
        }
    }
}

fn exit_with(e: &error::Error) -> ! {
    eprintln!("{}", error::format_error(e, control::SHOULD_COLORIZE.should_colorize()));

    if e.should_show_help() {
        eprintln!("\nFor more information, try '--help'");
    }

    process::exit(e.exit_code());
}

/// Main application logic
#[instrument(skip(cli, config), fields(command = ?cli.command))]
async fn run(cli: Cli, config: Config) -> Result<()> {
    let _timer = Timer::new("cli_execution");

    let mut output = OutputWriter::new(cli.output, cli.use_color(), cli.quiet);

    tracing::info!(
        command = ?cli.command,
        verbosity = cli.verbosity_level(),
        "Executing command"
    );

    match cli.command {
        Commands::Serve(args) => handlers::handle_serve(args, &config, &mut output).await,
        Commands::SelfTest(args) => handlers::handle_self_test(args, &config, &mut output).await,
        Commands::Dispatch(args) => handlers::handle_dispatch(args, &config, &mut output).await,
        Commands::SiteId(args) => handlers::handle_site_id(args, &mut output),
        Commands::Payload(args) => handlers::handle_payload(args, &mut output),
        Commands::Config(args) => handlers::handle_config(args, &config, &mut output).await,
        Commands::Completions(args) => handlers::handle_completions(args),
    }
}

/// Initialize the logging system
fn init_logging(cli: &Cli, config: &Config) -> Result<Option<WorkerGuard>> {
    let verbosity = cli.verbosity_level();
    let mut logging_config = LoggingConfig::from_verbosity(verbosity);
    logging_config.merge_with_file(&config.logging, verbosity);
    logging_config.merge_with_env();

    // If quiet mode, only log errors
    if cli.quiet {
        logging_config.level = "error".to_string();
        logging_config.console = false;
    }

    logging::init_logging(logging_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["rxdispatch", "-vv", "site-id", "https://x.com/api/site/1/orders"]);
        assert_eq!(cli.verbosity_level(), 2);
        assert!(matches!(cli.command, Commands::SiteId(_)));

        let cli = Cli::parse_from(["rxdispatch", "--quiet", "serve", "--bind", "0.0.0.0:9000"]);
        assert_eq!(cli.verbosity_level(), 0);
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.bind.as_deref(), Some("0.0.0.0:9000"));
    }

    #[test]
    fn test_config_subcommands_parse() {
        let cli = Cli::parse_from(["rxdispatch", "config", "show", "--format", "toml"]);
        assert!(matches!(cli.command, Commands::Config(_)));
        let cli = Cli::parse_from(["rxdispatch", "config", "validate"]);
        assert!(matches!(cli.command, Commands::Config(_)));
    }
}
