//! Serve command handler

use crate::cli::ServeArgs;
use crate::config::Config;
use crate::error::Result;
use crate::output::OutputWriter;
use crate::server::{self, AppState, DISPATCH_PATH, HEALTH_PATH, SELF_TEST_PATH};
use rxdispatch_core::SelfTestRunner;

/// Handle the serve command
pub async fn handle_serve(args: ServeArgs, config: &Config, output: &mut OutputWriter) -> Result<()> {
    let components = config.build_components()?;
    let runner = SelfTestRunner::new()
        .with_token_provider(components.tokens.clone())
        .with_orchestrator(components.orchestrator.clone());
    let state = AppState::new(components.orchestrator, runner);

    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());
    output.info(&format!("Listening on http://{}", bind))?;
    output.info(&format!("  POST {}", SELF_TEST_PATH))?;
    output.info(&format!("  POST {}", DISPATCH_PATH))?;
    output.info(&format!("  GET  {}", HEALTH_PATH))?;
    if config.api.default_dry_run {
        output.warning("Dry run is the default; requests must pass dry_run: false to send")?;
    }

    server::serve(state, &bind).await
}
