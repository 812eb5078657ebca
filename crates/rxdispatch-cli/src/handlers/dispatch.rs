//! Dispatch command handler

use super::utils::load_order_file;
use crate::cli::DispatchArgs;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::logging::timing::Timer;
use crate::output::OutputWriter;
use rxdispatch_core::{DispatchRequest, RetryPolicy};

/// Handle the dispatch command
pub async fn handle_dispatch(
    args: DispatchArgs,
    config: &Config,
    output: &mut OutputWriter,
) -> Result<()> {
    let timer = Timer::with_details("dispatch", &args.pharmacy_id);
    let mut orchestrator = config.build_components()?.orchestrator;
    if args.no_retry {
        orchestrator = orchestrator.with_retry_policy(RetryPolicy::none());
    }

    let mut request = DispatchRequest::new(&args.pharmacy_id);
    request.dry_run = args.dry_run_override();
    let dry_run = request.dry_run.unwrap_or(config.api.default_dry_run);
    if dry_run {
        output.info("Dry run: the request is built and logged but not sent")?;
    }

    let order = args.order.as_deref().map(load_order_file).transpose()?;

    let spinner = output.spinner(&format!("Dispatching to {}...", args.pharmacy_id));
    let outcome = match &order {
        Some((order, line)) => orchestrator.dispatch_order(&request, order, line).await,
        None => orchestrator.dispatch_test_order(&request).await,
    };
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    output.dispatch_outcome(&outcome)?;
    output.info(&format!("Completed in {} ms", timer.elapsed().as_millis()))?;

    if outcome.is_success() {
        Ok(())
    } else {
        Err(Error::Failed {
            operation: "dispatch".to_string(),
            status: outcome.status,
        })
    }
}
