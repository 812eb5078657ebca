//! Site id command handler

use crate::cli::SiteIdArgs;
use crate::error::Result;
use crate::output::OutputWriter;
use rxdispatch_core::extract_site_id_from_url;
use rxdispatch_core::site_id::endpoint_path;
use serde_json::json;

/// Handle the site-id command
pub fn handle_site_id(args: SiteIdArgs, output: &mut OutputWriter) -> Result<()> {
    let site_id = extract_site_id_from_url(&args.url);

    match &site_id {
        Some(id) => output.success(&format!("✓ Site id: {}", id))?,
        None => output.warning("No site id found in URL")?,
    }

    output.data(&json!({
        "url": args.url,
        "site_id": site_id,
        "endpoint_path": endpoint_path(&args.url),
    }))
}
