//! Command handlers for CLI subcommands
//!
//! This module contains the implementation logic for each CLI subcommand.

mod completions;
mod config;
mod dispatch;
mod payload;
mod serve;
mod site_id;
mod utils;

pub use completions::handle_completions;
pub use config::handle_config;
pub use dispatch::handle_dispatch;
pub use payload::handle_payload;
pub use self_test::handle_self_test;
pub use serve::handle_serve;
pub use site_id::handle_site_id;
