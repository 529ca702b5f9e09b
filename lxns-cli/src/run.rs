//! Launcher role

use anyhow::{Context, Result};
use lxns_namespace::{Launcher, NamespaceConfig};
use tracing::{debug, info};

use crate::cli::Cli;

/// Build the configuration, launch, and return the child's exit code
pub fn execute(cli: &Cli) -> Result<i32> {
    let mut config =
        NamespaceConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    config.apply_overrides(cli.overrides());
    let config = config.resolve().context("Configuration rejected")?;

    debug!(config = ?config, "Resolved configuration");
    info!(id = %config.id, "🚀 Starting lxns instance");

    let exit_code = Launcher::new(config, cli.launch_options())
        .launch(&cli.command)
        .context("Launch failed")?;

    info!(exit_code, "Instance finished");
    Ok(exit_code)
}
