//! Setup role, running inside the new namespaces

use std::convert::Infallible;
use std::ffi::OsString;

use anyhow::{Context, Result};
use lxns_namespace::{ControlReceiver, run_in_namespace};

/// Take the inherited control channel, set up, and exec `target`
pub fn execute(target: &[OsString]) -> Result<Infallible> {
    let receiver = ControlReceiver::inherited().context("Failed to open control channel")?;
    run_in_namespace(receiver, target).context("Namespace setup failed")
}
