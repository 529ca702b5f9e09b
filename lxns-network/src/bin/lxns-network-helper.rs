//! lxns network helper
//!
//! Creates a veth pair, enslaves the host end to the bridge and moves the
//! other end into the network namespace of the given process. Needs
//! `CAP_NET_ADMIN` in the host network namespace, so it is usually installed
//! setuid root and invoked by `lxns` as `lxns-network-helper <PID>`.

use anyhow::{Context, Result};
use clap::Parser;
use lxns_core::ProcessId;
use lxns_network::{BRIDGE_NAME, NetlinkLinks, NetworkAttacher};
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lxns-network-helper")]
#[command(about = "Attach a process's network namespace to the host bridge", long_about = None)]
#[command(version)]
struct Args {
    /// Process whose network namespace receives the veth end
    pid: ProcessId,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    // Runs setuid root: the caller's environment does not pick the filter.
    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    if let Err(e) = run(args.pid) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

#[tokio::main(flavor = "current_thread")]
async fn run(pid: ProcessId) -> Result<()> {
    let links = NetlinkLinks::connect().context("Failed to open netlink socket")?;

    NetworkAttacher::new(links)
        .attach(pid)
        .await
        .with_context(|| format!("Failed to attach pid {pid} to {BRIDGE_NAME}"))
}
