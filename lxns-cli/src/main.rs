//! lxns: run a program in new Linux namespaces
//!
//! The binary has two roles. Invoked normally it launches; re-executed by
//! itself with the instance sentinel as argv[0] it performs the setup inside
//! the namespaces and execs the target.

use std::process;

use clap::Parser;
use lxns_namespace::Invocation;
use tracing_subscriber::EnvFilter;

mod cli;
mod instance;
mod run;

use cli::Cli;

fn main() {
    match Invocation::from_env() {
        Invocation::Launch(args) => {
            let cli = Cli::parse_from(args);
            init_logging(cli.verbose);

            match run::execute(&cli) {
                Ok(exit_code) => process::exit(exit_code),
                Err(e) => {
                    eprintln!("Error: {e:#}");
                    process::exit(1);
                }
            }
        }
        Invocation::Setup { target } => {
            init_logging(false);

            match instance::execute(&target) {
                Ok(never) => match never {},
                Err(e) => {
                    eprintln!("Error: {e:#}");
                    process::exit(1);
                }
            }
        }
    }
}

/// `RUST_LOG` wins; otherwise info, or debug with `--verbose`
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
