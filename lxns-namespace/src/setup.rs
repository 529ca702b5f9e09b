//! Child side: finish isolation inside the namespaces, then exec the target
//!
//! Runs in the re-executed launcher, after the parent has written the ID maps
//! and before the target program replaces it. Order matters: the executable
//! is looked up only after the mount namespace is in its final shape, so it
//! resolves against the new root.

use std::convert::Infallible;
use std::ffi::{CString, OsString};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use lxns_core::{Error, InstanceId, Result};
use lxns_network::configure_namespace_network;
use tracing::{debug, info};

use crate::channel::ControlReceiver;
use crate::config::{Feature, NamespaceConfig};
use crate::invocation::INSTANCE_ID_ENV;
use crate::rootfs::{FilesystemPlan, SystemMounter};

/// Set up the namespaces described by the control channel and exec `target`
///
/// Only returns on failure.
///
/// # Errors
/// Returns the error of the first step that failed
pub fn run_in_namespace(receiver: ControlReceiver, target: &[OsString]) -> Result<Infallible> {
    let config = receiver.receive()?;
    config.validate()?;
    let features = config.features()?;

    info!(id = %config.id, pid = std::process::id(), "Setting up namespace instance");

    if features.contains(Feature::Net) {
        configure_namespace_network(config.network_address()?)?;
    }

    let rootfs = config.has_rootfs().then_some(config.rootfs.as_path());
    let plan = FilesystemPlan::new(&features, rootfs);
    plan.apply(&mut SystemMounter)?;

    if features.contains(Feature::Uts) {
        let hostname = instance_id(&config).hostname();
        nix::unistd::sethostname(&hostname).map_err(|e| Error::Namespace {
            message: format!("failed to set hostname {hostname}: {e}"),
        })?;
        debug!(hostname = %hostname, "Hostname set");
    }

    let program = resolve_target(target)?;
    exec(&program, target)
}

/// Instance id from the environment, falling back to the configuration
fn instance_id(config: &NamespaceConfig) -> InstanceId {
    id_from(std::env::var_os(INSTANCE_ID_ENV), config)
}

fn id_from(env: Option<OsString>, config: &NamespaceConfig) -> InstanceId {
    env.filter(|id| !id.is_empty()).map_or_else(
        || config.id.clone(),
        |id| InstanceId::from(id.to_string_lossy().into_owned()),
    )
}

/// Look up the target program on `PATH` in the current mount namespace
fn resolve_target(target: &[OsString]) -> Result<PathBuf> {
    let Some(program) = target.first() else {
        return Err(Error::ExecResolution {
            program: String::new(),
            message: "no program given".to_string(),
        });
    };

    which::which(program).map_err(|e| Error::ExecResolution {
        program: program.to_string_lossy().into_owned(),
        message: e.to_string(),
    })
}

fn exec(program: &Path, target: &[OsString]) -> Result<Infallible> {
    let exec_error = |message: String| Error::Exec {
        program: program.display().to_string(),
        message,
    };

    let path = CString::new(program.as_os_str().as_bytes())
        .map_err(|_| exec_error("path contains a NUL byte".to_string()))?;
    let argv = target
        .iter()
        .map(|arg| CString::new(arg.as_bytes()))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| exec_error("argument contains a NUL byte".to_string()))?;

    info!(program = %program.display(), "Executing target");
    nix::unistd::execv(&path, &argv).map_err(|e| exec_error(e.to_string()))
}
