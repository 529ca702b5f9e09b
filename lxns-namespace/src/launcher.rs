//! Parent side: clone the child into its namespaces and drive it
//!
//! ```text
//! parent                              child
//! ──────                              ─────
//! clone(flags) ─────────────────────> blocks on sync pipe
//! write uid_map, setgroups, gid_map
//! release ──────────────────────────> fd 3 := control pipe
//!                                     execve(/proc/self/exe, [SENTINEL, target...])
//! network helper <pid>                blocks reading fd 3
//! send config, close ───────────────> setup, exec target
//! waitpid
//! ```

#![allow(unsafe_code)]

use std::ffi::{CString, OsStr, OsString, c_char};
use std::fs::File;
use std::io::Write;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lxns_core::{Error, InstanceId, LaunchEvent, ProcessId, Result};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sched::CloneFlags;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitStatus, waitpid};
use tracing::{debug, info, warn};

use crate::channel::{CONTROL_FD, control_channel};
use crate::config::{Feature, FeatureSet, IdMapTable, NamespaceConfig};
use crate::helper::{DEFAULT_ATTACH_TIMEOUT, NetworkHelper};
use crate::invocation::{INSTANCE_ID_ENV, INSTANCE_SENTINEL};

/// Binary re-executed as the setup stage
pub const SELF_EXE: &str = "/proc/self/exe";

const CHILD_STACK_SIZE: usize = 1024 * 1024;

/// Launch options that are not part of the namespace configuration
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Network helper to run for the `net` feature
    pub network_helper: Option<PathBuf>,
    /// Deadline for the network helper
    pub attach_timeout: Duration,
    /// Program the child re-executes; [`SELF_EXE`] unless testing
    pub executable: PathBuf,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            network_helper: None,
            attach_timeout: DEFAULT_ATTACH_TIMEOUT,
            executable: PathBuf::from(SELF_EXE),
        }
    }
}

/// Parent orchestrator for one namespace instance
#[derive(Debug)]
pub struct Launcher {
    config: NamespaceConfig,
    options: LaunchOptions,
}

impl Launcher {
    /// Create a launcher for a resolved configuration
    #[must_use]
    pub const fn new(config: NamespaceConfig, options: LaunchOptions) -> Self {
        Self { config, options }
    }

    /// Get the configuration
    #[must_use]
    pub const fn config(&self) -> &NamespaceConfig {
        &self.config
    }

    /// Run `target` in new namespaces and wait for it
    ///
    /// Returns the child's exit code, or 128 + signal number when it was
    /// killed by a signal. A child spawned before a failure is killed and
    /// reaped before the error is returned.
    ///
    /// # Errors
    /// Returns configuration errors before anything is spawned, and
    /// namespace, attacher, timeout or channel errors afterwards
    pub fn launch(&self, target: &[OsString]) -> Result<i32> {
        let id = self.config.id.clone();

        match self.run(target) {
            Ok(exit_code) => {
                LaunchEvent::Exited { id, exit_code }.emit_trace();
                Ok(exit_code)
            }
            Err(e) => {
                LaunchEvent::Failed {
                    id,
                    message: e.to_string(),
                }
                .emit_trace();
                Err(e)
            }
        }
    }

    fn run(&self, target: &[OsString]) -> Result<i32> {
        if target.is_empty() {
            return Err(Error::config("no program to run"));
        }

        self.config.validate()?;
        let features = self.config.features()?;
        let flags = features.clone_flags();
        let id_maps = features
            .contains(Feature::User)
            .then(|| (self.config.uid_map_table(), self.config.gid_map_table()));

        let spawn = SpawnArgs::new(&self.options.executable, target, &self.config.id)?;
        let (control, sender) = control_channel()?;

        info!(
            id = %self.config.id,
            features = ?features.iter().map(Feature::token).collect::<Vec<_>>(),
            program = %target[0].to_string_lossy(),
            "Launching namespace instance"
        );

        let (child, release) = clone_child(flags, &spawn, control)?;
        LaunchEvent::Spawned {
            id: self.config.id.clone(),
            pid: child.pid(),
        }
        .emit_trace();

        if let Some((uid_map, gid_map)) = id_maps {
            write_id_maps(&proc_dir(child.pid()), &uid_map, &gid_map)?;
            debug!(pid = child.pid().as_raw(), "ID maps written");
        }
        release.release()?;

        self.attach_network(&features, child.pid())?;

        let bytes = sender.send(&self.config)?;
        LaunchEvent::ConfigDelivered {
            id: self.config.id.clone(),
            bytes,
        }
        .emit_trace();

        child.wait()
    }

    fn attach_network(&self, features: &FeatureSet, pid: ProcessId) -> Result<()> {
        let Some(path) = &self.options.network_helper else {
            if features.contains(Feature::Net) {
                info!("No network helper configured, namespace stays unattached");
            }
            return Ok(());
        };

        if !features.contains(Feature::Net) {
            warn!(helper = %path.display(), "Network helper ignored without the net feature");
            return Ok(());
        }

        let helper = NetworkHelper::new(path).with_timeout(self.options.attach_timeout);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(helper.attach(pid))?;

        LaunchEvent::NetworkAttached {
            id: self.config.id.clone(),
            pid,
        }
        .emit_trace();
        Ok(())
    }
}

/// Everything `execve` needs, converted before the clone
#[derive(Debug)]
struct SpawnArgs {
    program: CString,
    argv: Vec<CString>,
    envp: Vec<CString>,
}

impl SpawnArgs {
    fn new(executable: &Path, target: &[OsString], id: &InstanceId) -> Result<Self> {
        let program = c_string(executable.as_os_str())?;

        let argv = std::iter::once(OsStr::new(INSTANCE_SENTINEL))
            .chain(target.iter().map(OsString::as_os_str))
            .map(c_string)
            .collect::<Result<Vec<_>>>()?;

        let mut envp = std::env::vars_os()
            .filter(|(key, _)| key.as_os_str() != OsStr::new(INSTANCE_ID_ENV))
            .map(|(key, value)| {
                let mut entry = key;
                entry.push("=");
                entry.push(value);
                c_string(&entry)
            })
            .collect::<Result<Vec<_>>>()?;
        envp.push(c_string(OsStr::new(&format!("{INSTANCE_ID_ENV}={id}")))?);

        Ok(Self {
            program,
            argv,
            envp,
        })
    }
}

fn c_string(value: &OsStr) -> Result<CString> {
    CString::new(value.as_bytes()).map_err(|_| {
        Error::config(format!("argument contains a NUL byte: {}", value.to_string_lossy()))
    })
}

fn null_terminated(strings: &[CString]) -> Vec<*const c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(std::ptr::null()))
        .collect()
}

/// Descriptors the clone callback works with
#[derive(Debug, Clone, Copy)]
struct ChildFds {
    sync_read: RawFd,
    sync_write: RawFd,
    control: RawFd,
}

/// Clone callback; runs in the child on the clone stack
///
/// Only raw syscalls from here on: the child must not allocate or take locks
/// that another thread of the parent may have held at clone time.
///
/// # Safety
/// All pointers must stay valid until `execve`, and the arrays must be
/// null-terminated.
unsafe fn child_entry(
    fds: ChildFds,
    program: *const c_char,
    argv: *const *const c_char,
    envp: *const *const c_char,
) -> isize {
    unsafe {
        libc::close(fds.sync_write);

        // Wait for the parent to finish the ID maps; EOF means it gave up.
        let mut byte = 0u8;
        loop {
            match libc::read(fds.sync_read, (&raw mut byte).cast(), 1) {
                1 => break,
                -1 if Errno::last() == Errno::EINTR => {}
                _ => return 1,
            }
        }
        libc::close(fds.sync_read);

        // dup2 onto itself would keep close-on-exec set.
        let installed = if fds.control == CONTROL_FD {
            libc::fcntl(CONTROL_FD, libc::F_SETFD, 0)
        } else {
            libc::dup2(fds.control, CONTROL_FD)
        };
        if installed == -1 {
            report(b"lxns: cannot install control channel\n");
            return 1;
        }

        libc::execve(program, argv, envp);
        report(b"lxns: cannot re-execute launcher\n");
        127
    }
}

fn report(message: &[u8]) {
    // SAFETY: plain write(2) of a borrowed buffer.
    unsafe {
        libc::write(libc::STDERR_FILENO, message.as_ptr().cast(), message.len());
    }
}

/// Write end of the sync pipe; releasing it lets the child exec
#[derive(Debug)]
struct SyncRelease(File);

impl SyncRelease {
    fn release(mut self) -> Result<()> {
        self.0.write_all(&[0]).map_err(|e| Error::Namespace {
            message: format!("failed to release child: {e}"),
        })
    }
}

fn clone_child(
    flags: CloneFlags,
    spawn: &SpawnArgs,
    control: OwnedFd,
) -> Result<(ChildProcess, SyncRelease)> {
    let (sync_read, sync_write) = nix::unistd::pipe2(OFlag::O_CLOEXEC)
        .map_err(|e| Error::Namespace {
            message: format!("failed to create sync pipe: {e}"),
        })?;

    let fds = ChildFds {
        sync_read: sync_read.as_raw_fd(),
        sync_write: sync_write.as_raw_fd(),
        control: control.as_raw_fd(),
    };
    let argv = null_terminated(&spawn.argv);
    let envp = null_terminated(&spawn.envp);
    let program = spawn.program.as_ptr();

    let mut stack = vec![0u8; CHILD_STACK_SIZE];
    let callback = Box::new(|| {
        // SAFETY: `spawn`, `argv` and `envp` outlive the clone call, and
        // without CLONE_VM the child works on its own copy of them.
        unsafe { child_entry(fds, program, argv.as_ptr(), envp.as_ptr()) }
    });

    let exit_signal = Some(Signal::SIGCHLD as i32);
    // SAFETY: the callback only performs raw syscalls up to execve.
    let cloned = unsafe { nix::sched::clone(callback, &mut stack, flags, exit_signal) };
    let pid = cloned.map_err(|e| Error::Namespace {
        message: format!("clone with {flags:?} failed: {e}"),
    })?;

    // The child holds its own copies now.
    drop(sync_read);
    drop(control);

    Ok((
        ChildProcess::new(ProcessId::from(pid)),
        SyncRelease(File::from(sync_write)),
    ))
}

fn proc_dir(pid: ProcessId) -> PathBuf {
    PathBuf::from(format!("/proc/{pid}"))
}

/// Write the ID maps of a child in a new user namespace
///
/// `setgroups` is denied before `gid_map` is written, which the kernel
/// requires of an unprivileged writer.
fn write_id_maps(proc_dir: &Path, uid_map: &IdMapTable, gid_map: &IdMapTable) -> Result<()> {
    write_proc_file(&proc_dir.join("uid_map"), &uid_map.to_proc_format())?;
    write_proc_file(&proc_dir.join("setgroups"), "deny")?;
    write_proc_file(&proc_dir.join("gid_map"), &gid_map.to_proc_format())
}

fn write_proc_file(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).map_err(|e| Error::Namespace {
        message: format!("failed to write {}: {e}", path.display()),
    })
}

/// Spawned child; killed and reaped if dropped before [`ChildProcess::wait`]
#[derive(Debug)]
struct ChildProcess {
    pid: ProcessId,
    reaped: bool,
}

impl ChildProcess {
    const fn new(pid: ProcessId) -> Self {
        Self { pid, reaped: false }
    }

    const fn pid(&self) -> ProcessId {
        self.pid
    }

    fn wait(mut self) -> Result<i32> {
        let pid = self.pid.as_nix_pid();
        debug!(pid = self.pid.as_raw(), "Waiting for child");

        loop {
            match waitpid(pid, None) {
                Ok(WaitStatus::Exited(_, code)) => {
                    self.reaped = true;
                    return Ok(code);
                }
                Ok(WaitStatus::Signaled(_, signal, _)) => {
                    self.reaped = true;
                    warn!(pid = self.pid.as_raw(), signal = ?signal, "Child killed by signal");
                    return Ok(128 + signal as i32);
                }
                Ok(status) => debug!(?status, "Child status changed"),
                Err(Errno::EINTR) => {}
                Err(e) => {
                    self.reaped = true;
                    return Err(Error::Namespace {
                        message: format!("waiting for child {} failed: {e}", self.pid),
                    });
                }
            }
        }
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }

        warn!(pid = self.pid.as_raw(), "Killing child after failed launch");
        let pid = self.pid.as_nix_pid();
        if let Err(e) = kill(pid, Signal::SIGKILL) {
            warn!(pid = self.pid.as_raw(), error = %e, "Failed to kill child");
        }
        while let Err(Errno::EINTR) = waitpid(pid, None) {}
    }
}
