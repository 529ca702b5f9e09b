//! Invocation of the external network helper
//!
//! The helper runs with privileges the launcher does not have, so it is a
//! separate program called as `<helper> <pid>`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use lxns_core::{Error, ProcessId, Result};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, Command};
use tracing::{debug, info, warn};

/// Default deadline for one helper run
pub const DEFAULT_ATTACH_TIMEOUT: Duration = Duration::from_secs(30);

/// External program that attaches a namespace to the host network
#[derive(Debug, Clone)]
pub struct NetworkHelper {
    path: PathBuf,
    timeout: Duration,
}

impl NetworkHelper {
    /// Helper at `path` with [`DEFAULT_ATTACH_TIMEOUT`]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timeout: DEFAULT_ATTACH_TIMEOUT,
        }
    }

    /// Set the deadline
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Helper program path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run the helper for `pid` and wait for it
    ///
    /// A helper still running at the deadline is killed and reaped.
    ///
    /// # Errors
    /// Returns [`Error::Attacher`] if the helper cannot be started or exits
    /// non-zero, [`Error::Timeout`] if it misses the deadline
    pub async fn attach(&self, pid: ProcessId) -> Result<()> {
        info!(helper = %self.path.display(), pid = pid.as_raw(), "Running network helper");

        let child = self.spawn(pid)?;
        self.supervise(child).await?;

        debug!(pid = pid.as_raw(), "Network helper finished");
        Ok(())
    }

    fn spawn(&self, pid: ProcessId) -> Result<Child> {
        Command::new(&self.path)
            .arg(pid.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Attacher {
                message: format!("failed to start {}: {e}", self.path.display()),
            })
    }

    async fn supervise(&self, mut child: Child) -> Result<()> {
        let stderr = child.stderr.take();
        let finished = tokio::time::timeout(self.timeout, async {
            tokio::join!(child.wait(), read_stderr(stderr))
        })
        .await;

        let Ok((status, stderr)) = finished else {
            warn!(helper = %self.path.display(), "Network helper missed its deadline");
            // kill() also waits, so the helper does not linger as a zombie
            if let Err(e) = child.kill().await {
                warn!(error = %e, "Failed to kill network helper");
            }
            return Err(Error::Timeout {
                operation: format!("network helper {}", self.path.display()),
                after: self.timeout,
            });
        };

        let status = status.map_err(|e| Error::Attacher {
            message: format!("failed to wait for {}: {e}", self.path.display()),
        })?;

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            let stderr = stderr.trim();
            let mut message = format!("{} {status}", self.path.display());
            if !stderr.is_empty() {
                message.push_str(": ");
                message.push_str(stderr);
            }
            return Err(Error::Attacher { message });
        }

        Ok(())
    }
}

async fn read_stderr(stderr: Option<ChildStderr>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut stderr) = stderr {
        if let Err(e) = stderr.read_to_end(&mut buf).await {
            debug!(error = %e, "Failed to read network helper stderr");
        }
    }
    buf
}
