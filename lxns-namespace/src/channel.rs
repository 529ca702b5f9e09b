//! Control channel between the parent and the child
//!
//! The parent writes the JSON-encoded [`NamespaceConfig`] into a pipe and
//! closes it. The read end is installed at descriptor [`CONTROL_FD`] in the
//! child; that slot number is the only contract between the two processes.

#![allow(unsafe_code)]

use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::os::unix::fs::FileTypeExt;

use lxns_core::{Error, Result};
use nix::fcntl::OFlag;

use crate::config::NamespaceConfig;

/// Descriptor slot of the control channel read end in the child
pub const CONTROL_FD: RawFd = 3;

/// Create the control pipe
///
/// Both ends are close-on-exec; the launcher moves the read end to
/// [`CONTROL_FD`] in the child, which is the only copy that survives exec.
///
/// # Errors
/// Returns [`Error::Channel`] if the pipe cannot be created
pub fn control_channel() -> Result<(OwnedFd, ControlSender)> {
    let (read, write) = nix::unistd::pipe2(OFlag::O_CLOEXEC)
        .map_err(|e| Error::channel(format!("failed to create control pipe: {e}")))?;

    Ok((
        read,
        ControlSender {
            file: File::from(write),
        },
    ))
}

/// Write end, owned by the parent
#[derive(Debug)]
pub struct ControlSender {
    file: File,
}

impl ControlSender {
    /// Send the configuration and close the channel
    ///
    /// Returns the payload size in bytes.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if the configuration cannot be
    /// encoded, [`Error::Channel`] if the write fails
    pub fn send(mut self, config: &NamespaceConfig) -> Result<usize> {
        let payload = config.to_json()?;

        self.file
            .write_all(payload.as_bytes())
            .map_err(|e| Error::channel(format!("failed to send configuration: {e}")))?;

        tracing::debug!(bytes = payload.len(), "Configuration sent");
        Ok(payload.len())
    }
}

/// Read end, owned by the child
#[derive(Debug)]
pub struct ControlReceiver {
    file: File,
}

impl ControlReceiver {
    /// Take ownership of the descriptor inherited at [`CONTROL_FD`]
    ///
    /// # Errors
    /// Returns [`Error::Channel`] if the descriptor is missing or not a pipe
    pub fn inherited() -> Result<Self> {
        // SAFETY: F_GETFD only queries the descriptor table.
        if unsafe { libc::fcntl(CONTROL_FD, libc::F_GETFD) } == -1 {
            return Err(Error::channel(format!("descriptor {CONTROL_FD} is not open")));
        }

        // SAFETY: the descriptor is open and nothing else in this process
        // refers to it; the launcher reserves the slot for the channel.
        let fd = unsafe { OwnedFd::from_raw_fd(CONTROL_FD) };
        Self::from_fd(fd)
    }

    /// Wrap an owned descriptor, checking that it is a pipe
    ///
    /// # Errors
    /// Returns [`Error::Channel`] if the descriptor is not a pipe
    pub fn from_fd(fd: OwnedFd) -> Result<Self> {
        let file = File::from(fd);
        let metadata = file
            .metadata()
            .map_err(|e| Error::channel(format!("cannot inspect control descriptor: {e}")))?;

        if !metadata.file_type().is_fifo() {
            return Err(Error::channel("control descriptor is not a pipe"));
        }

        Ok(Self { file })
    }

    /// Read the configuration, blocking until the parent closes its end
    ///
    /// # Errors
    /// Returns [`Error::Channel`] if the read fails, the channel closes with
    /// no data, or the payload is not a configuration
    pub fn receive(mut self) -> Result<NamespaceConfig> {
        let mut payload = Vec::new();
        self.file
            .read_to_end(&mut payload)
            .map_err(|e| Error::channel(format!("failed to read configuration: {e}")))?;

        if payload.iter().all(u8::is_ascii_whitespace) {
            return Err(Error::channel("channel closed without configuration"));
        }

        tracing::debug!(bytes = payload.len(), "Configuration received");

        serde_json::from_slice(&payload)
            .map_err(|e| Error::channel(format!("invalid configuration payload: {e}")))
    }
}
