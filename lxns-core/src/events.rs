//! Launch lifecycle events with structured tracing

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{InstanceId, ProcessId};

/// Events emitted by the parent while it drives one instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LaunchEvent {
    /// Child cloned into its new namespaces
    Spawned {
        /// Instance ID
        id: InstanceId,
        /// Child PID as seen from the parent
        pid: ProcessId,
    },

    /// Network helper attached the veth pair
    NetworkAttached {
        /// Instance ID
        id: InstanceId,
        /// Child PID
        pid: ProcessId,
    },

    /// Configuration written to the control channel
    ConfigDelivered {
        /// Instance ID
        id: InstanceId,
        /// Payload size in bytes
        bytes: usize,
    },

    /// Child exited
    Exited {
        /// Instance ID
        id: InstanceId,
        /// Exit code (128 + signal when killed by a signal)
        exit_code: i32,
    },

    /// Launch aborted
    Failed {
        /// Instance ID
        id: InstanceId,
        /// Error message
        message: String,
    },
}

impl LaunchEvent {
    /// Get the instance ID from any event
    #[must_use]
    pub const fn instance_id(&self) -> &InstanceId {
        match self {
            Self::Spawned { id, .. }
            | Self::NetworkAttached { id, .. }
            | Self::ConfigDelivered { id, .. }
            | Self::Exited { id, .. }
            | Self::Failed { id, .. } => id,
        }
    }

    /// Emit structured tracing event
    pub fn emit_trace(&self) {
        match self {
            Self::Spawned { id, pid } => {
                tracing::info!(
                    id = %id,
                    pid = pid.as_raw(),
                    event = "spawned",
                    "Namespace instance spawned"
                );
            }
            Self::NetworkAttached { id, pid } => {
                tracing::info!(
                    id = %id,
                    pid = pid.as_raw(),
                    event = "network_attached",
                    "Network interface attached"
                );
            }
            Self::ConfigDelivered { id, bytes } => {
                tracing::debug!(
                    id = %id,
                    bytes,
                    event = "config_delivered",
                    "Configuration delivered"
                );
            }
            Self::Exited { id, exit_code } => {
                if *exit_code == 0 {
                    tracing::info!(id = %id, exit_code, event = "exited", "Instance exited");
                } else {
                    tracing::warn!(id = %id, exit_code, event = "exited", "Instance exited");
                }
            }
            Self::Failed { id, message } => {
                tracing::error!(id = %id, message = %message, event = "failed", "Launch failed");
            }
        }
    }
}

impl fmt::Display for LaunchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawned { id, pid } => write!(f, "Instance {id} spawned as pid {pid}"),
            Self::NetworkAttached { id, pid } => {
                write!(f, "Instance {id} network attached (pid {pid})")
            }
            Self::ConfigDelivered { id, bytes } => {
                write!(f, "Instance {id} received {bytes} bytes of configuration")
            }
            Self::Exited { id, exit_code } => {
                write!(f, "Instance {id} exited with code {exit_code}")
            }
            Self::Failed { id, message } => write!(f, "Instance {id} failed: {message}"),
        }
    }
}
