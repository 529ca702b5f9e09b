//! Namespace launching for lxns
//!
//! A launch runs in two processes built from the same binary:
//! - the launcher ([`Launcher`]) clones a child into new namespaces, writes
//!   its ID maps, runs the network helper and sends it the configuration
//! - the child, re-executed with [`INSTANCE_SENTINEL`] as argv[0], reads the
//!   configuration from descriptor 3 and finishes the setup
//!   ([`run_in_namespace`]) before executing the target program
//!
//! Supported namespaces: IPC, network, mount, PID, user and UTS.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod channel;
pub mod config;
pub mod helper;
pub mod invocation;
pub mod launcher;
pub mod rootfs;
pub mod setup;

pub use channel::{CONTROL_FD, ControlReceiver, ControlSender, control_channel};
pub use config::{ConfigOverrides, Feature, FeatureSet, IdMapTable, IdMapping, NamespaceConfig};
pub use helper::{DEFAULT_ATTACH_TIMEOUT, NetworkHelper};
pub use invocation::{INSTANCE_ID_ENV, INSTANCE_SENTINEL, Invocation};
pub use launcher::{LaunchOptions, Launcher};
pub use rootfs::{FilesystemPlan, MountOp, Mounter, RecordingMounter, SystemMounter, pivot_into};
pub use setup::run_in_namespace;
