//! lxns core - shared types, errors and lifecycle events
//!
//! This crate provides the abstractions used by both stages of the launcher
//! and by the network helper.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod events;
pub mod types;

pub use error::{Error, Result};
pub use events::LaunchEvent;
pub use types::{InstanceId, ProcessId};
