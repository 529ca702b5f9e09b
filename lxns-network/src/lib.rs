//! Network plumbing for lxns namespaces
//!
//! This crate provides both halves of namespace networking:
//! - the host side, run by the privileged `lxns-network-helper` binary,
//!   which creates a veth pair and hands one end to the namespace
//! - the namespace side, run by the child before exec, which brings the
//!   interfaces up and assigns the configured address

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

pub mod attach;
pub mod link;
pub mod namespace;

pub use attach::{BRIDGE_NAME, NAMESPACE_IFACE, NetworkAttacher, host_iface_name};
pub use link::{LinkCall, LinkOps, MockLinks, NetlinkLinks};
pub use namespace::{configure_interfaces, configure_namespace_network};
