//! Host-side veth attachment
//!
//! Connects a freshly cloned network namespace to the host bridge:
//!
//! ```text
//!   host                         namespace of <pid>
//!   vbr0 ── veth<pid>  <────>  veth0
//! ```

use lxns_core::{ProcessId, Result};
use tracing::{debug, info, warn};

use crate::link::LinkOps;

/// Pre-existing host bridge the host-side ends are enslaved to
pub const BRIDGE_NAME: &str = "vbr0";

/// Name of the namespace-side end of the pair
pub const NAMESPACE_IFACE: &str = "veth0";

/// Name of the host-side end for a given target process
#[must_use]
pub fn host_iface_name(pid: ProcessId) -> String {
    format!("veth{pid}")
}

/// Attaches namespaces to the host bridge
pub struct NetworkAttacher<L> {
    links: L,
    bridge: String,
}

impl<L: LinkOps> NetworkAttacher<L> {
    /// Create an attacher using [`BRIDGE_NAME`]
    pub fn new(links: L) -> Self {
        Self {
            links,
            bridge: BRIDGE_NAME.to_string(),
        }
    }

    #[cfg(test)]
    #[must_use]
    fn with_bridge(mut self, bridge: impl Into<String>) -> Self {
        self.bridge = bridge.into();
        self
    }

    /// Create the veth pair for `pid` and wire it up
    ///
    /// Once the pair exists, any failure deletes it again before the error
    /// is returned.
    ///
    /// # Errors
    /// Returns error if the bridge is missing or any netlink step fails
    pub async fn attach(&self, pid: ProcessId) -> Result<()> {
        let bridge = self.links.index(&self.bridge).await?;
        let host_name = host_iface_name(pid);

        info!(pid = pid.as_raw(), host = %host_name, bridge = %self.bridge, "Creating veth pair");
        self.links.create_veth(&host_name, NAMESPACE_IFACE).await?;

        if let Err(e) = self.wire(pid, &host_name, bridge).await {
            self.rollback(&host_name).await;
            return Err(e);
        }

        info!(pid = pid.as_raw(), host = %host_name, "Namespace attached to bridge");
        Ok(())
    }

    async fn wire(&self, pid: ProcessId, host_name: &str, bridge: u32) -> Result<()> {
        let host = self.links.index(host_name).await?;
        let peer = self.links.index(NAMESPACE_IFACE).await?;

        self.links.set_master(host, bridge).await?;
        debug!(host = %host_name, "Host end enslaved to bridge");

        self.links.move_to_netns(peer, pid).await?;
        debug!(pid = pid.as_raw(), "Namespace end moved");

        self.links.set_up(host).await?;
        debug!(host = %host_name, "Host end up");

        Ok(())
    }

    async fn rollback(&self, host_name: &str) {
        warn!(host = %host_name, "Rolling back veth pair");

        let deleted = match self.links.index(host_name).await {
            Ok(index) => self.links.delete(index).await,
            Err(e) => Err(e),
        };

        if let Err(e) = deleted {
            warn!(host = %host_name, error = %e, "Failed to delete veth pair");
        }
    }
}
