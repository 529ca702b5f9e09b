//! Interface bring-up from inside a new network namespace

use ipnetwork::Ipv4Network;
use lxns_core::{Error, Result};
use tracing::{debug, info};

use crate::attach::NAMESPACE_IFACE;
use crate::link::{LinkOps, NetlinkLinks};

/// Loopback interface name
pub const LOOPBACK_IFACE: &str = "lo";

/// Bring loopback up and, with an address, configure the veth end
///
/// # Errors
/// Returns error if an interface is missing or a netlink call fails
pub async fn configure_interfaces<L: LinkOps>(
    links: &L,
    address: Option<Ipv4Network>,
) -> Result<()> {
    let lo = links.index(LOOPBACK_IFACE).await?;
    links.set_up(lo).await?;
    debug!("Loopback up");

    let Some(address) = address else {
        info!("No network address configured, loopback only");
        return Ok(());
    };

    let veth = links.index(NAMESPACE_IFACE).await?;
    links.add_address(veth, address).await?;
    links.set_up(veth).await?;

    info!(iface = NAMESPACE_IFACE, address = %address, "Namespace interface up");
    Ok(())
}

/// Blocking wrapper around [`configure_interfaces`] using netlink
///
/// # Errors
/// Returns error if the runtime cannot be built or configuration fails
pub fn configure_namespace_network(address: Option<Ipv4Network>) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::network(format!("failed to start netlink runtime: {e}")))?;

    runtime.block_on(async {
        let links = NetlinkLinks::connect()?;
        configure_interfaces(&links, address).await
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{LinkCall, MockLinks};

    #[tokio::test]
    async fn test_loopback_only() {
        let links = MockLinks::with_links(&["lo"]);
        configure_interfaces(&links, None).await.unwrap();
        assert_eq!(links.calls().await, [LinkCall::SetUp("lo".into())]);
    }

    #[tokio::test]
    async fn test_with_address() {
        let links = MockLinks::with_links(&["lo", "veth0"]);
        let address: Ipv4Network = "10.0.0.2/24".parse().unwrap();

        configure_interfaces(&links, Some(address)).await.unwrap();

        assert_eq!(
            links.calls().await,
            [
                LinkCall::SetUp("lo".into()),
                LinkCall::AddAddress("veth0".into(), address),
                LinkCall::SetUp("veth0".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_veth_is_fatal() {
        let links = MockLinks::with_links(&["lo"]);
        let address: Ipv4Network = "10.0.0.2/24".parse().unwrap();

        let result = configure_interfaces(&links, Some(address)).await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("veth0"));
    }

    #[tokio::test]
    async fn test_missing_veth_ignored_without_address() {
        let links = MockLinks::with_links(&["lo"]);
        assert!(configure_interfaces(&links, None).await.is_ok());
    }
}
