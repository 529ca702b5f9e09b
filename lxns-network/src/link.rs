//! Link operations with pluggable backends

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::TryStreamExt;
use ipnetwork::Ipv4Network;
use lxns_core::{Error, ProcessId, Result};
use rtnetlink::{Handle, new_connection};
use tokio::sync::Mutex;
use tracing::debug;

/// Trait for the netlink operations the launcher needs
///
/// - [`NetlinkLinks`] - rtnetlink, used by the binaries
/// - [`MockLinks`] - in-memory, for tests
#[async_trait]
pub trait LinkOps: Send + Sync {
    /// Index of the interface with this name
    ///
    /// # Errors
    /// Returns error if no such interface exists
    async fn index(&self, name: &str) -> Result<u32>;

    /// Create a veth pair
    async fn create_veth(&self, name: &str, peer: &str) -> Result<()>;

    /// Enslave a link to a bridge
    async fn set_master(&self, index: u32, master: u32) -> Result<()>;

    /// Move a link into the network namespace of a process
    async fn move_to_netns(&self, index: u32, pid: ProcessId) -> Result<()>;

    /// Bring a link administratively up
    async fn set_up(&self, index: u32) -> Result<()>;

    /// Assign an IPv4 address
    async fn add_address(&self, index: u32, network: Ipv4Network) -> Result<()>;

    /// Delete a link (deleting either end removes a veth pair)
    async fn delete(&self, index: u32) -> Result<()>;
}

/// rtnetlink-backed link operations
#[derive(Clone)]
pub struct NetlinkLinks {
    handle: Handle,
}

impl NetlinkLinks {
    /// Open a netlink connection
    ///
    /// Must be called inside a tokio runtime: the connection task is spawned
    /// onto it.
    ///
    /// # Errors
    /// Returns error if the netlink socket cannot be opened
    pub fn connect() -> Result<Self> {
        let (connection, handle, _) = new_connection()
            .map_err(|e| Error::network(format!("failed to create netlink connection: {e}")))?;

        tokio::spawn(connection);
        debug!("Netlink connection established");

        Ok(Self { handle })
    }
}

#[async_trait]
impl LinkOps for NetlinkLinks {
    async fn index(&self, name: &str) -> Result<u32> {
        let mut links = self
            .handle
            .link()
            .get()
            .match_name(name.to_string())
            .execute();

        let link = links
            .try_next()
            .await
            .map_err(|e| Error::network(format!("failed to find interface {name}: {e}")))?
            .ok_or_else(|| Error::network(format!("interface {name} not found")))?;

        Ok(link.header.index)
    }

    async fn create_veth(&self, name: &str, peer: &str) -> Result<()> {
        self.handle
            .link()
            .add()
            .veth(name.to_string(), peer.to_string())
            .execute()
            .await
            .map_err(|e| {
                Error::network(format!("failed to create veth pair {name}<->{peer}: {e}"))
            })
    }

    async fn set_master(&self, index: u32, master: u32) -> Result<()> {
        self.handle
            .link()
            .set(index)
            .controller(master)
            .execute()
            .await
            .map_err(|e| {
                Error::network(format!("failed to attach link {index} to {master}: {e}"))
            })
    }

    async fn move_to_netns(&self, index: u32, pid: ProcessId) -> Result<()> {
        let raw = u32::try_from(pid.as_raw())
            .map_err(|_| Error::network(format!("invalid pid {pid}")))?;

        self.handle
            .link()
            .set(index)
            .setns_by_pid(raw)
            .execute()
            .await
            .map_err(|e| Error::network(format!("failed to move link {index} to pid {pid}: {e}")))
    }

    async fn set_up(&self, index: u32) -> Result<()> {
        self.handle
            .link()
            .set(index)
            .up()
            .execute()
            .await
            .map_err(|e| Error::network(format!("failed to bring link {index} up: {e}")))
    }

    async fn add_address(&self, index: u32, network: Ipv4Network) -> Result<()> {
        self.handle
            .address()
            .add(index, IpAddr::V4(network.ip()), network.prefix())
            .execute()
            .await
            .map_err(|e| Error::network(format!("failed to add {network} to link {index}: {e}")))
    }

    async fn delete(&self, index: u32) -> Result<()> {
        self.handle
            .link()
            .del(index)
            .execute()
            .await
            .map_err(|e| Error::network(format!("failed to delete link {index}: {e}")))
    }
}

/// A recorded call on [`MockLinks`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCall {
    /// `create_veth(name, peer)`
    CreateVeth(String, String),
    /// `set_master(link, master)` by name
    SetMaster(String, String),
    /// `move_to_netns(link, pid)`
    MoveToNetns(String, ProcessId),
    /// `set_up(link)`
    SetUp(String),
    /// `add_address(link, network)`
    AddAddress(String, Ipv4Network),
    /// `delete(link)`
    Delete(String),
}

/// Mock link backend (doesn't touch the kernel)
///
/// Keeps a table of interfaces in memory and records every mutating call.
/// A single operation can be made to fail with [`MockLinks::fail_on`].
#[derive(Clone, Default)]
pub struct MockLinks {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    links: HashMap<String, u32>,
    next_index: u32,
    calls: Vec<LinkCall>,
    fail_on: Option<&'static str>,
}

impl MockState {
    fn name_of(&self, index: u32) -> Result<String> {
        self.links
            .iter()
            .find(|(_, i)| **i == index)
            .map(|(name, _)| name.clone())
            .ok_or_else(|| Error::network(format!("no link with index {index}")))
    }

    fn check(&self, op: &'static str) -> Result<()> {
        if self.fail_on == Some(op) {
            return Err(Error::network(format!("mock failure in {op}")));
        }
        Ok(())
    }

    fn insert(&mut self, name: &str) {
        self.next_index += 1;
        self.links.insert(name.to_string(), self.next_index);
    }
}

impl MockLinks {
    /// Create a mock with the given interfaces present
    #[must_use]
    pub fn with_links(names: &[&str]) -> Self {
        let mut state = MockState::default();
        for name in names {
            state.insert(name);
        }
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Make one operation fail (`"create_veth"`, `"set_master"`,
    /// `"move_to_netns"`, `"set_up"`, `"add_address"`, `"delete"`)
    pub async fn fail_on(&self, op: &'static str) {
        self.state.lock().await.fail_on = Some(op);
    }

    /// Mutating calls made so far
    pub async fn calls(&self) -> Vec<LinkCall> {
        self.state.lock().await.calls.clone()
    }

    /// Check if an interface is present
    pub async fn has_link(&self, name: &str) -> bool {
        self.state.lock().await.links.contains_key(name)
    }
}

#[async_trait]
impl LinkOps for MockLinks {
    async fn index(&self, name: &str) -> Result<u32> {
        self.state
            .lock()
            .await
            .links
            .get(name)
            .copied()
            .ok_or_else(|| Error::network(format!("interface {name} not found")))
    }

    async fn create_veth(&self, name: &str, peer: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check("create_veth")?;
        state
            .calls
            .push(LinkCall::CreateVeth(name.to_string(), peer.to_string()));
        state.insert(name);
        state.insert(peer);
        Ok(())
    }

    async fn set_master(&self, index: u32, master: u32) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check("set_master")?;
        let call = LinkCall::SetMaster(state.name_of(index)?, state.name_of(master)?);
        state.calls.push(call);
        Ok(())
    }

    async fn move_to_netns(&self, index: u32, pid: ProcessId) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check("move_to_netns")?;
        let name = state.name_of(index)?;
        // The link leaves this namespace
        state.links.remove(&name);
        state.calls.push(LinkCall::MoveToNetns(name, pid));
        Ok(())
    }

    async fn set_up(&self, index: u32) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check("set_up")?;
        let call = LinkCall::SetUp(state.name_of(index)?);
        state.calls.push(call);
        Ok(())
    }

    async fn add_address(&self, index: u32, network: Ipv4Network) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check("add_address")?;
        let call = LinkCall::AddAddress(state.name_of(index)?, network);
        state.calls.push(call);
        Ok(())
    }

    async fn delete(&self, index: u32) -> Result<()> {
        let mut state = self.state.lock().await;
        state.check("delete")?;
        let name = state.name_of(index)?;
        state.links.remove(&name);
        state.calls.push(LinkCall::Delete(name));
        Ok(())
    }
}
