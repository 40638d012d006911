//! Kernel interface gateway contract.
//!
//! A [`KernelGateway`] manipulates network interfaces, addresses and routes
//! inside one network namespace. Interfaces are addressed by name.

use std::fmt;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::error::KernelError;

/// Kind of a kernel network interface.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    /// A WireGuard tunnel interface.
    WireGuard,
    /// A dummy interface.
    Dummy,
    /// A bridge.
    Bridge,
    /// Anything else, by kernel kind name (empty for physical devices).
    Other(String),
}

impl LinkKind {
    /// Parses a kernel `info_kind` string.
    #[must_use]
    pub fn from_kind(kind: &str) -> Self {
        match kind {
            "wireguard" => Self::WireGuard,
            "dummy" => Self::Dummy,
            "bridge" => Self::Bridge,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns the kernel `info_kind` string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::WireGuard => "wireguard",
            Self::Dummy => "dummy",
            Self::Bridge => "bridge",
            Self::Other(kind) => kind,
        }
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A kernel network interface as reported by the gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkInfo {
    /// Interface index.
    pub index: u32,
    /// Interface name.
    pub name: String,
    /// Interface kind.
    pub kind: LinkKind,
    /// Whether the interface is administratively up.
    pub up: bool,
    /// Interface MTU.
    pub mtu: u32,
}

/// Scope of a route.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteScope {
    /// Destination is directly reachable through the interface.
    #[default]
    Link,
    /// Destination is reachable through a gateway.
    Universe,
}

impl RouteScope {
    /// Returns the iproute2 scope name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Link => "link",
            Self::Universe => "global",
        }
    }
}

/// A route directing a destination prefix onto an interface.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Route {
    /// Destination prefix (host bits cleared).
    pub destination: IpNet,
    /// Output interface name.
    pub link: String,
    /// Route scope.
    pub scope: RouteScope,
}

impl Route {
    /// Creates a link-scoped route for `destination` through `link`.
    #[must_use]
    pub fn link_scoped(destination: IpNet, link: impl Into<String>) -> Self {
        Self {
            destination: destination.trunc(),
            link: link.into(),
            scope: RouteScope::Link,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} dev {} scope {}",
            self.destination,
            self.link,
            self.scope.as_str()
        )
    }
}

/// Trait for manipulating kernel interfaces in one network namespace.
#[allow(async_fn_in_trait)]
pub trait KernelGateway {
    /// Creates an interface of the given kind.
    async fn link_add(&self, name: &str, kind: LinkKind) -> Result<(), KernelError>;

    /// Deletes an interface.
    async fn link_del(&self, name: &str) -> Result<(), KernelError>;

    /// Looks up an interface; `Ok(None)` if no interface has this name.
    async fn link_by_name(&self, name: &str) -> Result<Option<LinkInfo>, KernelError>;

    /// Sets an interface administratively up.
    async fn link_set_up(&self, name: &str) -> Result<(), KernelError>;

    /// Sets an interface administratively down.
    async fn link_set_down(&self, name: &str) -> Result<(), KernelError>;

    /// Sets the interface MTU.
    async fn link_set_mtu(&self, name: &str, mtu: u32) -> Result<(), KernelError>;

    /// Renames an interface. Renaming to the current name is a no-op.
    async fn link_set_name(&self, name: &str, new_name: &str) -> Result<(), KernelError>;

    /// Lists the addresses assigned to an interface.
    async fn addr_list(&self, name: &str) -> Result<Vec<IpNet>, KernelError>;

    /// Assigns an address to an interface.
    async fn addr_add(&self, name: &str, addr: IpNet) -> Result<(), KernelError>;

    /// Removes an address from an interface.
    async fn addr_del(&self, name: &str, addr: IpNet) -> Result<(), KernelError>;

    /// Installs a route.
    async fn route_add(&self, route: &Route) -> Result<(), KernelError>;

    /// Removes a route.
    async fn route_del(&self, route: &Route) -> Result<(), KernelError>;

    /// Looks up the main-table route for exactly `destination`, whichever
    /// interface it goes through; `Ok(None)` if there is none.
    async fn route_get(&self, destination: IpNet) -> Result<Option<Route>, KernelError>;

    /// Releases the namespace handle.
    async fn close(&self) -> Result<(), KernelError> {
        Ok(())
    }
}
