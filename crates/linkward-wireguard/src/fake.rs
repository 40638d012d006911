//! In-memory network namespace for testing.
//!
//! [`FakeNamespace`] implements both [`KernelGateway`] and
//! [`DeviceController`] over one shared state, so deleting or renaming a
//! WireGuard interface takes its device configuration with it, and bringing
//! an interface down flushes its routes the way the kernel does.

use std::collections::BTreeMap;
use std::sync::Arc;

use ipnet::IpNet;
use tokio::sync::RwLock;

use crate::device::{DeviceConfig, DeviceController, DeviceStatus, PeerConfig, PeerStatus};
use crate::error::{DeviceError, KernelError};
use crate::kernel::{KernelGateway, LinkInfo, LinkKind, Route};
use crate::keys::{PresharedKey, PrivateKey, PublicKey};
use crate::types::{AllowedIp, Endpoint};

const DEFAULT_MTU: u32 = 1420;

/// Operations of the fake that can be made to fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FakeOp {
    /// [`KernelGateway::link_add`].
    LinkAdd,
    /// [`KernelGateway::link_del`].
    LinkDel,
    /// [`KernelGateway::link_set_up`].
    LinkSetUp,
    /// [`KernelGateway::link_set_down`].
    LinkSetDown,
    /// [`KernelGateway::link_set_mtu`].
    LinkSetMtu,
    /// [`KernelGateway::link_set_name`].
    LinkSetName,
    /// [`KernelGateway::addr_add`].
    AddrAdd,
    /// [`KernelGateway::addr_del`].
    AddrDel,
    /// [`KernelGateway::route_add`].
    RouteAdd,
    /// [`KernelGateway::route_del`].
    RouteDel,
    /// [`DeviceController::configure_device`].
    ConfigureDevice,
}

impl FakeOp {
    fn name(self) -> &'static str {
        match self {
            Self::LinkAdd => "link_add",
            Self::LinkDel => "link_del",
            Self::LinkSetUp => "link_set_up",
            Self::LinkSetDown => "link_set_down",
            Self::LinkSetMtu => "link_set_mtu",
            Self::LinkSetName => "link_set_name",
            Self::AddrAdd => "addr_add",
            Self::AddrDel => "addr_del",
            Self::RouteAdd => "route_add",
            Self::RouteDel => "route_del",
            Self::ConfigureDevice => "configure_device",
        }
    }
}

#[derive(Clone, Debug)]
struct Fault {
    op: FakeOp,
    target: Option<String>,
}

#[derive(Clone, Debug)]
struct FakePeer {
    public_key: PublicKey,
    preshared_key: Option<PresharedKey>,
    endpoint: Option<Endpoint>,
    persistent_keepalive: Option<u16>,
    allowed_ips: Vec<AllowedIp>,
}

#[derive(Clone, Debug, Default)]
struct FakeDevice {
    private_key: Option<PrivateKey>,
    listen_port: u16,
    firewall_mark: u32,
    peers: Vec<FakePeer>,
}

#[derive(Clone, Debug)]
struct FakeLink {
    index: u32,
    kind: LinkKind,
    up: bool,
    mtu: u32,
    addresses: Vec<IpNet>,
    device: Option<FakeDevice>,
}

#[derive(Debug, Default)]
struct NamespaceState {
    links: BTreeMap<String, FakeLink>,
    routes: Vec<Route>,
    next_index: u32,
    faults: Vec<Fault>,
}

impl NamespaceState {
    fn check(&self, op: FakeOp, target: &str) -> Result<(), KernelError> {
        let hit = self
            .faults
            .iter()
            .any(|f| f.op == op && f.target.as_deref().is_none_or(|t| t == target));
        if hit {
            return Err(KernelError::Rejected {
                operation: op.name(),
                reason: format!("injected failure for {target}"),
            });
        }
        Ok(())
    }

    fn link_mut(&mut self, name: &str) -> Result<&mut FakeLink, KernelError> {
        self.links
            .get_mut(name)
            .ok_or_else(|| KernelError::LinkNotFound(name.to_string()))
    }

    fn flush_routes(&mut self, name: &str) {
        self.routes.retain(|r| r.link != name);
    }
}

/// A fake network namespace holding interfaces, routes and WireGuard devices.
#[derive(Clone, Default)]
pub struct FakeNamespace {
    state: Arc<RwLock<NamespaceState>>,
}

impl FakeNamespace {
    /// Creates an empty namespace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later call of `op` fail.
    pub async fn fail_on(&self, op: FakeOp) {
        self.state.write().await.faults.push(Fault { op, target: None });
    }

    /// Makes later calls of `op` fail when they target `target`.
    ///
    /// The target is the interface name, or the route destination for
    /// route operations.
    pub async fn fail_on_target(&self, op: FakeOp, target: impl Into<String>) {
        self.state.write().await.faults.push(Fault {
            op,
            target: Some(target.into()),
        });
    }

    /// Removes all injected failures.
    pub async fn clear_failures(&self) {
        self.state.write().await.faults.clear();
    }

    /// Returns every installed route.
    pub async fn routes(&self) -> Vec<Route> {
        self.state.read().await.routes.clone()
    }

    /// Returns the installed routes leaving through `link`.
    pub async fn routes_via(&self, link: &str) -> Vec<Route> {
        self.state
            .read()
            .await
            .routes
            .iter()
            .filter(|r| r.link == link)
            .cloned()
            .collect()
    }

    /// Returns the names of all interfaces.
    pub async fn link_names(&self) -> Vec<String> {
        self.state.read().await.links.keys().cloned().collect()
    }
}

impl KernelGateway for FakeNamespace {
    async fn link_add(&self, name: &str, kind: LinkKind) -> Result<(), KernelError> {
        let mut state = self.state.write().await;
        state.check(FakeOp::LinkAdd, name)?;
        if state.links.contains_key(name) {
            return Err(KernelError::LinkExists(name.to_string()));
        }
        state.next_index += 1;
        let device = (kind == LinkKind::WireGuard).then(FakeDevice::default);
        let link = FakeLink {
            index: state.next_index,
            kind,
            up: false,
            mtu: DEFAULT_MTU,
            addresses: Vec::new(),
            device,
        };
        state.links.insert(name.to_string(), link);
        Ok(())
    }

    async fn link_del(&self, name: &str) -> Result<(), KernelError> {
        let mut state = self.state.write().await;
        state.check(FakeOp::LinkDel, name)?;
        if state.links.remove(name).is_none() {
            return Err(KernelError::LinkNotFound(name.to_string()));
        }
        state.flush_routes(name);
        Ok(())
    }

    async fn link_by_name(&self, name: &str) -> Result<Option<LinkInfo>, KernelError> {
        let state = self.state.read().await;
        Ok(state.links.get(name).map(|link| LinkInfo {
            index: link.index,
            name: name.to_string(),
            kind: link.kind.clone(),
            up: link.up,
            mtu: link.mtu,
        }))
    }

    async fn link_set_up(&self, name: &str) -> Result<(), KernelError> {
        let mut state = self.state.write().await;
        state.check(FakeOp::LinkSetUp, name)?;
        state.link_mut(name)?.up = true;
        Ok(())
    }

    async fn link_set_down(&self, name: &str) -> Result<(), KernelError> {
        let mut state = self.state.write().await;
        state.check(FakeOp::LinkSetDown, name)?;
        state.link_mut(name)?.up = false;
        state.flush_routes(name);
        Ok(())
    }

    async fn link_set_mtu(&self, name: &str, mtu: u32) -> Result<(), KernelError> {
        let mut state = self.state.write().await;
        state.check(FakeOp::LinkSetMtu, name)?;
        state.link_mut(name)?.mtu = mtu;
        Ok(())
    }

    async fn link_set_name(&self, name: &str, new_name: &str) -> Result<(), KernelError> {
        let mut state = self.state.write().await;
        state.check(FakeOp::LinkSetName, name)?;
        if name == new_name {
            return state.link_mut(name).map(|_| ());
        }
        if state.links.contains_key(new_name) {
            return Err(KernelError::LinkExists(new_name.to_string()));
        }
        let link = state
            .links
            .remove(name)
            .ok_or_else(|| KernelError::LinkNotFound(name.to_string()))?;
        state.links.insert(new_name.to_string(), link);
        for route in state.routes.iter_mut().filter(|r| r.link == name) {
            route.link = new_name.to_string();
        }
        Ok(())
    }

    async fn addr_list(&self, name: &str) -> Result<Vec<IpNet>, KernelError> {
        let state = self.state.read().await;
        state
            .links
            .get(name)
            .map(|link| link.addresses.clone())
            .ok_or_else(|| KernelError::LinkNotFound(name.to_string()))
    }

    async fn addr_add(&self, name: &str, addr: IpNet) -> Result<(), KernelError> {
        let mut state = self.state.write().await;
        state.check(FakeOp::AddrAdd, name)?;
        let link = state.link_mut(name)?;
        if link.addresses.contains(&addr) {
            return Err(KernelError::AddressExists {
                link: name.to_string(),
                address: addr.to_string(),
            });
        }
        link.addresses.push(addr);
        Ok(())
    }

    async fn addr_del(&self, name: &str, addr: IpNet) -> Result<(), KernelError> {
        let mut state = self.state.write().await;
        state.check(FakeOp::AddrDel, name)?;
        let link = state.link_mut(name)?;
        let before = link.addresses.len();
        link.addresses.retain(|a| *a != addr);
        if link.addresses.len() == before {
            return Err(KernelError::AddressNotFound {
                link: name.to_string(),
                address: addr.to_string(),
            });
        }
        Ok(())
    }

    async fn route_add(&self, route: &Route) -> Result<(), KernelError> {
        let mut state = self.state.write().await;
        state.check(FakeOp::RouteAdd, &route.destination.to_string())?;
        let link = state
            .links
            .get(&route.link)
            .ok_or_else(|| KernelError::LinkNotFound(route.link.clone()))?;
        if !link.up {
            return Err(KernelError::Rejected {
                operation: "route_add",
                reason: format!("{} is down", route.link),
            });
        }
        if state.routes.iter().any(|r| r.destination == route.destination) {
            return Err(KernelError::RouteExists(route.to_string()));
        }
        state.routes.push(route.clone());
        Ok(())
    }

    async fn route_del(&self, route: &Route) -> Result<(), KernelError> {
        let mut state = self.state.write().await;
        state.check(FakeOp::RouteDel, &route.destination.to_string())?;
        let before = state.routes.len();
        state.routes.retain(|r| r != route);
        if state.routes.len() == before {
            return Err(KernelError::RouteNotFound(route.to_string()));
        }
        Ok(())
    }

    async fn route_get(&self, destination: IpNet) -> Result<Option<Route>, KernelError> {
        let destination = destination.trunc();
        let state = self.state.read().await;
        Ok(state.routes.iter().find(|r| r.destination == destination).cloned())
    }
}

fn apply_peer(device: &mut FakeDevice, peer: &PeerConfig) {
    let existing = device
        .peers
        .iter()
        .position(|p| p.public_key == peer.public_key);
    if peer.remove {
        if let Some(i) = existing {
            device.peers.remove(i);
        }
        return;
    }
    let index = existing.unwrap_or_else(|| {
        device.peers.push(FakePeer {
            public_key: peer.public_key,
            preshared_key: None,
            endpoint: None,
            persistent_keepalive: None,
            allowed_ips: Vec::new(),
        });
        device.peers.len() - 1
    });
    let entry = &mut device.peers[index];
    if let Some(psk) = &peer.preshared_key {
        entry.preshared_key = Some(psk.clone());
    }
    if let Some(endpoint) = peer.endpoint {
        entry.endpoint = Some(endpoint);
    }
    if let Some(keepalive) = peer.persistent_keepalive {
        entry.persistent_keepalive = (keepalive > 0).then_some(keepalive);
    }
    if peer.replace_allowed_ips {
        entry.allowed_ips.clear();
    }
    for ip in &peer.allowed_ips {
        if !entry.allowed_ips.contains(ip) {
            entry.allowed_ips.push(*ip);
        }
    }
}

impl DeviceController for FakeNamespace {
    async fn configure_device(&self, interface: &str, config: &DeviceConfig) -> Result<(), DeviceError> {
        let mut state = self.state.write().await;
        state
            .check(FakeOp::ConfigureDevice, interface)
            .map_err(|e| DeviceError::Rejected {
                device: interface.to_string(),
                reason: e.to_string(),
            })?;
        let device = state
            .links
            .get_mut(interface)
            .and_then(|link| link.device.as_mut())
            .ok_or_else(|| DeviceError::DeviceNotFound(interface.to_string()))?;

        if let Some(key) = &config.private_key {
            device.private_key = Some(key.clone());
        }
        if let Some(port) = config.listen_port {
            device.listen_port = port;
        }
        if let Some(mark) = config.firewall_mark {
            device.firewall_mark = mark;
        }
        if config.replace_peers {
            device
                .peers
                .retain(|p| config.peers.iter().any(|c| !c.remove && c.public_key == p.public_key));
        }
        for peer in &config.peers {
            apply_peer(device, peer);
        }
        Ok(())
    }

    async fn device(&self, interface: &str) -> Result<DeviceStatus, DeviceError> {
        let state = self.state.read().await;
        let device = state
            .links
            .get(interface)
            .and_then(|link| link.device.as_ref())
            .ok_or_else(|| DeviceError::DeviceNotFound(interface.to_string()))?;

        let peers = device
            .peers
            .iter()
            .map(|p| PeerStatus {
                public_key: p.public_key,
                preshared_key: p.preshared_key.clone(),
                endpoint: p.endpoint,
                allowed_ips: p.allowed_ips.clone(),
                persistent_keepalive: p.persistent_keepalive,
                last_handshake: None,
                rx_bytes: 0,
                tx_bytes: 0,
            })
            .collect();

        Ok(DeviceStatus {
            name: interface.to_string(),
            private_key: device.private_key.clone(),
            public_key: device.private_key.as_ref().map(PrivateKey::public_key),
            listen_port: device.listen_port,
            firewall_mark: device.firewall_mark,
            peers,
        })
    }
}
