use std::collections::HashSet;
use std::fmt::Display;
use std::str::FromStr;
use std::time::UNIX_EPOCH;

use defguard_wireguard_rs::host::{Host, Peer as DgPeer};
use defguard_wireguard_rs::key::Key;
use defguard_wireguard_rs::net::IpAddrMask;
use defguard_wireguard_rs::{InterfaceConfiguration, Kernel, WGApi, WireguardInterfaceApi};
use tracing::{debug, warn};

use crate::device::{DeviceConfig, DeviceController, DeviceStatus, PeerConfig, PeerStatus};
use crate::error::DeviceError;
use crate::keys::{PresharedKey, PrivateKey, PublicKey, KEY_SIZE};
use crate::types::{AllowedIp, Endpoint};

/// Device controller backed by the kernel WireGuard netlink API.
///
/// A fresh handle is opened per call, so an interface renamed through the
/// kernel gateway is picked up under its new name.
#[derive(Clone, Copy, Debug, Default)]
pub struct NetlinkDevice;

impl NetlinkDevice {
    /// Creates a controller for the current network namespace.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn rejected(device: &str, operation: &str, e: impl Display) -> DeviceError {
    DeviceError::Rejected {
        device: device.to_string(),
        reason: format!("{operation}: {e}"),
    }
}

fn open(interface: &str) -> Result<WGApi<Kernel>, DeviceError> {
    WGApi::<Kernel>::new(interface.to_string()).map_err(|e| rejected(interface, "open", e))
}

fn to_key(bytes: &[u8; KEY_SIZE]) -> Result<Key, DeviceError> {
    Key::try_from(bytes.as_slice()).map_err(|e| DeviceError::Parse(format!("key: {e}")))
}

fn to_mask(ip: &AllowedIp) -> Result<IpAddrMask, DeviceError> {
    IpAddrMask::from_str(&ip.to_cidr())
        .map_err(|e| DeviceError::Parse(format!("{}: {e}", ip.to_cidr())))
}

fn from_mask(mask: &IpAddrMask) -> Result<AllowedIp, DeviceError> {
    AllowedIp::from_cidr(&mask.to_string()).map_err(|e| DeviceError::Parse(e.to_string()))
}

fn host_port(host: &Host) -> u16 {
    u16::try_from(host.listen_port).unwrap_or(0)
}

/// Applies one peer directive on top of the peer's current kernel entry.
///
/// Allowed IPs are merged into the current list unless the directive
/// replaces them; the merged list is always sent whole.
fn dg_peer(peer: &PeerConfig, current: Option<&DgPeer>) -> Result<DgPeer, DeviceError> {
    let mut out = match current {
        Some(existing) => existing.clone(),
        None => DgPeer::new(to_key(peer.public_key.as_bytes())?),
    };
    if let Some(psk) = &peer.preshared_key {
        out.preshared_key = Some(to_key(psk.as_bytes())?);
    }
    if let Some(endpoint) = &peer.endpoint {
        out.endpoint = Some(*endpoint.address());
    }
    if let Some(keepalive) = peer.persistent_keepalive {
        out.persistent_keepalive_interval = Some(keepalive);
    }

    let masks = peer
        .allowed_ips
        .iter()
        .map(to_mask)
        .collect::<Result<Vec<_>, _>>()?;
    if peer.replace_allowed_ips {
        out.allowed_ips = masks;
    } else {
        for mask in masks {
            if !out.allowed_ips.contains(&mask) {
                out.allowed_ips.push(mask);
            }
        }
    }
    Ok(out)
}

fn peer_status(peer: &DgPeer) -> Result<PeerStatus, DeviceError> {
    Ok(PeerStatus {
        public_key: PublicKey::from_bytes_array(peer.public_key.as_array()),
        preshared_key: peer
            .preshared_key
            .as_ref()
            .map(Key::as_array)
            .filter(|bytes| *bytes != [0; KEY_SIZE])
            .map(PresharedKey::from_bytes_array),
        endpoint: peer.endpoint.map(Endpoint::new),
        allowed_ips: peer
            .allowed_ips
            .iter()
            .map(from_mask)
            .collect::<Result<Vec<_>, _>>()?,
        persistent_keepalive: peer.persistent_keepalive_interval.filter(|k| *k != 0),
        last_handshake: peer
            .last_handshake
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .filter(|secs| *secs != 0),
        rx_bytes: peer.rx_bytes,
        tx_bytes: peer.tx_bytes,
    })
}

fn device_status(interface: &str, host: &Host) -> Result<DeviceStatus, DeviceError> {
    let private_key = host
        .private_key
        .as_ref()
        .map(|k| PrivateKey::from_bytes_array(k.as_array()));
    let public_key = private_key.as_ref().map(PrivateKey::public_key);
    let mut peers = host
        .peers
        .values()
        .map(peer_status)
        .collect::<Result<Vec<_>, _>>()?;
    peers.sort_by_key(|p| p.public_key);

    Ok(DeviceStatus {
        name: interface.to_string(),
        private_key,
        public_key,
        listen_port: host_port(host),
        firewall_mark: 0,
        peers,
    })
}

impl DeviceController for NetlinkDevice {
    async fn configure_device(&self, interface: &str, config: &DeviceConfig) -> Result<(), DeviceError> {
        let api = open(interface)?;
        let host = api
            .read_interface_data()
            .map_err(|e| rejected(interface, "read_interface_data", e))?;

        let mut remaining: Vec<&DgPeer> = host.peers.values().collect();
        if config.replace_peers {
            let listed: HashSet<PublicKey> = config.peers.iter().map(|p| p.public_key).collect();
            let mut kept = Vec::with_capacity(remaining.len());
            for peer in remaining {
                let public_key = PublicKey::from_bytes_array(peer.public_key.as_array());
                if listed.contains(&public_key) {
                    kept.push(peer);
                } else {
                    api.remove_peer(&peer.public_key)
                        .map_err(|e| rejected(interface, "remove_peer", e))?;
                    debug!(interface, peer = %public_key, "stale peer removed");
                }
            }
            remaining = kept;
        }

        if config.has_device_fields() {
            if config.firewall_mark.is_some_and(|mark| mark != 0) {
                warn!(interface, "firewall mark is not supported by the netlink backend, ignored");
            }
            let prvkey = match (&config.private_key, &host.private_key) {
                (Some(key), _) => key.to_base64(),
                (None, Some(current)) => PrivateKey::from_bytes_array(current.as_array()).to_base64(),
                (None, None) => {
                    return Err(rejected(interface, "configure_interface", "device has no private key"));
                }
            };
            let settings = InterfaceConfiguration {
                name: interface.to_string(),
                prvkey,
                addresses: Vec::new(),
                port: config.listen_port.unwrap_or_else(|| host_port(&host)),
                peers: remaining.iter().map(|p| (*p).clone()).collect(),
                mtu: None,
            };
            api.configure_interface(&settings)
                .map_err(|e| rejected(interface, "configure_interface", e))?;
            debug!(interface, "device settings applied");
        }

        for peer in &config.peers {
            let key = to_key(peer.public_key.as_bytes())?;
            let current = host.peers.get(&key);
            if peer.remove {
                if current.is_some() {
                    api.remove_peer(&key)
                        .map_err(|e| rejected(interface, "remove_peer", e))?;
                } else {
                    debug!(interface, peer = %peer.public_key, "peer already absent");
                }
                continue;
            }
            api.configure_peer(&dg_peer(peer, current)?)
                .map_err(|e| rejected(interface, "configure_peer", e))?;
        }
        Ok(())
    }

    async fn device(&self, interface: &str) -> Result<DeviceStatus, DeviceError> {
        let host = open(interface)?
            .read_interface_data()
            .map_err(|e| rejected(interface, "read_interface_data", e))?;
        device_status(interface, &host)
    }
}
