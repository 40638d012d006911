//! Tunnel device controller contract.
//!
//! A [`DeviceController`] pushes cryptographic configuration into a kernel
//! WireGuard device and reads its live state back. Peers are addressed by
//! public key; a [`PeerConfig`] either adds/updates or removes one.

use serde::{Deserialize, Serialize};

use crate::error::DeviceError;
use crate::keys::{PresharedKey, PrivateKey, PublicKey};
use crate::types::{AllowedIp, Endpoint};

/// Device-level and peer-level changes for one `configure_device` call.
///
/// Unset device fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceConfig {
    /// New private key.
    pub private_key: Option<PrivateKey>,
    /// New listen port.
    pub listen_port: Option<u16>,
    /// New firewall mark (`0` clears it).
    pub firewall_mark: Option<u32>,
    /// Remove every peer not listed in `peers`.
    pub replace_peers: bool,
    /// Peer changes, applied in order.
    pub peers: Vec<PeerConfig>,
}

impl DeviceConfig {
    /// Creates an empty configuration that changes nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the private key.
    #[must_use]
    pub fn with_private_key(mut self, key: PrivateKey) -> Self {
        self.private_key = Some(key);
        self
    }

    /// Sets the listen port.
    #[must_use]
    pub fn with_listen_port(mut self, port: u16) -> Self {
        self.listen_port = Some(port);
        self
    }

    /// Sets the firewall mark.
    #[must_use]
    pub fn with_firewall_mark(mut self, mark: u32) -> Self {
        self.firewall_mark = Some(mark);
        self
    }

    /// Adds a peer change.
    #[must_use]
    pub fn with_peer(mut self, peer: PeerConfig) -> Self {
        self.peers.push(peer);
        self
    }

    /// Returns true if the configuration touches device-level fields.
    #[must_use]
    pub fn has_device_fields(&self) -> bool {
        self.private_key.is_some() || self.listen_port.is_some() || self.firewall_mark.is_some()
    }
}

/// Configuration for a single `WireGuard` peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerConfig {
    /// The peer's public key.
    pub public_key: PublicKey,
    /// Remove the peer instead of adding or updating it.
    pub remove: bool,
    /// Optional preshared key for additional security.
    pub preshared_key: Option<PresharedKey>,
    /// The peer's endpoint (IP:port).
    pub endpoint: Option<Endpoint>,
    /// Persistent keepalive interval in seconds.
    pub persistent_keepalive: Option<u16>,
    /// Replace the peer's allowed IPs instead of merging into them.
    pub replace_allowed_ips: bool,
    /// IP addresses/networks this peer may send traffic from.
    pub allowed_ips: Vec<AllowedIp>,
}

impl PeerConfig {
    /// Creates an add-or-update directive for the given public key.
    #[must_use]
    pub fn new(public_key: PublicKey) -> Self {
        Self {
            public_key,
            remove: false,
            preshared_key: None,
            endpoint: None,
            persistent_keepalive: None,
            replace_allowed_ips: false,
            allowed_ips: Vec::new(),
        }
    }

    /// Creates a removal directive for the given public key.
    #[must_use]
    pub fn remove(public_key: PublicKey) -> Self {
        Self {
            remove: true,
            ..Self::new(public_key)
        }
    }

    /// Sets the preshared key.
    #[must_use]
    pub fn with_preshared_key(mut self, key: PresharedKey) -> Self {
        self.preshared_key = Some(key);
        self
    }

    /// Sets the endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Sets the persistent keepalive interval.
    #[must_use]
    pub fn with_persistent_keepalive(mut self, seconds: u16) -> Self {
        self.persistent_keepalive = Some(seconds);
        self
    }

    /// Adds an allowed IP.
    #[must_use]
    pub fn with_allowed_ip(mut self, ip: AllowedIp) -> Self {
        self.allowed_ips.push(ip);
        self
    }

    /// Replaces the allowed-IP set on the device rather than merging.
    #[must_use]
    pub fn replacing_allowed_ips(mut self) -> Self {
        self.replace_allowed_ips = true;
        self
    }
}

/// Live state of a `WireGuard` device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    /// Device name.
    pub name: String,
    /// Configured private key, if any.
    #[serde(skip_serializing)]
    pub private_key: Option<PrivateKey>,
    /// Public key derived from the private key.
    pub public_key: Option<PublicKey>,
    /// Listen port (`0` when unset).
    pub listen_port: u16,
    /// Firewall mark (`0` when unset).
    pub firewall_mark: u32,
    /// Status of all peers.
    pub peers: Vec<PeerStatus>,
}

impl DeviceStatus {
    /// Finds a peer by public key.
    #[must_use]
    pub fn peer(&self, public_key: &PublicKey) -> Option<&PeerStatus> {
        self.peers.iter().find(|p| &p.public_key == public_key)
    }
}

/// Live state of a `WireGuard` peer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerStatus {
    /// The peer's public key.
    pub public_key: PublicKey,
    /// Preshared key, if set.
    #[serde(skip_serializing)]
    pub preshared_key: Option<PresharedKey>,
    /// Current endpoint (if known).
    pub endpoint: Option<Endpoint>,
    /// Configured allowed IPs.
    pub allowed_ips: Vec<AllowedIp>,
    /// Persistent keepalive interval in seconds.
    pub persistent_keepalive: Option<u16>,
    /// Unix timestamp of last successful handshake.
    pub last_handshake: Option<u64>,
    /// Bytes received from this peer.
    pub rx_bytes: u64,
    /// Bytes transmitted to this peer.
    pub tx_bytes: u64,
}

/// Trait for configuring kernel `WireGuard` devices.
#[allow(async_fn_in_trait)]
pub trait DeviceController {
    /// Applies `config` to the device named `interface`.
    async fn configure_device(&self, interface: &str, config: &DeviceConfig) -> Result<(), DeviceError>;

    /// Reads the live state of the device named `interface`.
    async fn device(&self, interface: &str) -> Result<DeviceStatus, DeviceError>;

    /// Releases the controller handle.
    async fn close(&self) -> Result<(), DeviceError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_keypair;

    #[test]
    fn empty_config_has_no_device_fields() {
        assert!(!DeviceConfig::new().has_device_fields());
        assert!(DeviceConfig::new().with_listen_port(51820).has_device_fields());
    }

    #[test]
    fn remove_directive_carries_only_key() {
        let (_, public) = generate_keypair();
        let peer = PeerConfig::remove(public);
        assert!(peer.remove);
        assert!(peer.allowed_ips.is_empty());
        assert_eq!(peer.public_key, public);
    }

    #[test]
    fn device_status_serialization_omits_secrets() {
        let (private, public) = generate_keypair();
        let status = DeviceStatus {
            name: "wg0".into(),
            private_key: Some(private.clone()),
            public_key: Some(public),
            listen_port: 51820,
            firewall_mark: 0,
            peers: Vec::new(),
        };
        let json = serde_json::to_string(&status).expect("serialize");
        assert!(!json.contains(&private.to_base64()));
        assert!(json.contains(&public.to_base64()));
    }
}
