//! Desired-state model for links and peers.

use std::net::IpAddr;

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use linkward_wireguard::{AllowedIp, Endpoint, PresharedKey, PrivateKey, PublicKey};
use serde::{Deserialize, Serialize};

/// Default link MTU.
pub const DEFAULT_MTU: u32 = 1420;

/// A virtual tunnel interface definition.
///
/// `enable` is the desired activation state. Whether the interface is
/// currently loaded in the kernel is never stored here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Interface name; unique across links.
    pub name: String,
    /// Desired activation state.
    #[serde(default)]
    pub enable: bool,
    /// Interface MTU.
    #[serde(default = "default_mtu")]
    pub mtu: u32,
    /// Device private key.
    pub private_key: PrivateKey,
    /// UDP listen port (`0` lets the device choose).
    #[serde(default)]
    pub listen_port: u16,
    /// Firewall mark for outgoing packets (`0` for none).
    #[serde(default)]
    pub firewall_mark: u32,
    /// IPv4 interface address with prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_ipv4: Option<Ipv4Net>,
    /// IPv6 interface address with prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_ipv6: Option<Ipv6Net>,
    /// Allowed IPs handed to peers of this link by default.
    #[serde(default)]
    pub default_allowed_ips: Vec<AllowedIp>,
    /// First default DNS server for peers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_dns1: Option<IpAddr>,
    /// Second default DNS server for peers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_dns2: Option<IpAddr>,
    /// Commands run after the link is brought up.
    #[serde(default)]
    pub post_up: Vec<String>,
    /// Commands run after the link is taken down.
    #[serde(default)]
    pub post_down: Vec<String>,
    /// Whether traffic is forwarded between peers.
    #[serde(default)]
    pub forward: bool,
}

fn default_mtu() -> u32 {
    DEFAULT_MTU
}

impl Link {
    /// Creates a disabled link with the default MTU and no addresses.
    #[must_use]
    pub fn new(name: impl Into<String>, private_key: PrivateKey) -> Self {
        Self {
            name: name.into(),
            enable: false,
            mtu: DEFAULT_MTU,
            private_key,
            listen_port: 0,
            firewall_mark: 0,
            address_ipv4: None,
            address_ipv6: None,
            default_allowed_ips: Vec::new(),
            default_dns1: None,
            default_dns2: None,
            post_up: Vec::new(),
            post_down: Vec::new(),
            forward: false,
        }
    }

    /// Sets the desired activation state.
    #[must_use]
    pub fn with_enable(mut self, enable: bool) -> Self {
        self.enable = enable;
        self
    }

    /// Sets the MTU.
    #[must_use]
    pub fn with_mtu(mut self, mtu: u32) -> Self {
        self.mtu = mtu;
        self
    }

    /// Sets the listen port.
    #[must_use]
    pub fn with_listen_port(mut self, port: u16) -> Self {
        self.listen_port = port;
        self
    }

    /// Sets the firewall mark.
    #[must_use]
    pub fn with_firewall_mark(mut self, mark: u32) -> Self {
        self.firewall_mark = mark;
        self
    }

    /// Sets the IPv4 interface address.
    #[must_use]
    pub fn with_ipv4(mut self, address: Ipv4Net) -> Self {
        self.address_ipv4 = Some(address);
        self
    }

    /// Sets the IPv6 interface address.
    #[must_use]
    pub fn with_ipv6(mut self, address: Ipv6Net) -> Self {
        self.address_ipv6 = Some(address);
        self
    }

    /// Adds a default allowed IP.
    #[must_use]
    pub fn with_default_allowed_ip(mut self, ip: AllowedIp) -> Self {
        self.default_allowed_ips.push(ip);
        self
    }

    /// Sets the default DNS servers.
    #[must_use]
    pub fn with_dns(mut self, dns1: Option<IpAddr>, dns2: Option<IpAddr>) -> Self {
        self.default_dns1 = dns1;
        self.default_dns2 = dns2;
        self
    }

    /// Appends a post-up command.
    #[must_use]
    pub fn with_post_up(mut self, command: impl Into<String>) -> Self {
        self.post_up.push(command.into());
        self
    }

    /// Appends a post-down command.
    #[must_use]
    pub fn with_post_down(mut self, command: impl Into<String>) -> Self {
        self.post_down.push(command.into());
        self
    }

    /// Sets the forwarding flag.
    #[must_use]
    pub fn with_forward(mut self, forward: bool) -> Self {
        self.forward = forward;
        self
    }

    /// Derives the link's public key.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        self.private_key.public_key()
    }

    /// Returns the configured interface addresses, IPv4 first.
    #[must_use]
    pub fn addresses(&self) -> Vec<IpNet> {
        self.address_ipv4
            .map(IpNet::V4)
            .into_iter()
            .chain(self.address_ipv6.map(IpNet::V6))
            .collect()
    }
}

/// A remote endpoint authorized on one link.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    /// Peer name; unique within its link.
    pub name: String,
    /// Desired activation state.
    #[serde(default)]
    pub enable: bool,
    /// The peer's public key.
    pub public_key: PublicKey,
    /// Optional preshared key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preshared_key: Option<PresharedKey>,
    /// The peer's endpoint, if it has a fixed one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<Endpoint>,
    /// Networks the peer may send from; mirrored as routes when active.
    #[serde(default)]
    pub allowed_ips: Vec<AllowedIp>,
    /// Persistent keepalive interval in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_keepalive: Option<u16>,
    /// First DNS override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns1: Option<IpAddr>,
    /// Second DNS override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns2: Option<IpAddr>,
}

impl Peer {
    /// Creates a disabled peer with no allowed IPs.
    #[must_use]
    pub fn new(name: impl Into<String>, public_key: PublicKey) -> Self {
        Self {
            name: name.into(),
            enable: false,
            public_key,
            preshared_key: None,
            endpoint: None,
            allowed_ips: Vec::new(),
            persistent_keepalive: None,
            dns1: None,
            dns2: None,
        }
    }

    /// Sets the desired activation state.
    #[must_use]
    pub fn with_enable(mut self, enable: bool) -> Self {
        self.enable = enable;
        self
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

    /// Adds an allowed IP.
    #[must_use]
    pub fn with_allowed_ip(mut self, ip: AllowedIp) -> Self {
        self.allowed_ips.push(ip);
        self
    }

    /// Sets the persistent keepalive interval.
    #[must_use]
    pub fn with_persistent_keepalive(mut self, seconds: u16) -> Self {
        self.persistent_keepalive = Some(seconds);
        self
    }

    /// Sets the DNS overrides.
    #[must_use]
    pub fn with_dns(mut self, dns1: Option<IpAddr>, dns2: Option<IpAddr>) -> Self {
        self.dns1 = dns1;
        self.dns2 = dns2;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const PRIVATE: &str = "ZOZ+ngJZ2jf+sREdOi/b0D8rTGMbcjgSA854Jn2KbzQ=";
    const PEER_KEY: &str = "4AQ6d+dvykkl4j6VG03e7VcciDbgn5mBEJFXMjn1pnU=";

    fn base_link() -> Link {
        Link::new("wg-linko", PrivateKey::from_base64(PRIVATE).expect("key"))
            .with_mtu(1420)
            .with_listen_port(9977)
            .with_firewall_mark(42069)
            .with_ipv4("10.6.6.1/24".parse().expect("cidr"))
            .with_ipv6("2001::/32".parse().expect("cidr"))
            .with_dns(Some("1.1.1.1".parse().expect("ip")), None)
            .with_default_allowed_ip("10.6.6.1/24".parse().expect("cidr"))
            .with_default_allowed_ip("10.6.6.2/24".parse().expect("cidr"))
            .with_post_down("cmd1")
            .with_post_down("cmd2")
            .with_post_up("cmd3")
    }

    fn base_peer() -> Peer {
        Peer::new("zoz-pc", PublicKey::from_base64(PEER_KEY).expect("key"))
            .with_allowed_ip("10.9.6.2/32".parse().expect("cidr"))
            .with_allowed_ip("10.9.6.10/32".parse().expect("cidr"))
            .with_endpoint("192.168.0.1:42064".parse().expect("endpoint"))
    }

    #[test]
    fn link_json_roundtrip() {
        let link = base_link().with_enable(true);
        let json = serde_json::to_string(&link).expect("serialize");
        assert!(json.contains(r#""address_ipv4":"10.6.6.1/24""#));
        assert!(json.contains(PRIVATE));
        let back: Link = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, link);
    }

    #[test]
    fn peer_json_roundtrip() {
        let peer = base_peer()
            .with_enable(true)
            .with_preshared_key(PresharedKey::generate())
            .with_persistent_keepalive(25);
        let json = serde_json::to_string(&peer).expect("serialize");
        assert!(json.contains(r#""endpoint":"192.168.0.1:42064""#));
        let back: Peer = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, peer);
    }

    #[test]
    fn minimal_link_json_uses_defaults() {
        let json = format!(r#"{{"name":"wg0","private_key":"{PRIVATE}","address_ipv4":"10.0.0.1/24"}}"#);
        let link: Link = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(link.mtu, DEFAULT_MTU);
        assert!(!link.enable);
        assert!(link.post_up.is_empty());
        assert_eq!(link.addresses().len(), 1);
    }

    #[test]
    fn addresses_list_ipv4_first() {
        let rendered: Vec<String> = base_link().addresses().iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["10.6.6.1/24", "2001::/32"]);
    }

    #[test]
    fn public_key_matches_private_key() {
        let link = base_link();
        assert_eq!(link.public_key(), link.private_key.public_key());
    }

    proptest! {
        #[test]
        fn peer_roundtrip_any_allowed_ips(
            octets in proptest::collection::vec((any::<[u8; 4]>(), 0u8..=32), 0..8),
            keepalive in proptest::option::of(any::<u16>()),
            enable in any::<bool>(),
        ) {
            let mut peer = base_peer().with_enable(enable);
            peer.allowed_ips = octets
                .into_iter()
                .map(|(o, prefix)| {
                    AllowedIp::new(IpNet::V4(Ipv4Net::new(o.into(), prefix).expect("prefix")))
                })
                .collect();
            peer.persistent_keepalive = keepalive;
            let json = serde_json::to_string(&peer).expect("serialize");
            let back: Peer = serde_json::from_str(&json).expect("deserialize");
            prop_assert_eq!(back, peer);
        }
    }
}
