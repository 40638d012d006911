//! Core value types shared by links, peers and the device controller.

use std::fmt;
use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::str::FromStr;

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WireGuardError};

/// A prefix a peer may send from, and the route installed for it.
///
/// Host bits are kept as written (`10.6.6.1/24` stays `10.6.6.1/24`);
/// use [`AllowedIp::trunc`] for the network prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllowedIp {
    network: IpNet,
}

impl AllowedIp {
    /// Wraps a prefix as-is, host bits included.
    #[must_use]
    pub fn new(network: IpNet) -> Self {
        Self { network }
    }

    /// The wrapped prefix.
    #[must_use]
    pub fn network(&self) -> &IpNet {
        &self.network
    }

    /// Returns the same prefix with host bits cleared.
    #[must_use]
    pub fn trunc(&self) -> Self {
        Self {
            network: self.network.trunc(),
        }
    }

    /// Parses `addr/len`. A bare address is accepted as a host route
    /// (`/32` or `/128`).
    ///
    /// # Errors
    ///
    /// Fails with [`WireGuardError::InvalidCidr`].
    pub fn from_cidr(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(network) = s.parse::<IpNet>() {
            return Ok(Self { network });
        }
        s.parse::<IpAddr>()
            .map(|ip| Self {
                network: IpNet::from(ip),
            })
            .map_err(|_| WireGuardError::InvalidCidr(s.to_string()))
    }

    /// Formats as `addr/len`.
    #[must_use]
    pub fn to_cidr(&self) -> String {
        self.network.to_string()
    }
}

impl From<IpNet> for AllowedIp {
    fn from(network: IpNet) -> Self {
        Self::new(network)
    }
}

impl FromStr for AllowedIp {
    type Err = WireGuardError;
    fn from_str(s: &str) -> Result<Self> {
        Self::from_cidr(s)
    }
}

impl fmt::Display for AllowedIp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.network)
    }
}

/// The UDP address a peer is reached at.
///
/// Parsed from `ip:port`, `[ipv6]:port` or `host:port`; host names are
/// resolved once at parse time and the first UDP-capable address is kept.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    address: SocketAddr,
}

impl Endpoint {
    /// Wraps a socket address.
    #[must_use]
    pub fn new(address: SocketAddr) -> Self {
        Self { address }
    }

    /// Builds an endpoint from its parts.
    #[must_use]
    pub fn from_ip_port(ip: IpAddr, port: u16) -> Self {
        Self {
            address: SocketAddr::new(ip, port),
        }
    }

    /// The full socket address.
    #[must_use]
    pub fn address(&self) -> &SocketAddr {
        &self.address
    }

    /// Host part.
    #[must_use]
    pub fn ip(&self) -> IpAddr {
        self.address.ip()
    }

    /// UDP port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.address.port()
    }
}

impl FromStr for Endpoint {
    type Err = WireGuardError;
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(address) = s.parse::<SocketAddr>() {
            return Ok(Self { address });
        }
        let mut resolved = s
            .to_socket_addrs()
            .map_err(|e| WireGuardError::InvalidEndpoint(format!("{s}: {e}")))?;
        resolved
            .next()
            .map(|address| Self { address })
            .ok_or_else(|| WireGuardError::InvalidEndpoint(format!("{s}: no addresses")))
    }
}

impl TryFrom<String> for Endpoint {
    type Error = WireGuardError;
    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.to_string()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}
