//! Error types for WireGuard values, the kernel gateway, and the device controller.

use thiserror::Error;

/// Result type alias for value parsing.
pub type Result<T> = std::result::Result<T, WireGuardError>;

/// Errors that can occur while parsing WireGuard value types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireGuardError {
    /// Invalid key format.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Invalid base64 encoding.
    #[error("invalid base64 encoding: {0}")]
    InvalidBase64(String),

    /// Invalid key length.
    #[error("invalid key length: expected 32, got {0}")]
    InvalidKeyLength(usize),

    /// Invalid CIDR notation.
    #[error("invalid CIDR: {0}")]
    InvalidCidr(String),

    /// Invalid or unresolvable endpoint.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl From<base64::DecodeError> for WireGuardError {
    fn from(e: base64::DecodeError) -> Self {
        Self::InvalidBase64(e.to_string())
    }
}

/// Errors reported by a [`KernelGateway`](crate::KernelGateway).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    /// No interface with this name exists in the namespace.
    #[error("link {0} not found")]
    LinkNotFound(String),

    /// An interface with this name already exists in the namespace.
    #[error("link {0} already exists")]
    LinkExists(String),

    /// The address is not assigned to the interface.
    #[error("address {address} not assigned to {link}")]
    AddressNotFound {
        /// Interface name.
        link: String,
        /// The missing address.
        address: String,
    },

    /// The address is already assigned to the interface.
    #[error("address {address} already assigned to {link}")]
    AddressExists {
        /// Interface name.
        link: String,
        /// The duplicate address.
        address: String,
    },

    /// The route does not exist.
    #[error("route {0} not found")]
    RouteNotFound(String),

    /// The route already exists.
    #[error("route {0} already exists")]
    RouteExists(String),

    /// The kernel rejected the request.
    #[error("{operation} rejected: {reason}")]
    Rejected {
        /// The gateway operation.
        operation: &'static str,
        /// Reason reported by the kernel or tool.
        reason: String,
    },

    /// Output from the kernel could not be parsed.
    #[error("unparseable kernel output: {0}")]
    Parse(String),

    /// The backing tool could not be spawned or talked to.
    #[error("I/O error: {0}")]
    Io(String),
}

impl KernelError {
    /// Returns true if the error means the route is absent.
    #[must_use]
    pub fn is_route_not_found(&self) -> bool {
        matches!(self, Self::RouteNotFound(_))
    }

    /// Returns true if the error means the route is already installed.
    #[must_use]
    pub fn is_route_exists(&self) -> bool {
        matches!(self, Self::RouteExists(_))
    }
}

impl From<std::io::Error> for KernelError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Errors reported by a [`DeviceController`](crate::DeviceController).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// No WireGuard device with this name exists.
    #[error("device {0} not found")]
    DeviceNotFound(String),

    /// The device rejected the configuration.
    #[error("configuration of {device} rejected: {reason}")]
    Rejected {
        /// Device name.
        device: String,
        /// Reason reported by the device or tool.
        reason: String,
    },

    /// Device state could not be converted.
    #[error("unparseable device data: {0}")]
    Parse(String),
}
