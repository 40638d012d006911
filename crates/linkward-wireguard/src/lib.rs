//! WireGuard primitives for linkward.
//!
//! This crate provides the Curve25519 key types, the allowed-IP and endpoint
//! value types, and the two contracts the reconciliation engine drives:
//!
//! - [`KernelGateway`]: interfaces, addresses and routes in one namespace
//! - [`DeviceController`]: WireGuard device and peer configuration
//!
//! [`FakeNamespace`] implements both in memory for tests. With the `linux`
//! feature on a Linux target, the `linux` module provides real backends:
//! `ip` for the kernel gateway and netlink for the device.

pub mod error;
mod device;
mod fake;
mod kernel;
mod keys;
mod types;

#[cfg(all(target_os = "linux", feature = "linux"))]
pub mod linux;

pub use device::{DeviceConfig, DeviceController, DeviceStatus, PeerConfig, PeerStatus};
pub use error::{DeviceError, KernelError, WireGuardError};
pub use fake::{FakeNamespace, FakeOp};
pub use kernel::{KernelGateway, LinkInfo, LinkKind, Route, RouteScope};
pub use keys::{generate_keypair, PresharedKey, PrivateKey, PublicKey, KEY_SIZE};
pub use types::{AllowedIp, Endpoint};
