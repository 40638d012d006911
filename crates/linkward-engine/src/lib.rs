//! Reconciliation engine for linkward.
//!
//! The [`Engine`] accepts link and peer lifecycle operations and drives
//! three independently mutable stores into agreement:
//!
//! - the configuration [`Registry`](linkward_registry::Registry) (desired state)
//! - the kernel, through a [`KernelGateway`](linkward_wireguard::KernelGateway)
//! - the WireGuard device, through a [`DeviceController`](linkward_wireguard::DeviceController)
//!
//! Whether a link is loaded is re-queried from the kernel on every call.
//!
//! # Example
//!
//! ```rust,no_run
//! use linkward_engine::{Engine, EngineConfig};
//! use linkward_registry::{Link, MemoryRegistry};
//! use linkward_wireguard::{FakeNamespace, PrivateKey};
//!
//! # async fn example() -> linkward_engine::Result<()> {
//! let ns = FakeNamespace::new();
//! let engine = Engine::new(MemoryRegistry::new(), ns.clone(), ns, EngineConfig::default());
//!
//! let link = Link::new("wg0", PrivateKey::generate())
//!     .with_ipv4("10.6.6.1/24".parse().expect("cidr"))
//!     .with_enable(true);
//! engine.add_link(link).await?;
//! assert!(engine.is_loaded("wg0").await?);
//! # Ok(())
//! # }
//! ```

mod config;
mod engine;
pub mod error;
pub mod hooks;
mod locks;
mod peers;
pub mod validate;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, Entity, ErrorKind, HookError, Result};
pub use hooks::{HookRunner, NoopHookRunner, ShellHookRunner};
pub use locks::LinkLocks;
