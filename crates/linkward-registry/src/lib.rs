//! Desired-state registry for linkward.
//!
//! Holds the [`Link`] and [`Peer`] model and the [`Registry`] contract the
//! reconciliation engine persists into. [`MemoryRegistry`] is the in-memory
//! implementation used by tests and embedders without a durable store.

pub mod error;
mod memory;
mod model;
mod registry;

pub use error::{RegistryError, Result};
pub use memory::MemoryRegistry;
pub use model::{Link, Peer, DEFAULT_MTU};
pub use registry::Registry;
