//! Error types for the reconciliation engine.

use std::fmt;

use linkward_registry::RegistryError;
use linkward_wireguard::{DeviceError, KernelError};
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// The kind of entity an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    /// A link.
    Link,
    /// A peer.
    Peer,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link => f.write_str("link"),
            Self::Peer => f.write_str("peer"),
        }
    }
}

/// Coarse classification of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The payload failed validation.
    Validation,
    /// The name, key or route destination is already taken.
    Conflict,
    /// The entity is absent, or its link is not loaded.
    NotFound,
    /// A kernel interface, address or route call failed.
    Kernel,
    /// A device configuration push failed.
    Device,
    /// The registry failed.
    Registry,
}

/// Errors returned by engine operations.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The payload failed validation.
    #[error("invalid {entity} {name:?}: {reason}")]
    Validation {
        /// The entity kind.
        entity: Entity,
        /// The offending name.
        name: String,
        /// Why validation failed.
        reason: String,
    },

    /// The name, public key or route destination is already taken.
    #[error("{entity} {name} conflicts: {reason}")]
    Conflict {
        /// The entity kind.
        entity: Entity,
        /// The conflicting name.
        name: String,
        /// What it conflicts with.
        reason: String,
    },

    /// The entity does not exist in the registry.
    #[error("{entity} {name} not found")]
    NotFound {
        /// The entity kind.
        entity: Entity,
        /// The missing name (`link/peer` for peers).
        name: String,
    },

    /// The link has no tunnel interface in the kernel.
    #[error("link {name} is not loaded")]
    LinkNotLoaded {
        /// The link name.
        name: String,
    },

    /// A kernel call failed.
    #[error("kernel {operation} on {link} failed: {source}")]
    Kernel {
        /// The link being reconciled.
        link: String,
        /// The gateway operation.
        operation: &'static str,
        /// The underlying error.
        #[source]
        source: KernelError,
    },

    /// A device configuration call failed.
    #[error("device {link} failed: {source}")]
    Device {
        /// The link being reconciled.
        link: String,
        /// The underlying error.
        #[source]
        source: DeviceError,
    },

    /// The registry failed for a reason other than not-found or conflict.
    #[error("registry error: {0}")]
    Registry(#[source] RegistryError),
}

impl EngineError {
    /// Returns the error classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::NotFound { .. } | Self::LinkNotLoaded { .. } => ErrorKind::NotFound,
            Self::Kernel { .. } => ErrorKind::Kernel,
            Self::Device { .. } => ErrorKind::Device,
            Self::Registry(_) => ErrorKind::Registry,
        }
    }

    /// Returns true for not-found class errors.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub(crate) fn validation(entity: Entity, name: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            entity,
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn conflict(entity: Entity, name: &str, reason: impl Into<String>) -> Self {
        Self::Conflict {
            entity,
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn kernel(link: &str, operation: &'static str, source: KernelError) -> Self {
        Self::Kernel {
            link: link.to_string(),
            operation,
            source,
        }
    }

    pub(crate) fn device(link: &str, source: DeviceError) -> Self {
        Self::Device {
            link: link.to_string(),
            source,
        }
    }
}

impl From<RegistryError> for EngineError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::LinkNotFound { name } => Self::NotFound {
                entity: Entity::Link,
                name,
            },
            RegistryError::PeerNotFound { link, name } => Self::NotFound {
                entity: Entity::Peer,
                name: format!("{link}/{name}"),
            },
            RegistryError::LinkExists { name } => Self::Conflict {
                entity: Entity::Link,
                name,
                reason: "already registered".to_string(),
            },
            RegistryError::PeerExists { link, name } => Self::Conflict {
                entity: Entity::Peer,
                name: format!("{link}/{name}"),
                reason: "already registered".to_string(),
            },
            other => Self::Registry(other),
        }
    }
}

/// Errors from running a post-up or post-down command.
#[derive(Debug, Error)]
pub enum HookError {
    /// The command could not be started.
    #[error("failed to spawn {command:?}: {source}")]
    Spawn {
        /// The expanded command line.
        command: String,
        /// The spawn error.
        #[source]
        source: std::io::Error,
    },

    /// The command exited unsuccessfully.
    #[error("{command:?} exited with {status}: {stderr}")]
    Failed {
        /// The expanded command line.
        command: String,
        /// Exit status description.
        status: String,
        /// Captured standard error.
        stderr: String,
    },

    /// The command did not finish in time.
    #[error("{command:?} timed out after {timeout_ms} ms")]
    Timeout {
        /// The expanded command line.
        command: String,
        /// The timeout that elapsed.
        timeout_ms: u64,
    },
}
