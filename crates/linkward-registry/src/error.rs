//! Error types for the configuration registry.

use thiserror::Error;

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The link was not found.
    #[error("link not found: {name}")]
    LinkNotFound {
        /// The link name that was not found.
        name: String,
    },

    /// The peer was not found under its link.
    #[error("peer not found: {link}/{name}")]
    PeerNotFound {
        /// The parent link name.
        link: String,
        /// The peer name that was not found.
        name: String,
    },

    /// A link with this name already exists.
    #[error("link already exists: {name}")]
    LinkExists {
        /// The duplicate link name.
        name: String,
    },

    /// A peer with this name already exists under the link.
    #[error("peer already exists: {link}/{name}")]
    PeerExists {
        /// The parent link name.
        link: String,
        /// The duplicate peer name.
        name: String,
    },

    /// The backing store failed.
    #[error("storage error: {reason}")]
    Storage {
        /// The reason reported by the store.
        reason: String,
    },

    /// The registry has been closed.
    #[error("registry is closed")]
    Closed,
}

impl RegistryError {
    /// Returns true for the not-found variants.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::LinkNotFound { .. } | Self::PeerNotFound { .. })
    }

    /// Returns true for the already-exists variants.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::LinkExists { .. } | Self::PeerExists { .. })
    }
}
