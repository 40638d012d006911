//! The configuration registry contract.

use crate::error::Result;
use crate::model::{Link, Peer};

/// Durable store of desired link and peer state.
///
/// Every mutating call is atomic on its own. Lookups of a missing link or
/// peer return a not-found error (see [`RegistryError::is_not_found`]).
///
/// [`RegistryError::is_not_found`]: crate::RegistryError::is_not_found
#[allow(async_fn_in_trait)]
pub trait Registry {
    /// Stores a new link. Fails if the name is taken.
    async fn add_link(&self, link: &Link) -> Result<()>;

    /// Loads a link by name.
    async fn get_link(&self, name: &str) -> Result<Link>;

    /// Loads every link, ordered by name.
    async fn list_links(&self) -> Result<Vec<Link>>;

    /// Replaces the link stored under `name`.
    ///
    /// If `link.name` differs from `name` the link is renamed and keeps its
    /// peers; the new name must be free.
    async fn update_link(&self, name: &str, link: &Link) -> Result<()>;

    /// Deletes a link together with all of its peers.
    async fn remove_link(&self, name: &str) -> Result<()>;

    /// Stores a new peer under an existing link.
    async fn add_peer(&self, link: &str, peer: &Peer) -> Result<()>;

    /// Loads a peer by link and peer name.
    async fn get_peer(&self, link: &str, name: &str) -> Result<Peer>;

    /// Loads every peer of a link, ordered by name.
    async fn get_link_peers(&self, link: &str) -> Result<Vec<Peer>>;

    /// Replaces the peer stored under `name`, renaming it if `peer.name`
    /// differs.
    async fn update_peer(&self, link: &str, name: &str, peer: &Peer) -> Result<()>;

    /// Deletes a peer.
    async fn remove_peer(&self, link: &str, name: &str) -> Result<()>;

    /// Releases the store. Later calls fail.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
