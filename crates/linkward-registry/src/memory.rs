//! In-memory registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{RegistryError, Result};
use crate::model::{Link, Peer};
use crate::registry::Registry;

#[derive(Debug, Clone)]
struct LinkEntry {
    link: Link,
    peers: BTreeMap<String, Peer>,
}

#[derive(Debug, Default)]
struct State {
    links: BTreeMap<String, LinkEntry>,
    closed: bool,
    fail_writes: bool,
}

impl State {
    fn readable(&self) -> Result<()> {
        if self.closed {
            return Err(RegistryError::Closed);
        }
        Ok(())
    }

    fn writable(&self) -> Result<()> {
        self.readable()?;
        if self.fail_writes {
            return Err(RegistryError::Storage {
                reason: "writes disabled".to_string(),
            });
        }
        Ok(())
    }

    fn entry(&self, link: &str) -> Result<&LinkEntry> {
        self.links.get(link).ok_or_else(|| RegistryError::LinkNotFound {
            name: link.to_string(),
        })
    }

    fn entry_mut(&mut self, link: &str) -> Result<&mut LinkEntry> {
        self.links.get_mut(link).ok_or_else(|| RegistryError::LinkNotFound {
            name: link.to_string(),
        })
    }
}

/// A [`Registry`] held entirely in memory.
///
/// Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    state: Arc<RwLock<State>>,
}

impl MemoryRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later mutating call fail with a storage error.
    pub fn fail_writes(&self, fail: bool) {
        self.state.write().fail_writes = fail;
    }

    /// Returns the number of stored links.
    #[must_use]
    pub fn link_count(&self) -> usize {
        self.state.read().links.len()
    }

    /// Returns the number of stored peers across all links.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.state.read().links.values().map(|e| e.peers.len()).sum()
    }
}

impl Registry for MemoryRegistry {
    async fn add_link(&self, link: &Link) -> Result<()> {
        let mut state = self.state.write();
        state.writable()?;
        if state.links.contains_key(&link.name) {
            return Err(RegistryError::LinkExists {
                name: link.name.clone(),
            });
        }
        state.links.insert(
            link.name.clone(),
            LinkEntry {
                link: link.clone(),
                peers: BTreeMap::new(),
            },
        );
        debug!(link = %link.name, "stored link");
        Ok(())
    }

    async fn get_link(&self, name: &str) -> Result<Link> {
        let state = self.state.read();
        state.readable()?;
        state.entry(name).map(|e| e.link.clone())
    }

    async fn list_links(&self) -> Result<Vec<Link>> {
        let state = self.state.read();
        state.readable()?;
        Ok(state.links.values().map(|e| e.link.clone()).collect())
    }

    async fn update_link(&self, name: &str, link: &Link) -> Result<()> {
        let mut state = self.state.write();
        state.writable()?;
        state.entry(name)?;
        if link.name != name && state.links.contains_key(&link.name) {
            return Err(RegistryError::LinkExists {
                name: link.name.clone(),
            });
        }
        let Some(mut entry) = state.links.remove(name) else {
            return Err(RegistryError::LinkNotFound {
                name: name.to_string(),
            });
        };
        entry.link = link.clone();
        state.links.insert(link.name.clone(), entry);
        debug!(link = %name, new_name = %link.name, "updated link");
        Ok(())
    }

    async fn remove_link(&self, name: &str) -> Result<()> {
        let mut state = self.state.write();
        state.writable()?;
        let entry = state.links.remove(name).ok_or_else(|| RegistryError::LinkNotFound {
            name: name.to_string(),
        })?;
        debug!(link = %name, peers = entry.peers.len(), "removed link");
        Ok(())
    }

    async fn add_peer(&self, link: &str, peer: &Peer) -> Result<()> {
        let mut state = self.state.write();
        state.writable()?;
        let entry = state.entry_mut(link)?;
        if entry.peers.contains_key(&peer.name) {
            return Err(RegistryError::PeerExists {
                link: link.to_string(),
                name: peer.name.clone(),
            });
        }
        entry.peers.insert(peer.name.clone(), peer.clone());
        debug!(link, peer = %peer.name, "stored peer");
        Ok(())
    }

    async fn get_peer(&self, link: &str, name: &str) -> Result<Peer> {
        let state = self.state.read();
        state.readable()?;
        state
            .entry(link)?
            .peers
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::PeerNotFound {
                link: link.to_string(),
                name: name.to_string(),
            })
    }

    async fn get_link_peers(&self, link: &str) -> Result<Vec<Peer>> {
        let state = self.state.read();
        state.readable()?;
        Ok(state.entry(link)?.peers.values().cloned().collect())
    }

    async fn update_peer(&self, link: &str, name: &str, peer: &Peer) -> Result<()> {
        let mut state = self.state.write();
        state.writable()?;
        let entry = state.entry_mut(link)?;
        if !entry.peers.contains_key(name) {
            return Err(RegistryError::PeerNotFound {
                link: link.to_string(),
                name: name.to_string(),
            });
        }
        if peer.name != name && entry.peers.contains_key(&peer.name) {
            return Err(RegistryError::PeerExists {
                link: link.to_string(),
                name: peer.name.clone(),
            });
        }
        entry.peers.remove(name);
        entry.peers.insert(peer.name.clone(), peer.clone());
        debug!(link, peer = %name, new_name = %peer.name, "updated peer");
        Ok(())
    }

    async fn remove_peer(&self, link: &str, name: &str) -> Result<()> {
        let mut state = self.state.write();
        state.writable()?;
        let entry = state.entry_mut(link)?;
        if entry.peers.remove(name).is_none() {
            return Err(RegistryError::PeerNotFound {
                link: link.to_string(),
                name: name.to_string(),
            });
        }
        debug!(link, peer = %name, "removed peer");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.state.write().closed = true;
        Ok(())
    }
}
