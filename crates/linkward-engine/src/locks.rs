//! Per-link mutual exclusion for callers.
//!
//! The engine does not serialize calls that touch the same link. Callers
//! that issue engine operations from several tasks take a [`LinkLocks`]
//! guard around each call.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A keyed async mutex, one lock per link name.
///
/// Clones share the same lock table.
#[derive(Debug, Clone, Default)]
pub struct LinkLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl LinkLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `link`.
    ///
    /// The returned guard releases the lock when dropped.
    pub async fn lock(&self, link: &str) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(self.locks.lock().entry(link.to_string()).or_default());
        lock.lock_owned().await
    }

    /// Drops table entries nobody holds or waits on.
    pub fn prune(&self) {
        self.locks.lock().retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    /// Returns the number of links in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    /// Returns true if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}
