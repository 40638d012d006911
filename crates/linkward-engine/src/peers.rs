//! Peer lifecycle operations.
//!
//! An active peer has two halves: an entry in the device's peer table and
//! one link-scoped route per allowed-IP prefix. Routes can only be installed
//! while the interface is up; for a loaded link that is down, activation
//! pushes the device entry and leaves the routes to the next link activation.

use linkward_registry::{Peer, Registry};
use linkward_wireguard::{DeviceConfig, DeviceController, KernelGateway, PeerConfig, Route};
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::error::{EngineError, Entity, Result};
use crate::hooks::HookRunner;
use crate::validate::validate_peer;

/// Builds the full-replace device directive for a peer.
fn peer_config(peer: &Peer) -> PeerConfig {
    let mut config = PeerConfig::new(peer.public_key)
        .with_persistent_keepalive(peer.persistent_keepalive.unwrap_or(0))
        .replacing_allowed_ips();
    config.allowed_ips.clone_from(&peer.allowed_ips);
    if let Some(psk) = &peer.preshared_key {
        config = config.with_preshared_key(psk.clone());
    }
    if let Some(endpoint) = peer.endpoint {
        config = config.with_endpoint(endpoint);
    }
    config
}

/// One link-scoped route per distinct allowed-IP prefix.
fn peer_routes(link: &str, peer: &Peer) -> Vec<Route> {
    let mut routes: Vec<Route> = Vec::with_capacity(peer.allowed_ips.len());
    for ip in &peer.allowed_ips {
        let route = Route::link_scoped(*ip.network(), link);
        if !routes.contains(&route) {
            routes.push(route);
        }
    }
    routes
}

impl<R, K, D, H> Engine<R, K, D, H>
where
    R: Registry,
    K: KernelGateway,
    D: DeviceController,
    H: HookRunner,
{
    /// Registers a peer under a link, activating it if the link is loaded and
    /// `peer.enable` is set. If that activation fails and rollback is on, the
    /// peer stays registered but disabled.
    ///
    /// Fails with a conflict if the name or public key is already used under
    /// the link.
    pub async fn add_peer(&self, link: &str, peer: Peer) -> Result<()> {
        validate_peer(&peer)?;
        let siblings = self.registry.get_link_peers(link).await?;
        if siblings.iter().any(|p| p.name == peer.name) {
            return Err(EngineError::conflict(
                Entity::Peer,
                &format!("{link}/{}", peer.name),
                "already registered",
            ));
        }
        ensure_key_unused(link, &peer, &siblings, None)?;

        self.registry.add_peer(link, &peer).await?;
        info!(link, peer = %peer.name, enable = peer.enable, "peer added");

        if peer.enable && self.is_loaded(link).await? {
            if let Err(e) = self.activate_peer(link, &peer.name).await {
                if self.config.rollback_failed_peer_activation {
                    let disabled = peer.with_enable(false);
                    if let Err(write) = self.registry.update_peer(link, &disabled.name, &disabled).await {
                        warn!(link, peer = %disabled.name, error = %write, "rollback: could not mark peer disabled");
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Removes a peer, tearing down its device entry and routes first if the
    /// link is loaded.
    pub async fn remove_peer(&self, link: &str, name: &str) -> Result<()> {
        let peer = self.registry.get_peer(link, name).await?;

        if self.is_loaded(link).await? {
            if let Err(e) = self.uninstall_peer(link, &peer).await {
                warn!(link, peer = name, error = %e, "peer teardown failed, removing anyway");
            }
        }

        self.registry.remove_peer(link, name).await?;
        info!(link, peer = name, "peer removed");
        Ok(())
    }

    /// Pushes a peer into the device, installs its routes and marks it enabled.
    pub async fn activate_peer(&self, link: &str, name: &str) -> Result<()> {
        self.require_loaded(link).await?;
        let mut peer = self.registry.get_peer(link, name).await?;

        self.install_peer(link, &peer).await?;

        if !peer.enable {
            peer.enable = true;
            self.registry.update_peer(link, name, &peer).await?;
        }
        info!(link, peer = name, "peer activated");
        Ok(())
    }

    /// Removes a peer from the device and its routes, and marks it disabled.
    pub async fn deactivate_peer(&self, link: &str, name: &str) -> Result<()> {
        self.require_loaded(link).await?;
        let mut peer = self.registry.get_peer(link, name).await?;

        self.uninstall_peer(link, &peer).await?;

        peer.enable = false;
        self.registry.update_peer(link, name, &peer).await?;
        info!(link, peer = name, "peer deactivated");
        Ok(())
    }

    /// Replaces a peer's definition, renaming it if `peer.name` differs.
    ///
    /// On a loaded link the old identity is torn down before the new value is
    /// persisted, and the new identity is activated if enabled.
    pub async fn update_peer(&self, link: &str, name: &str, peer: Peer) -> Result<()> {
        validate_peer(&peer)?;
        let old = self.registry.get_peer(link, name).await?;
        let siblings = self.registry.get_link_peers(link).await?;
        if peer.name != name && siblings.iter().any(|p| p.name == peer.name) {
            return Err(EngineError::conflict(
                Entity::Peer,
                &format!("{link}/{}", peer.name),
                "already registered",
            ));
        }
        ensure_key_unused(link, &peer, &siblings, Some(name))?;

        let loaded = self.is_loaded(link).await?;
        if loaded {
            self.uninstall_peer(link, &old).await?;
        }

        self.registry.update_peer(link, name, &peer).await?;
        info!(link, peer = name, new_name = %peer.name, "peer updated");

        if loaded && peer.enable {
            self.activate_peer(link, &peer.name).await?;
        }
        Ok(())
    }

    /// Pushes the device entry and, if the interface is up, the routes.
    ///
    /// An existing route counts as installed only if it goes through `link`.
    async fn install_peer(&self, link: &str, peer: &Peer) -> Result<()> {
        let config = DeviceConfig::new().with_peer(peer_config(peer));
        self.device
            .configure_device(link, &config)
            .await
            .map_err(|e| EngineError::device(link, e))?;

        let up = self
            .kernel
            .link_by_name(link)
            .await
            .map_err(|e| EngineError::kernel(link, "link_by_name", e))?
            .is_some_and(|info| info.up);
        if !up {
            debug!(link, peer = %peer.name, "interface is down, routes deferred");
            return Ok(());
        }

        let mut installed = Vec::new();
        for route in peer_routes(link, peer) {
            let failure = match self.kernel.route_add(&route).await {
                Ok(()) => {
                    installed.push(route);
                    continue;
                }
                Err(e) if e.is_route_exists() => match self.kernel.route_get(route.destination).await {
                    Ok(Some(owner)) if owner.link == link => {
                        debug!(link, peer = %peer.name, route = %route, "route already present");
                        continue;
                    }
                    Ok(owner) => EngineError::conflict(
                        Entity::Peer,
                        &format!("{link}/{}", peer.name),
                        format!(
                            "{} is already routed through {}",
                            route.destination,
                            owner.map_or_else(|| "another table".to_string(), |r| r.link)
                        ),
                    ),
                    Err(e) => EngineError::kernel(link, "route_get", e),
                },
                Err(e) => EngineError::kernel(link, "route_add", e),
            };
            if self.config.rollback_failed_peer_activation {
                self.rollback_install(link, peer, &installed).await;
            }
            return Err(failure);
        }
        debug!(link, peer = %peer.name, routes = installed.len(), "peer installed");
        Ok(())
    }

    /// Best-effort undo of a partial [`install_peer`](Self::install_peer).
    async fn rollback_install(&self, link: &str, peer: &Peer, installed: &[Route]) {
        warn!(link, peer = %peer.name, "route install failed, rolling back peer activation");
        let removal = DeviceConfig::new().with_peer(PeerConfig::remove(peer.public_key));
        if let Err(e) = self.device.configure_device(link, &removal).await {
            warn!(link, peer = %peer.name, error = %e, "rollback: device peer removal failed");
        }
        for route in installed {
            if let Err(e) = self.kernel.route_del(route).await {
                warn!(link, route = %route, error = %e, "rollback: route removal failed");
            }
        }
    }

    /// Removes the device entry, then each route. Route failures are logged.
    async fn uninstall_peer(&self, link: &str, peer: &Peer) -> Result<()> {
        let removal = DeviceConfig::new().with_peer(PeerConfig::remove(peer.public_key));
        self.device
            .configure_device(link, &removal)
            .await
            .map_err(|e| EngineError::device(link, e))?;

        for route in peer_routes(link, peer) {
            match self.kernel.route_del(&route).await {
                Ok(()) => {}
                Err(e) if e.is_route_not_found() => {
                    debug!(link, peer = %peer.name, route = %route, "route already absent");
                }
                Err(e) => {
                    warn!(link, peer = %peer.name, route = %route, error = %e, "route removal failed");
                }
            }
        }
        debug!(link, peer = %peer.name, "peer uninstalled");
        Ok(())
    }
}

/// Fails if another peer of the link already uses `peer`'s public key.
/// `current` names the peer being updated, which may keep its own key.
fn ensure_key_unused(link: &str, peer: &Peer, siblings: &[Peer], current: Option<&str>) -> Result<()> {
    let clash = siblings
        .iter()
        .find(|p| Some(p.name.as_str()) != current && p.public_key == peer.public_key);
    match clash {
        Some(other) => Err(EngineError::conflict(
            Entity::Peer,
            &format!("{link}/{}", peer.name),
            format!("public key already used by peer {}", other.name),
        )),
        None => Ok(()),
    }
}
