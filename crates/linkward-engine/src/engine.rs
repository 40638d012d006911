//! The reconciliation engine: link lifecycle and system-config sync.
//!
//! Every operation re-reads the registry and the kernel, issues its gateway
//! and device calls one after another, then persists the outcome. Nothing
//! is cached between calls. A failure part-way through leaves the earlier
//! steps in place; calls are shaped so that retrying converges.

use linkward_registry::{Link, Peer, Registry};
use linkward_wireguard::{DeviceConfig, DeviceController, DeviceStatus, KernelGateway, LinkKind};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{EngineError, Entity, Result};
use crate::hooks::{run_phase, HookPhase, HookRunner, ShellHookRunner};
use crate::validate::validate_link;

/// Drives the registry, the kernel and the WireGuard device into agreement.
///
/// The engine owns its kernel gateway and device controller until
/// [`Engine::shutdown`]. It does not serialize concurrent calls for the same
/// link; see [`LinkLocks`](crate::LinkLocks).
#[derive(Debug)]
pub struct Engine<R, K, D, H = ShellHookRunner> {
    pub(crate) registry: R,
    pub(crate) kernel: K,
    pub(crate) device: D,
    pub(crate) hooks: H,
    pub(crate) config: EngineConfig,
}

impl<R, K, D> Engine<R, K, D, ShellHookRunner>
where
    R: Registry,
    K: KernelGateway,
    D: DeviceController,
{
    /// Creates an engine that runs hooks through `/bin/sh`.
    pub fn new(registry: R, kernel: K, device: D, config: EngineConfig) -> Self {
        let hooks = ShellHookRunner::new().with_timeout(config.hook_timeout());
        Self::with_hooks(registry, kernel, device, hooks, config)
    }
}

impl<R, K, D, H> Engine<R, K, D, H>
where
    R: Registry,
    K: KernelGateway,
    D: DeviceController,
    H: HookRunner,
{
    /// Creates an engine with a custom hook runner.
    pub fn with_hooks(registry: R, kernel: K, device: D, hooks: H, config: EngineConfig) -> Self {
        Self {
            registry,
            kernel,
            device,
            hooks,
            config,
        }
    }

    /// Returns the registry.
    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Releases the kernel gateway and device controller.
    ///
    /// Both are closed even if the first fails; the first error is returned.
    pub async fn shutdown(self) -> Result<()> {
        let kernel = self.kernel.close().await;
        let device = self.device.close().await;
        info!("engine shut down");
        kernel.map_err(|e| EngineError::kernel("all", "close", e))?;
        device.map_err(|e| EngineError::device("all", e))
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Returns true iff the kernel has a WireGuard interface named `name`.
    pub async fn is_loaded(&self, name: &str) -> Result<bool> {
        let link = self
            .kernel
            .link_by_name(name)
            .await
            .map_err(|e| EngineError::kernel(name, "link_by_name", e))?;
        Ok(link.is_some_and(|l| l.kind == LinkKind::WireGuard))
    }

    /// Loads a link from the registry.
    pub async fn link(&self, name: &str) -> Result<Link> {
        Ok(self.registry.get_link(name).await?)
    }

    /// Loads every link from the registry.
    pub async fn links(&self) -> Result<Vec<Link>> {
        Ok(self.registry.list_links().await?)
    }

    /// Loads a peer from the registry.
    pub async fn peer(&self, link: &str, name: &str) -> Result<Peer> {
        Ok(self.registry.get_peer(link, name).await?)
    }

    /// Loads the peers of a link from the registry.
    pub async fn peers(&self, link: &str) -> Result<Vec<Peer>> {
        Ok(self.registry.get_link_peers(link).await?)
    }

    /// Reads the live device state of a loaded link.
    pub async fn device_status(&self, link: &str) -> Result<DeviceStatus> {
        self.require_loaded(link).await?;
        self.device
            .device(link)
            .await
            .map_err(|e| EngineError::device(link, e))
    }

    // ------------------------------------------------------------------
    // Link operations
    // ------------------------------------------------------------------

    /// Registers a link, activating it if `link.enable` is set.
    ///
    /// Fails with a conflict if the name is registered or used by any kernel
    /// interface.
    pub async fn add_link(&self, link: Link) -> Result<()> {
        validate_link(&link)?;
        self.ensure_name_free(&link.name).await?;

        self.registry.add_link(&link).await?;
        info!(link = %link.name, enable = link.enable, "link added");

        if link.enable {
            self.activate_link(&link.name).await?;
        }
        Ok(())
    }

    /// Deletes a link's interface if loaded, then the link and its peers.
    pub async fn remove_link(&self, name: &str) -> Result<()> {
        let link = self.registry.get_link(name).await?;
        let loaded = self.is_loaded(name).await?;

        if loaded {
            self.kernel
                .link_del(name)
                .await
                .map_err(|e| EngineError::kernel(name, "link_del", e))?;
            debug!(link = name, "interface deleted");
        }

        self.registry.remove_link(name).await?;
        info!(link = name, loaded, "link removed");

        if loaded {
            self.run_hooks(HookPhase::PostDown, &link).await;
        }
        Ok(())
    }

    /// Loads, configures and brings up a link, then activates its enabled peers.
    pub async fn activate_link(&self, name: &str) -> Result<()> {
        let mut link = self.registry.get_link(name).await?;

        if !self.is_loaded(name).await? {
            self.kernel
                .link_add(name, LinkKind::WireGuard)
                .await
                .map_err(|e| EngineError::kernel(name, "link_add", e))?;
            debug!(link = name, "interface created");
        }

        link.enable = true;
        self.sync_link(name, &link).await?;
        self.registry.update_link(name, &link).await?;
        info!(link = name, "link activated");

        self.activate_enabled_peers(name).await?;
        self.run_hooks(HookPhase::PostUp, &link).await;
        Ok(())
    }

    /// Takes a link's interface down if loaded and marks it disabled.
    pub async fn deactivate_link(&self, name: &str) -> Result<()> {
        let mut link = self.registry.get_link(name).await?;
        let loaded = self.is_loaded(name).await?;

        if loaded {
            self.kernel
                .link_set_down(name)
                .await
                .map_err(|e| EngineError::kernel(name, "link_set_down", e))?;
        }

        link.enable = false;
        self.registry.update_link(name, &link).await?;
        info!(link = name, loaded, "link deactivated");

        if loaded {
            self.run_hooks(HookPhase::PostDown, &link).await;
        }
        Ok(())
    }

    /// Replaces a link's definition, renaming it if `link.name` differs.
    ///
    /// A loaded link is re-synced with the new values; an unloaded link
    /// whose new value is enabled is activated. When the interface goes from
    /// down to up or up to down, `post_up` or `post_down` of the new value runs.
    pub async fn update_link(&self, name: &str, link: Link) -> Result<()> {
        validate_link(&link)?;
        self.registry.get_link(name).await?;
        if link.name != name {
            self.ensure_name_free(&link.name).await?;
        }

        self.registry.update_link(name, &link).await?;
        info!(link = name, new_name = %link.name, "link updated");

        if self.is_loaded(name).await? {
            let was_up = self
                .kernel
                .link_by_name(name)
                .await
                .map_err(|e| EngineError::kernel(name, "link_by_name", e))?
                .is_some_and(|info| info.up);
            self.sync_link(name, &link).await?;
            if link.enable {
                self.activate_enabled_peers(&link.name).await?;
            }
            match (was_up, link.enable) {
                (false, true) => self.run_hooks(HookPhase::PostUp, &link).await,
                (true, false) => self.run_hooks(HookPhase::PostDown, &link).await,
                _ => {}
            }
        } else if link.enable {
            self.activate_link(&link.name).await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Pushes `link`'s system configuration onto the loaded interface
    /// `current`, renaming it to `link.name`.
    ///
    /// Bringing the interface down flushes its routes.
    async fn sync_link(&self, current: &str, link: &Link) -> Result<()> {
        validate_link(link)?;

        self.kernel
            .link_set_down(current)
            .await
            .map_err(|e| EngineError::kernel(current, "link_set_down", e))?;

        let device = DeviceConfig::new()
            .with_private_key(link.private_key.clone())
            .with_listen_port(link.listen_port)
            .with_firewall_mark(link.firewall_mark);
        self.device
            .configure_device(current, &device)
            .await
            .map_err(|e| EngineError::device(current, e))?;

        let existing = self
            .kernel
            .addr_list(current)
            .await
            .map_err(|e| EngineError::kernel(current, "addr_list", e))?;
        for addr in existing {
            self.kernel
                .addr_del(current, addr)
                .await
                .map_err(|e| EngineError::kernel(current, "addr_del", e))?;
        }
        for addr in link.addresses() {
            self.kernel
                .addr_add(current, addr)
                .await
                .map_err(|e| EngineError::kernel(current, "addr_add", e))?;
        }

        self.kernel
            .link_set_mtu(current, link.mtu)
            .await
            .map_err(|e| EngineError::kernel(current, "link_set_mtu", e))?;
        self.kernel
            .link_set_name(current, &link.name)
            .await
            .map_err(|e| EngineError::kernel(current, "link_set_name", e))?;

        if link.enable {
            self.kernel
                .link_set_up(&link.name)
                .await
                .map_err(|e| EngineError::kernel(&link.name, "link_set_up", e))?;
        }
        debug!(link = %link.name, up = link.enable, "system config synced");
        Ok(())
    }

    async fn activate_enabled_peers(&self, link: &str) -> Result<()> {
        for peer in self.registry.get_link_peers(link).await? {
            if peer.enable {
                self.activate_peer(link, &peer.name).await?;
            }
        }
        Ok(())
    }

    /// Fails with a conflict if `name` is registered or used by a kernel
    /// interface of any type.
    async fn ensure_name_free(&self, name: &str) -> Result<()> {
        match self.registry.get_link(name).await {
            Ok(_) => {
                return Err(EngineError::conflict(Entity::Link, name, "already registered"));
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        let existing = self
            .kernel
            .link_by_name(name)
            .await
            .map_err(|e| EngineError::kernel(name, "link_by_name", e))?;
        if let Some(info) = existing {
            return Err(EngineError::conflict(
                Entity::Link,
                name,
                format!("a {} interface with this name exists in the kernel", info.kind),
            ));
        }
        Ok(())
    }

    pub(crate) async fn require_loaded(&self, link: &str) -> Result<()> {
        if self.is_loaded(link).await? {
            Ok(())
        } else {
            Err(EngineError::LinkNotLoaded {
                name: link.to_string(),
            })
        }
    }

    async fn run_hooks(&self, phase: HookPhase, link: &Link) {
        if !self.config.run_hooks {
            return;
        }
        let commands = match phase {
            HookPhase::PostUp => &link.post_up,
            HookPhase::PostDown => &link.post_down,
        };
        run_phase(&self.hooks, phase, &link.name, commands).await;
    }
}
