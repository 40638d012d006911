use std::net::IpAddr;

use ipnet::IpNet;
use serde::Deserialize;

use super::run;
use crate::error::KernelError;
use crate::kernel::{KernelGateway, LinkInfo, LinkKind, Route, RouteScope};

/// Kernel gateway backed by the iproute2 `ip` tool.
#[derive(Clone, Debug)]
pub struct IpCommand {
    binary: String,
    netns: Option<String>,
}

impl IpCommand {
    /// Creates a gateway for the current network namespace using `ip` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            binary: "ip".to_string(),
            netns: None,
        }
    }

    /// Uses a specific `ip` binary.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Scopes every call to the named network namespace (`ip -n`).
    #[must_use]
    pub fn with_netns(mut self, netns: impl Into<String>) -> Self {
        self.netns = Some(netns.into());
        self
    }

    fn args(&self, json: bool, rest: &[&str]) -> Vec<String> {
        let mut args = Vec::with_capacity(rest.len() + 4);
        if let Some(ns) = &self.netns {
            args.push("-n".to_string());
            args.push(ns.clone());
        }
        if json {
            args.push("-j".to_string());
            args.push("-d".to_string());
        }
        args.extend(rest.iter().map(|s| (*s).to_string()));
        args
    }

    async fn exec(
        &self,
        operation: &'static str,
        target: &str,
        json: bool,
        rest: &[&str],
    ) -> Result<String, KernelError> {
        let output = run(&self.binary, &self.args(json, rest)).await?;
        if output.success {
            Ok(output.stdout)
        } else {
            Err(classify(operation, target, &output.stderr))
        }
    }
}

impl Default for IpCommand {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps iproute2 error text onto [`KernelError`].
fn classify(operation: &'static str, target: &str, stderr: &str) -> KernelError {
    let exists = stderr.contains("File exists");
    let missing_link = stderr.contains("Cannot find device") || stderr.contains("does not exist");
    match operation {
        "link_add" if exists => KernelError::LinkExists(target.to_string()),
        "addr_add" if exists => KernelError::AddressExists {
            link: String::new(),
            address: target.to_string(),
        },
        "addr_del" if stderr.contains("Cannot assign requested address") => {
            KernelError::AddressNotFound {
                link: String::new(),
                address: target.to_string(),
            }
        }
        "route_add" if exists => KernelError::RouteExists(target.to_string()),
        "route_del" if stderr.contains("No such process") => KernelError::RouteNotFound(target.to_string()),
        _ if missing_link => KernelError::LinkNotFound(target.to_string()),
        _ => KernelError::Rejected {
            operation,
            reason: stderr.to_string(),
        },
    }
}

#[derive(Debug, Deserialize)]
struct IpLink {
    ifindex: u32,
    ifname: String,
    #[serde(default)]
    flags: Vec<String>,
    #[serde(default)]
    mtu: u32,
    #[serde(default)]
    linkinfo: Option<IpLinkInfo>,
}

#[derive(Debug, Deserialize)]
struct IpLinkInfo {
    #[serde(default)]
    info_kind: String,
}

#[derive(Debug, Deserialize)]
struct IpRoute {
    dev: String,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IpAddrEntry {
    #[serde(default)]
    addr_info: Vec<IpAddrInfo>,
}

#[derive(Debug, Deserialize)]
struct IpAddrInfo {
    local: Option<IpAddr>,
    prefixlen: Option<u8>,
}

fn parse_links(json: &str) -> Result<Vec<LinkInfo>, KernelError> {
    let links: Vec<IpLink> =
        serde_json::from_str(json).map_err(|e| KernelError::Parse(e.to_string()))?;
    Ok(links
        .into_iter()
        .map(|link| LinkInfo {
            index: link.ifindex,
            kind: link
                .linkinfo
                .map_or(LinkKind::Other(String::new()), |info| LinkKind::from_kind(&info.info_kind)),
            up: link.flags.iter().any(|f| f == "UP"),
            mtu: link.mtu,
            name: link.ifname,
        })
        .collect())
}

fn parse_addresses(json: &str) -> Result<Vec<IpNet>, KernelError> {
    let entries: Vec<IpAddrEntry> =
        serde_json::from_str(json).map_err(|e| KernelError::Parse(e.to_string()))?;
    entries
        .into_iter()
        .flat_map(|entry| entry.addr_info)
        .filter_map(|info| info.local.zip(info.prefixlen))
        .map(|(ip, prefix)| {
            IpNet::new(ip, prefix).map_err(|e| KernelError::Parse(format!("{ip}/{prefix}: {e}")))
        })
        .collect()
}

/// Parses `ip -j route show exact <dst>`. `dst` is printed without a
/// prefix length for host routes, so the caller's destination is kept.
fn parse_route(destination: IpNet, json: &str) -> Result<Option<Route>, KernelError> {
    let routes: Vec<IpRoute> =
        serde_json::from_str(json).map_err(|e| KernelError::Parse(e.to_string()))?;
    Ok(routes.into_iter().next().map(|r| Route {
        destination,
        link: r.dev,
        scope: match r.scope.as_deref() {
            Some("link") => RouteScope::Link,
            _ => RouteScope::Universe,
        },
    }))
}

impl KernelGateway for IpCommand {
    async fn link_add(&self, name: &str, kind: LinkKind) -> Result<(), KernelError> {
        self.exec("link_add", name, false, &["link", "add", "dev", name, "type", kind.as_str()])
            .await
            .map(drop)
    }

    async fn link_del(&self, name: &str) -> Result<(), KernelError> {
        self.exec("link_del", name, false, &["link", "del", "dev", name])
            .await
            .map(drop)
    }

    async fn link_by_name(&self, name: &str) -> Result<Option<LinkInfo>, KernelError> {
        match self.exec("link_show", name, true, &["link", "show", "dev", name]).await {
            Ok(stdout) => Ok(parse_links(&stdout)?.into_iter().find(|l| l.name == name)),
            Err(KernelError::LinkNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn link_set_up(&self, name: &str) -> Result<(), KernelError> {
        self.exec("link_set_up", name, false, &["link", "set", "dev", name, "up"])
            .await
            .map(drop)
    }

    async fn link_set_down(&self, name: &str) -> Result<(), KernelError> {
        self.exec("link_set_down", name, false, &["link", "set", "dev", name, "down"])
            .await
            .map(drop)
    }

    async fn link_set_mtu(&self, name: &str, mtu: u32) -> Result<(), KernelError> {
        let mtu = mtu.to_string();
        self.exec("link_set_mtu", name, false, &["link", "set", "dev", name, "mtu", &mtu])
            .await
            .map(drop)
    }

    async fn link_set_name(&self, name: &str, new_name: &str) -> Result<(), KernelError> {
        if name == new_name {
            return Ok(());
        }
        self.exec("link_set_name", name, false, &["link", "set", "dev", name, "name", new_name])
            .await
            .map(drop)
    }

    async fn addr_list(&self, name: &str) -> Result<Vec<IpNet>, KernelError> {
        let stdout = self.exec("addr_list", name, true, &["addr", "show", "dev", name]).await?;
        parse_addresses(&stdout)
    }

    async fn addr_add(&self, name: &str, addr: IpNet) -> Result<(), KernelError> {
        let cidr = addr.to_string();
        self.exec("addr_add", &cidr, false, &["addr", "add", &cidr, "dev", name])
            .await
            .map(drop)
    }

    async fn addr_del(&self, name: &str, addr: IpNet) -> Result<(), KernelError> {
        let cidr = addr.to_string();
        self.exec("addr_del", &cidr, false, &["addr", "del", &cidr, "dev", name])
            .await
            .map(drop)
    }

    async fn route_add(&self, route: &Route) -> Result<(), KernelError> {
        let dst = route.destination.to_string();
        let args = ["route", "add", &dst, "dev", &route.link, "scope", route.scope.as_str()];
        self.exec("route_add", &route.to_string(), false, &args)
            .await
            .map(drop)
    }

    async fn route_del(&self, route: &Route) -> Result<(), KernelError> {
        let dst = route.destination.to_string();
        let args = ["route", "del", &dst, "dev", &route.link, "scope", route.scope.as_str()];
        self.exec("route_del", &route.to_string(), false, &args)
            .await
            .map(drop)
    }

    async fn route_get(&self, destination: IpNet) -> Result<Option<Route>, KernelError> {
        let destination = destination.trunc();
        let dst = destination.to_string();
        let stdout = self
            .exec("route_get", &dst, true, &["route", "show", "exact", &dst])
            .await?;
        if stdout.trim().is_empty() {
            return Ok(None);
        }
        parse_route(destination, &stdout)
    }
}
