//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use linkward_engine::{Engine, EngineConfig, HookError, HookRunner};
use linkward_registry::{Link, MemoryRegistry, Peer};
use linkward_wireguard::{FakeNamespace, PrivateKey, PublicKey};
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

pub const LINK_KEY: &str = "ZOZ+ngJZ2jf+sREdOi/b0D8rTGMbcjgSA854Jn2KbzQ=";
pub const PEER_KEY: &str = "4AQ6d+dvykkl4j6VG03e7VcciDbgn5mBEJFXMjn1pnU=";
pub const PEER_KEY_1: &str = "RND1ngJZ2jf+sREdOi/b0D8rTGMbcjgSA854Jn2KbzQ=";
pub const PEER_KEY_2: &str = "RND2ngJZ2jf+sREdOi/b0D8rTGMbcjgSA854Jn2KbzQ=";

/// Hook runner that records every command it is asked to run.
#[derive(Clone, Default)]
pub struct RecordingHooks {
    commands: Arc<Mutex<Vec<String>>>,
}

impl RecordingHooks {
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }
}

impl HookRunner for RecordingHooks {
    async fn run(&self, command: &str) -> Result<(), HookError> {
        self.commands.lock().push(command.to_string());
        if command.starts_with("fail") {
            return Err(HookError::Failed {
                command: command.to_string(),
                status: "exit status: 1".to_string(),
                stderr: String::new(),
            });
        }
        Ok(())
    }
}

pub type TestEngine = Engine<MemoryRegistry, FakeNamespace, FakeNamespace, RecordingHooks>;

/// An engine over a fresh registry and namespace, plus handles to both.
pub struct Harness {
    pub engine: TestEngine,
    pub registry: MemoryRegistry,
    pub ns: FakeNamespace,
    pub hooks: RecordingHooks,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        init_tracing();
        let registry = MemoryRegistry::new();
        let ns = FakeNamespace::new();
        let hooks = RecordingHooks::default();
        let engine = Engine::with_hooks(registry.clone(), ns.clone(), ns.clone(), hooks.clone(), config);
        Self {
            engine,
            registry,
            ns,
            hooks,
        }
    }
}

/// Routes engine logs to the test writer; `RUST_LOG=linkward_engine=debug`
/// shows them on failing tests.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn key(b64: &str) -> PublicKey {
    PublicKey::from_base64(b64).expect("valid public key")
}

/// A disabled dual-stack link named `wg-linko`.
pub fn base_link() -> Link {
    Link::new("wg-linko", PrivateKey::from_base64(LINK_KEY).expect("valid private key"))
        .with_mtu(1420)
        .with_listen_port(9977)
        .with_firewall_mark(42069)
        .with_ipv4("10.6.6.1/24".parse().expect("cidr"))
        .with_ipv6("2001::/32".parse().expect("cidr"))
        .with_dns(Some("1.1.1.1".parse().expect("ip")), None)
        .with_default_allowed_ip("10.6.6.1/24".parse().expect("cidr"))
        .with_default_allowed_ip("10.6.6.2/24".parse().expect("cidr"))
        .with_post_down("cmd1")
        .with_post_down("cmd2")
        .with_post_up("cmd3")
}

/// A disabled peer named `zoz-pc` with two host routes.
pub fn base_peer() -> Peer {
    Peer::new("zoz-pc", key(PEER_KEY))
        .with_allowed_ip("10.9.6.2/32".parse().expect("cidr"))
        .with_allowed_ip("10.9.6.10/32".parse().expect("cidr"))
        .with_endpoint("192.168.0.1:42064".parse().expect("endpoint"))
}

/// An enabled peer with one host route in `10.9.7.0/24`.
pub fn peer(name: &str, public_key: &str, host: u8) -> Peer {
    Peer::new(name, key(public_key))
        .with_allowed_ip(format!("10.9.7.{host}/32").parse().expect("cidr"))
        .with_enable(true)
}
