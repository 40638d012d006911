//! Integration tests for peer operations.

mod common;

use common::{base_link, base_peer, key, peer, Harness, PEER_KEY, PEER_KEY_1, PEER_KEY_2};
use linkward_engine::{EngineError, ErrorKind};
use linkward_registry::Peer;
use linkward_wireguard::{KernelGateway, Route};

async fn loaded() -> Harness {
    let h = Harness::new();
    h.engine
        .add_link(base_link().with_enable(true))
        .await
        .expect("add link");
    h
}

fn route(cidr: &str) -> Route {
    Route::link_scoped(cidr.parse().expect("cidr"), "wg-linko")
}

// ============================================================================
// AddPeer
// ============================================================================

#[tokio::test]
async fn test_add_disabled_peer_is_registered_only() {
    let h = loaded().await;
    h.engine.add_peer("wg-linko", base_peer()).await.expect("add");

    assert_eq!(h.engine.peer("wg-linko", "zoz-pc").await.expect("stored"), base_peer());
    let device = h.engine.device_status("wg-linko").await.expect("device");
    assert!(device.peers.is_empty());
    assert!(h.ns.routes().await.is_empty());
}

#[tokio::test]
async fn test_add_enabled_peer_on_loaded_link_activates_it() {
    let h = loaded().await;
    h.engine
        .add_peer("wg-linko", base_peer().with_enable(true))
        .await
        .expect("add");

    let device = h.engine.device_status("wg-linko").await.expect("device");
    let status = device.peer(&key(PEER_KEY)).expect("device peer");
    assert_eq!(status.allowed_ips, base_peer().allowed_ips);
    assert_eq!(status.endpoint, base_peer().endpoint);
    assert_eq!(h.ns.routes_via("wg-linko").await, vec![route("10.9.6.2/32"), route("10.9.6.10/32")]);
}

#[tokio::test]
async fn test_add_enabled_peer_on_unloaded_link_is_registered_only() {
    let h = Harness::new();
    h.engine.add_link(base_link()).await.expect("add link");
    h.engine
        .add_peer("wg-linko", base_peer().with_enable(true))
        .await
        .expect("add");

    assert!(h.ns.link_names().await.is_empty());
    assert!(h.engine.peer("wg-linko", "zoz-pc").await.expect("stored").enable);
}

#[tokio::test]
async fn test_add_peer_to_missing_link_is_not_found() {
    let h = Harness::new();
    let err = h.engine.add_peer("wg-linko", base_peer()).await.expect_err("missing link");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_add_peer_duplicate_name_conflicts() {
    let h = loaded().await;
    h.engine.add_peer("wg-linko", base_peer()).await.expect("add");

    let again = Peer::new("zoz-pc", key(PEER_KEY_1));
    let err = h.engine.add_peer("wg-linko", again).await.expect_err("duplicate");
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(h.registry.peer_count(), 1);
}

#[tokio::test]
async fn test_add_peer_duplicate_public_key_conflicts() {
    let h = loaded().await;
    h.engine.add_peer("wg-linko", base_peer()).await.expect("add");

    let twin = Peer::new("zoz-laptop", key(PEER_KEY));
    let err = h.engine.add_peer("wg-linko", twin).await.expect_err("same key");
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(h.registry.peer_count(), 1);
}

#[tokio::test]
async fn test_add_peer_with_empty_name_is_rejected() {
    let h = loaded().await;
    let err = h
        .engine
        .add_peer("wg-linko", Peer::new("", key(PEER_KEY)))
        .await
        .expect_err("empty name");
    assert_eq!(err.kind(), ErrorKind::Validation);
}

// ============================================================================
// ActivatePeer / DeactivatePeer
// ============================================================================

#[tokio::test]
async fn test_activate_peer_on_unloaded_link_fails() {
    let h = Harness::new();
    h.engine.add_link(base_link()).await.expect("add link");
    h.engine.add_peer("wg-linko", base_peer()).await.expect("add peer");

    let err = h.engine.activate_peer("wg-linko", "zoz-pc").await.expect_err("not loaded");
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(matches!(err, EngineError::LinkNotLoaded { ref name } if name == "wg-linko"));
    assert!(!h.engine.peer("wg-linko", "zoz-pc").await.expect("stored").enable);
}

#[tokio::test]
async fn test_activate_peer_installs_device_entry_and_routes() {
    let h = loaded().await;
    h.engine.add_peer("wg-linko", base_peer()).await.expect("add");

    h.engine.activate_peer("wg-linko", "zoz-pc").await.expect("activate");

    let device = h.engine.device_status("wg-linko").await.expect("device");
    assert_eq!(device.peers.len(), 1);
    assert_eq!(h.ns.routes_via("wg-linko").await.len(), 2);
    assert!(h.engine.peer("wg-linko", "zoz-pc").await.expect("stored").enable);
}

#[tokio::test]
async fn test_activate_peer_twice_converges() {
    let h = loaded().await;
    h.engine.add_peer("wg-linko", base_peer()).await.expect("add");
    h.engine.activate_peer("wg-linko", "zoz-pc").await.expect("first");
    h.engine.activate_peer("wg-linko", "zoz-pc").await.expect("second");

    let device = h.engine.device_status("wg-linko").await.expect("device");
    assert_eq!(device.peers.len(), 1);
    assert_eq!(h.ns.routes_via("wg-linko").await.len(), 2);
}

#[tokio::test]
async fn test_two_peers_give_two_device_entries() {
    let h = loaded().await;
    h.engine.add_peer("wg-linko", peer("one", PEER_KEY_1, 1)).await.expect("one");
    h.engine.add_peer("wg-linko", peer("two", PEER_KEY_2, 2)).await.expect("two");

    let device = h.engine.device_status("wg-linko").await.expect("device");
    assert_eq!(device.peers.len(), 2);
    assert!(device.peer(&key(PEER_KEY_1)).is_some());
    assert!(device.peer(&key(PEER_KEY_2)).is_some());
}

#[tokio::test]
async fn test_deactivate_peer_removes_device_entry_and_routes() {
    let h = loaded().await;
    h.engine.add_peer("wg-linko", peer("one", PEER_KEY_1, 1)).await.expect("one");
    h.engine.add_peer("wg-linko", peer("two", PEER_KEY_2, 2)).await.expect("two");

    h.engine.deactivate_peer("wg-linko", "one").await.expect("deactivate");

    let device = h.engine.device_status("wg-linko").await.expect("device");
    assert_eq!(device.peers.len(), 1);
    assert!(device.peer(&key(PEER_KEY_1)).is_none());
    assert_eq!(h.ns.routes_via("wg-linko").await, vec![route("10.9.7.2/32")]);
    assert!(!h.engine.peer("wg-linko", "one").await.expect("stored").enable);
}

#[tokio::test]
async fn test_deactivate_peer_tolerates_missing_route() {
    let h = loaded().await;
    h.engine
        .add_peer("wg-linko", base_peer().with_enable(true))
        .await
        .expect("add");
    h.ns.route_del(&route("10.9.6.2/32")).await.expect("manual removal");

    h.engine.deactivate_peer("wg-linko", "zoz-pc").await.expect("deactivate");

    assert!(h.ns.routes().await.is_empty());
    let device = h.engine.device_status("wg-linko").await.expect("device");
    assert!(device.peers.is_empty());
}

#[tokio::test]
async fn test_deactivate_peer_on_unloaded_link_fails() {
    let h = Harness::new();
    h.engine.add_link(base_link()).await.expect("add link");
    h.engine.add_peer("wg-linko", base_peer()).await.expect("add peer");

    let err = h.engine.deactivate_peer("wg-linko", "zoz-pc").await.expect_err("not loaded");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_peer_on_down_link_defers_routes_until_activation() {
    let h = loaded().await;
    h.engine.deactivate_link("wg-linko").await.expect("down");
    h.engine.add_peer("wg-linko", base_peer()).await.expect("add");

    h.engine.activate_peer("wg-linko", "zoz-pc").await.expect("activate");
    assert!(h.ns.routes().await.is_empty());
    let device = h.engine.device_status("wg-linko").await.expect("device");
    assert_eq!(device.peers.len(), 1);

    h.engine.activate_link("wg-linko").await.expect("up");
    assert_eq!(h.ns.routes_via("wg-linko").await.len(), 2);
}

// ============================================================================
// UpdatePeer
// ============================================================================

#[tokio::test]
async fn test_update_enabled_peer_replaces_device_entry() {
    let h = loaded().await;
    h.engine.add_peer("wg-linko", peer("one", PEER_KEY_1, 1)).await.expect("add");

    let replacement = Peer::new("one", key(PEER_KEY_2))
        .with_allowed_ip("10.9.8.1/32".parse().expect("cidr"))
        .with_enable(true);
    h.engine.update_peer("wg-linko", "one", replacement).await.expect("update");

    let device = h.engine.device_status("wg-linko").await.expect("device");
    assert_eq!(device.peers.len(), 1);
    assert!(device.peer(&key(PEER_KEY_2)).is_some());
    assert_eq!(h.ns.routes_via("wg-linko").await, vec![route("10.9.8.1/32")]);
}

#[tokio::test]
async fn test_update_peer_to_disabled_tears_it_down() {
    let h = loaded().await;
    h.engine.add_peer("wg-linko", peer("one", PEER_KEY_1, 1)).await.expect("add");

    let disabled = peer("one", PEER_KEY_1, 1).with_enable(false);
    h.engine.update_peer("wg-linko", "one", disabled).await.expect("update");

    let device = h.engine.device_status("wg-linko").await.expect("device");
    assert!(device.peers.is_empty());
    assert!(h.ns.routes().await.is_empty());
    assert!(!h.engine.peer("wg-linko", "one").await.expect("stored").enable);
}

#[tokio::test]
async fn test_update_peer_renames_it() {
    let h = loaded().await;
    h.engine.add_peer("wg-linko", peer("one", PEER_KEY_1, 1)).await.expect("add");

    h.engine
        .update_peer("wg-linko", "one", peer("uno", PEER_KEY_1, 1))
        .await
        .expect("rename");

    assert!(h.engine.peer("wg-linko", "one").await.is_err());
    assert!(h.engine.peer("wg-linko", "uno").await.expect("renamed").enable);
    assert_eq!(h.ns.routes_via("wg-linko").await.len(), 1);
}

#[tokio::test]
async fn test_update_peer_onto_sibling_name_conflicts() {
    let h = loaded().await;
    let one = peer("one", PEER_KEY_1, 1);
    let two = peer("two", PEER_KEY_2, 2);
    h.engine.add_peer("wg-linko", one.clone()).await.expect("one");
    h.engine.add_peer("wg-linko", two.clone()).await.expect("two");

    let clash = Peer {
        name: "two".into(),
        ..one.clone()
    };
    let err = h.engine.update_peer("wg-linko", "one", clash).await.expect_err("conflict");
    assert_eq!(err.kind(), ErrorKind::Conflict);

    assert_eq!(h.engine.peer("wg-linko", "one").await.expect("one"), one);
    assert_eq!(h.engine.peer("wg-linko", "two").await.expect("two"), two);
    let device = h.engine.device_status("wg-linko").await.expect("device");
    assert_eq!(device.peers.len(), 2);
}

#[tokio::test]
async fn test_update_peer_onto_sibling_key_conflicts() {
    let h = loaded().await;
    h.engine.add_peer("wg-linko", peer("one", PEER_KEY_1, 1)).await.expect("one");
    h.engine.add_peer("wg-linko", peer("two", PEER_KEY_2, 2)).await.expect("two");

    let err = h
        .engine
        .update_peer("wg-linko", "one", peer("one", PEER_KEY_2, 1))
        .await
        .expect_err("key taken");
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn test_update_missing_peer_is_not_found() {
    let h = loaded().await;
    let err = h
        .engine
        .update_peer("wg-linko", "zoz-pc", base_peer())
        .await
        .expect_err("missing");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// ============================================================================
// RemovePeer
// ============================================================================

#[tokio::test]
async fn test_remove_active_peer_drops_device_entry_and_routes() {
    let h = loaded().await;
    h.engine
        .add_peer("wg-linko", base_peer().with_enable(true))
        .await
        .expect("add");

    h.engine.remove_peer("wg-linko", "zoz-pc").await.expect("remove");

    let device = h.engine.device_status("wg-linko").await.expect("device");
    assert!(device.peers.is_empty());
    assert!(h.ns.routes().await.is_empty());
    assert_eq!(h.registry.peer_count(), 0);
}

#[tokio::test]
async fn test_remove_peer_of_unloaded_link() {
    let h = Harness::new();
    h.engine.add_link(base_link()).await.expect("add link");
    h.engine.add_peer("wg-linko", base_peer()).await.expect("add peer");

    h.engine.remove_peer("wg-linko", "zoz-pc").await.expect("remove");
    assert_eq!(h.registry.peer_count(), 0);
}

#[tokio::test]
async fn test_remove_missing_peer_is_not_found() {
    let h = loaded().await;
    let err = h.engine.remove_peer("wg-linko", "zoz-pc").await.expect_err("missing");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
