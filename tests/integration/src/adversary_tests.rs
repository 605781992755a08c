//! Adversarial traffic against a converged mesh.
//!
//! An attacker on the same link can inject arbitrary datagrams; these
//! scenarios check that nothing it sends moves peer tables or anchor
//! state, and that epoch requests cannot be amplified.

use crate::test_utils::{link_local, sim_config, SimMesh, SALT};
use anchormesh_identity::NodeIdentity;
use anchormesh_mesh::wire::{self, build_announce, build_epoch, build_epoch_request};
use anchormesh_mesh::wire::{HealthStatus, NodeAnnouncement, WireMessage};
use anchormesh_mesh::MeshNode;
use std::net::IpAddr;

const ATTACKER_HOST: u16 = 9;

/// Anchor (host 1) plus one synced member (host 2).
fn converged_pair() -> (SimMesh, u64) {
    let mut mesh = SimMesh::new();
    mesh.add("anchor", 100);
    let t0 = mesh.t0();
    mesh.tick(t0 + 1000);

    let member = mesh.add("member", 50);
    let req = mesh.node(member).sync_request(t0 + 2000).unwrap();
    mesh.inject(wire::encode(&req).unwrap(), 2, t0 + 2000);
    mesh.tick(t0 + 6000);

    assert_eq!(mesh.anchors(), vec![0]);
    (mesh, t0)
}

fn attacker_announcement(identity: &NodeIdentity) -> NodeAnnouncement {
    NodeAnnouncement {
        name_hash: identity.hash_id("intruder"),
        type_hash: identity.hash_id("Relay"),
        zone: "sim".to_string(),
        address: "[fe80::9]:8080".to_string(),
        ego_score: 9000,
        uptime: 1,
        pubkey: identity.pubkey_hex().to_string(),
        status: HealthStatus::Healthy,
    }
}

#[test]
fn test_pulses_without_the_epoch_key_never_enter_tables() {
    let (mut mesh, t0) = converged_pair();
    let attacker = NodeIdentity::generate(SALT);

    // Correctly signed, but stamped under a key the mesh does not hold
    for i in 0..5u64 {
        let msg = build_announce(
            &attacker,
            attacker_announcement(&attacker),
            t0 + 7000 + i * 100,
            &[7u8; 32],
        )
        .unwrap();
        mesh.inject(wire::encode(&msg).unwrap(), ATTACKER_HOST, t0 + 7000 + i * 100);
    }

    assert_eq!(mesh.node(0).discover("*").len(), 1);
    assert_eq!(mesh.node(1).discover("*").len(), 1);
}

#[test]
fn test_tampered_pulse_fails_the_signature_filter() {
    let (mut mesh, t0) = converged_pair();
    let attacker = NodeIdentity::generate(SALT);

    // Replay-style tamper: strip the stamp, inflate the ego score in the
    // raw JSON, keep the original signature
    let msg = build_announce(
        &attacker,
        attacker_announcement(&attacker),
        t0 + 7000,
        &[7u8; 32],
    )
    .unwrap();
    let mut raw: serde_json::Value =
        serde_json::from_slice(&wire::encode(&msg).unwrap()).unwrap();
    raw.as_object_mut().unwrap().remove("hmac");
    raw["node"]["ego_score"] = serde_json::json!(1);
    mesh.inject(serde_json::to_vec(&raw).unwrap(), ATTACKER_HOST, t0 + 7000);

    assert_eq!(mesh.node(0).discover("*").len(), 1);
    assert_eq!(mesh.node(1).discover("*").len(), 1);
}

#[test]
fn test_tampered_epoch_cannot_usurp_the_anchor() {
    let (mut mesh, t0) = converged_pair();
    let attacker = NodeIdentity::generate(SALT);

    // Sign a legitimate-looking epoch, then swap the key after signing
    let WireMessage::Epoch(mut epoch) =
        build_epoch(&attacker, &[9u8; 32], "fe80::9".to_string(), 9000, t0 + 7000).unwrap()
    else {
        unreachable!()
    };
    epoch.key_hex = "00".repeat(32);
    mesh.inject(
        wire::encode(&WireMessage::Epoch(epoch)).unwrap(),
        ATTACKER_HOST,
        t0 + 7000,
    );

    assert_eq!(mesh.anchors(), vec![0]);
    assert_eq!(mesh.node(1).anchor_id().as_deref(), Some("fe80::1"));

    // The real epoch key still works end to end
    mesh.tick(t0 + 11_000);
    assert_eq!(mesh.node(0).discover("*").len(), 1);
}

#[test]
fn test_epoch_request_flood_is_not_amplified() {
    let (mesh, t0) = converged_pair();
    let attacker = NodeIdentity::generate(SALT);
    let req = wire::encode(
        &build_epoch_request(&attacker, attacker.hash_id("intruder"), t0 + 7000).unwrap(),
    )
    .unwrap();
    let from = IpAddr::V6(link_local(ATTACKER_HOST));

    let replies = (0..10u64)
        .filter(|i| {
            mesh.node(0)
                .handle_datagram(&req, from, t0 + 7000 + i * 100)
                .is_some()
        })
        .count();
    assert_eq!(replies, 1);

    // A fresh window earns exactly one more answer
    assert!(mesh
        .node(0)
        .handle_datagram(&req, from, t0 + 10_000)
        .is_some());
}

#[test]
fn test_garbage_floods_are_inert() {
    let (mut mesh, t0) = converged_pair();
    for payload in [&b"\x00\xff\x00\xff"[..], b"{]", b"{\"type\":\"ANN\"}"] {
        mesh.inject(payload.to_vec(), ATTACKER_HOST, t0 + 7000);
    }
    assert_eq!(mesh.anchors(), vec![0]);
    assert_eq!(mesh.node(0).discover("*").len(), 1);
}

#[tokio::test]
async fn test_lifecycle_is_idempotent_without_a_network() {
    let node = MeshNode::with_interface(sim_config("solo", 10), None);
    node.register().await.unwrap();
    node.close();
    node.close();
}
