//! Simulation harness: several mesh nodes on an in-process datagram bus.

use anchormesh_core::MeshConfig;
use anchormesh_mesh::transport::LinkLocalInterface;
use anchormesh_mesh::{wire, MeshNode};
use std::collections::VecDeque;
use std::net::{IpAddr, Ipv6Addr};
use std::time::Duration;

/// Shared salt: every simulated node hashes names identically.
pub const SALT: &str = "sim-salt";

/// Deterministic per-node link-local address, `fe80::<host>`.
pub fn link_local(host: u16) -> Ipv6Addr {
    Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, host)
}

/// Base config for simulated nodes. Peer TTL is enabled so dead nodes age
/// out of election inputs the way a long-running deployment would prune
/// them.
pub fn sim_config(name: &str, ego: u32) -> MeshConfig {
    MeshConfig {
        name: name.to_string(),
        zone: "sim".to_string(),
        ego_score: ego,
        salt: SALT.to_string(),
        peer_ttl: Some(Duration::from_secs(12)),
        ..MeshConfig::default()
    }
}

struct SimNode {
    node: MeshNode,
    host: u16,
}

/// An in-process mesh. Every datagram any node emits is flooded to every
/// node (multicast loopback included), replies recursively, all at a
/// caller-controlled time.
#[derive(Default)]
pub struct SimMesh {
    nodes: Vec<SimNode>,
}

impl SimMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node with the given name and ego score. Hosts are numbered
    /// from 1, so node `i` lives at `fe80::<i+1>`.
    pub fn add(&mut self, name: &str, ego: u32) -> usize {
        self.add_with_config(sim_config(name, ego))
    }

    /// Add a node with a fully custom config.
    pub fn add_with_config(&mut self, config: MeshConfig) -> usize {
        let host = (self.nodes.len() + 1) as u16;
        let iface = LinkLocalInterface {
            name: format!("sim{host}"),
            index: u32::from(host),
            addr: link_local(host),
        };
        self.nodes.push(SimNode {
            node: MeshNode::with_interface(config, Some(iface)),
            host,
        });
        self.nodes.len() - 1
    }

    pub fn node(&self, idx: usize) -> &MeshNode {
        &self.nodes[idx].node
    }

    /// Take a node off the air. Its peer-table entries elsewhere decay
    /// through TTL eviction, exactly as if the process had died.
    pub fn kill(&mut self, idx: usize) {
        self.nodes.remove(idx);
    }

    /// A time origin later than every node's start, so peers first seen
    /// during the simulation always rank junior to running nodes.
    pub fn t0(&self) -> u64 {
        self.nodes
            .iter()
            .map(|s| s.node.start_time())
            .max()
            .unwrap_or(0)
    }

    /// Run one announcer tick on every node at `now` and flood everything
    /// produced, including replies to replies.
    pub fn tick(&mut self, now: u64) {
        let mut queue: VecDeque<(Vec<u8>, u16)> = VecDeque::new();
        for sim in &self.nodes {
            for msg in sim.node.announce_tick(now) {
                queue.push_back((wire::encode(&msg).unwrap(), sim.host));
            }
        }
        self.flood(queue, now);
    }

    /// Deliver one raw datagram, as if sent from `fe80::<from_host>`.
    pub fn inject(&mut self, payload: Vec<u8>, from_host: u16, now: u64) {
        self.flood(VecDeque::from([(payload, from_host)]), now);
    }

    /// Indices of nodes currently holding anchorship.
    pub fn anchors(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, s)| s.node.is_anchor())
            .map(|(i, _)| i)
            .collect()
    }

    fn flood(&mut self, mut queue: VecDeque<(Vec<u8>, u16)>, now: u64) {
        while let Some((payload, from)) = queue.pop_front() {
            let sender = IpAddr::V6(link_local(from));
            for sim in &self.nodes {
                if let Some(reply) = sim.node.handle_datagram(&payload, sender, now) {
                    queue.push_back((wire::encode(&reply).unwrap(), sim.host));
                }
            }
        }
    }
}
