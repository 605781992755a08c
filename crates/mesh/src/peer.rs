//! Peer table: last-known records for every validated peer.
//!
//! Records are keyed by hashed node name and replaced wholesale on each
//! validated announcement, except for `first_seen`, which is pinned to the
//! first validated sighting — peer aging is monotonic and is what breaks
//! anchor-election ties.

use crate::wire::{HealthStatus, NodeAnnouncement};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Last-known state of one peer. Local bookkeeping fields (`first_seen`,
/// `last_seen`) never travel on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerRecord {
    /// Salted hash of the peer's name; also the table key.
    pub name_hash: String,
    /// Salted hash of the peer's type.
    pub type_hash: String,
    /// Logical zone.
    pub zone: String,
    /// Reachable service address.
    pub address: String,
    /// Authority weight.
    pub ego_score: u32,
    /// Seconds the peer reports being up.
    pub uptime: u64,
    /// Peer health at last announcement.
    pub status: HealthStatus,
    /// Last signature seen from this peer (hex).
    pub signature: String,
    /// When this node first validated the peer, Unix milliseconds (local).
    pub first_seen: u64,
    /// When this node last validated the peer, Unix milliseconds (local).
    pub last_seen: u64,
}

impl PeerRecord {
    /// Build a record from a validated announcement.
    pub fn from_announcement(node: &NodeAnnouncement, signature: &str, now: u64) -> Self {
        Self {
            name_hash: node.name_hash.clone(),
            type_hash: node.type_hash.clone(),
            zone: node.zone.clone(),
            address: node.address.clone(),
            ego_score: node.ego_score,
            uptime: node.uptime,
            status: node.status,
            signature: signature.to_string(),
            first_seen: now,
            last_seen: now,
        }
    }
}

/// Mapping from hashed node name to last-known peer record.
#[derive(Debug, Default)]
pub struct PeerTable {
    peers: HashMap<String, PeerRecord>,
}

impl PeerTable {
    /// Create an empty peer table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a peer record. The original `first_seen` survives
    /// updates so that seniority keeps accruing across announcements.
    pub fn upsert(&mut self, mut record: PeerRecord) {
        if let Some(existing) = self.peers.get(&record.name_hash) {
            record.first_seen = existing.first_seen;
        }
        self.peers.insert(record.name_hash.clone(), record);
    }

    /// Get a peer by hashed name.
    pub fn get(&self, name_hash: &str) -> Option<&PeerRecord> {
        self.peers.get(name_hash)
    }

    /// Peers in `zone`, or every peer for `"*"`.
    pub fn discover(&self, zone: &str) -> Vec<PeerRecord> {
        self.peers
            .values()
            .filter(|p| zone == "*" || p.zone == zone)
            .cloned()
            .collect()
    }

    /// Number of known peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether no peers are known.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Highest ego score among known peers.
    pub fn max_ego(&self) -> Option<u32> {
        self.peers.values().map(|p| p.ego_score).max()
    }

    /// Earliest first-seen timestamp among known peers.
    pub fn min_first_seen(&self) -> Option<u64> {
        self.peers.values().map(|p| p.first_seen).min()
    }

    /// Drop peers not validated within `ttl`. Returns how many were evicted.
    ///
    /// Only called when eviction is configured; the default keeps peers
    /// forever.
    pub fn evict_stale(&mut self, now: u64, ttl: Duration) -> usize {
        let ttl_ms = ttl.as_millis() as u64;
        let before = self.peers.len();
        self.peers
            .retain(|_, p| now.saturating_sub(p.last_seen) <= ttl_ms);
        before - self.peers.len()
    }
}
