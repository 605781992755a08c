//! Configuration management for Anchormesh.
//!
//! All protocol constants (multicast endpoint, hash salt, timing windows)
//! are threaded through this struct rather than read from process-wide
//! globals, so several nodes with different settings can coexist in one
//! test process.

use crate::error::CoreError;
use serde::Deserialize;
use std::net::Ipv6Addr;
use std::path::Path;
use std::time::Duration;

/// Well-known multicast group for mesh traffic (all-nodes, link-local scope).
pub const DEFAULT_MULTICAST_GROUP: Ipv6Addr = Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 1);

/// Well-known multicast port for mesh traffic.
pub const DEFAULT_MULTICAST_PORT: u16 = 19541;

/// Runtime configuration for a single mesh node.
#[derive(Debug, Clone)]
pub struct MeshConfig {
    /// Human-readable node name (hashed before it reaches the wire).
    pub name: String,
    /// Node type label (hashed before it reaches the wire).
    pub node_type: String,
    /// Logical zone this node belongs to.
    pub zone: String,
    /// Port advertised to peers as this node's service endpoint.
    pub advertised_port: u16,
    /// Authority weight used by anchor election. Highest wins.
    pub ego_score: u32,
    /// Salt mixed into name/type hashes. Nodes sharing a salt produce
    /// identical hashes for the same logical name.
    pub salt: String,
    /// Multicast group the mesh announces on.
    pub multicast_group: Ipv6Addr,
    /// Multicast port the mesh announces on.
    pub multicast_port: u16,
    /// Delay between presence pulses.
    pub announce_interval: Duration,
    /// Anchor silence beyond this triggers failover evaluation.
    pub anchor_silence: Duration,
    /// Anchor rotates the epoch key after this long.
    pub epoch_rotate: Duration,
    /// A promotion candidate must stay eligible this long before it
    /// actually becomes anchor.
    pub failover_hysteresis: Duration,
    /// Minimum gap between epoch broadcasts triggered by REQ_EPOCH.
    pub epoch_response_min_gap: Duration,
    /// Peers unseen for longer than this are evicted. `None` keeps peers
    /// forever, matching the protocol's default behavior.
    pub peer_ttl: Option<Duration>,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            name: "anchormesh-node".to_string(),
            node_type: "Bridge".to_string(),
            zone: "mesh-0".to_string(),
            advertised_port: 8080,
            ego_score: 100,
            salt: "anchormesh-default".to_string(),
            multicast_group: DEFAULT_MULTICAST_GROUP,
            multicast_port: DEFAULT_MULTICAST_PORT,
            announce_interval: Duration::from_secs(5),
            anchor_silence: Duration::from_secs(15),
            epoch_rotate: Duration::from_secs(60),
            failover_hysteresis: Duration::from_secs(5),
            epoch_response_min_gap: Duration::from_secs(2),
            peer_ttl: None,
        }
    }
}

/// On-disk representation of [`MeshConfig`]. Every field is optional;
/// missing fields fall back to the defaults above.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    name: Option<String>,
    node_type: Option<String>,
    zone: Option<String>,
    advertised_port: Option<u16>,
    ego_score: Option<u32>,
    salt: Option<String>,
    multicast: Option<MulticastSection>,
    timing: Option<TimingSection>,
}

#[derive(Debug, Default, Deserialize)]
struct MulticastSection {
    group: Option<Ipv6Addr>,
    port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct TimingSection {
    announce_interval_ms: Option<u64>,
    anchor_silence_ms: Option<u64>,
    epoch_rotate_ms: Option<u64>,
    failover_hysteresis_ms: Option<u64>,
    epoch_response_min_gap_ms: Option<u64>,
    peer_ttl_ms: Option<u64>,
}

impl MeshConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// any field the file does not set.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        let file: ConfigFile =
            toml::from_str(&content).map_err(|e| CoreError::Config(e.to_string()))?;
        Ok(Self::default().merged(file))
    }

    /// Apply `ANCHORMESH_*` environment overrides on top of the current
    /// values. Unset variables leave the corresponding field untouched.
    pub fn apply_env(mut self) -> Self {
        if let Ok(v) = std::env::var("ANCHORMESH_NAME") {
            self.name = v;
        }
        if let Ok(v) = std::env::var("ANCHORMESH_TYPE") {
            self.node_type = v;
        }
        if let Ok(v) = std::env::var("ANCHORMESH_ZONE") {
            self.zone = v;
        }
        if let Ok(v) = std::env::var("ANCHORMESH_SALT") {
            self.salt = v;
        }
        if let Ok(v) = std::env::var("ANCHORMESH_PORT") {
            if let Ok(port) = v.parse() {
                self.advertised_port = port;
            }
        }
        if let Ok(v) = std::env::var("ANCHORMESH_EGO") {
            if let Ok(ego) = v.parse() {
                self.ego_score = ego;
            }
        }
        self
    }

    fn merged(mut self, file: ConfigFile) -> Self {
        if let Some(v) = file.name {
            self.name = v;
        }
        if let Some(v) = file.node_type {
            self.node_type = v;
        }
        if let Some(v) = file.zone {
            self.zone = v;
        }
        if let Some(v) = file.advertised_port {
            self.advertised_port = v;
        }
        if let Some(v) = file.ego_score {
            self.ego_score = v;
        }
        if let Some(v) = file.salt {
            self.salt = v;
        }
        if let Some(m) = file.multicast {
            if let Some(group) = m.group {
                self.multicast_group = group;
            }
            if let Some(port) = m.port {
                self.multicast_port = port;
            }
        }
        if let Some(t) = file.timing {
            if let Some(ms) = t.announce_interval_ms {
                self.announce_interval = Duration::from_millis(ms);
            }
            if let Some(ms) = t.anchor_silence_ms {
                self.anchor_silence = Duration::from_millis(ms);
            }
            if let Some(ms) = t.epoch_rotate_ms {
                self.epoch_rotate = Duration::from_millis(ms);
            }
            if let Some(ms) = t.failover_hysteresis_ms {
                self.failover_hysteresis = Duration::from_millis(ms);
            }
            if let Some(ms) = t.epoch_response_min_gap_ms {
                self.epoch_response_min_gap = Duration::from_millis(ms);
            }
            if let Some(ms) = t.peer_ttl_ms {
                self.peer_ttl = Some(Duration::from_millis(ms));
            }
        }
        self
    }
}
