//! Wire protocol: message kinds and canonical encoding.
//!
//! All mesh traffic is JSON datagrams carrying one of three message kinds,
//! dispatched by the `type` tag. Signatures and HMACs are computed over the
//! *canonical* form of a payload: JSON with map keys in sorted order and the
//! `signature` field excluded. This rule is part of the protocol contract —
//! every participant must produce bit-identical canonical bytes — so it
//! lives in exactly one place (this module) instead of being rebuilt ad hoc
//! at each call site. All numeric fields are integral, keeping number
//! formatting trivially stable.

use crate::error::MeshResult;
use crate::security;
use anchormesh_identity::NodeIdentity;
use serde::{Deserialize, Serialize};

/// Node health as carried in announcements and exposed to SDK consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Node has a usable interface and is participating in the mesh.
    #[serde(rename = "HEALTHY")]
    Healthy,
    /// Node found no usable network interface; it is inert but alive.
    #[serde(rename = "DEGRADED")]
    Degraded,
}

/// The telemetry block of an `ANN` pulse. Signed and HMAC-stamped as a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAnnouncement {
    /// Salted hash of the node's name.
    pub name_hash: String,
    /// Salted hash of the node's type.
    pub type_hash: String,
    /// Logical zone.
    pub zone: String,
    /// Reachable service address, `[link-local-ip]:port`.
    pub address: String,
    /// Authority weight for anchor election.
    pub ego_score: u32,
    /// Seconds since the node started.
    pub uptime: u64,
    /// Hex-encoded Ed25519 public key.
    pub pubkey: String,
    /// Current health.
    pub status: HealthStatus,
}

/// Periodic presence pulse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Announce {
    /// Telemetry block the signature and HMAC cover.
    pub node: NodeAnnouncement,
    /// Sender timestamp, Unix milliseconds.
    pub ts: u64,
    /// Hex Ed25519 signature over the canonical `node` block.
    pub signature: String,
    /// Hex HMAC-SHA-256 of the canonical `node` block under the sender's
    /// current epoch key. Absent only for nodes that opt out of stamping.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hmac: Option<String>,
}

/// Anchor-only broadcast of a freshly rotated epoch secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Epoch {
    /// Hex-encoded 32-byte epoch key.
    pub key_hex: String,
    /// Link-local address of the anchor.
    pub anchor_id: String,
    /// Hex-encoded public key of the anchor.
    pub anchor_pubkey: String,
    /// Anchor's ego score; receivers reject lower-authority epochs.
    pub ego: u32,
    /// When this epoch began, Unix milliseconds.
    pub ts: u64,
    /// Hex Ed25519 signature over the canonical message minus this field.
    pub signature: String,
}

/// Signed demand for an immediate epoch broadcast, sent by nodes joining
/// or rejoining the mesh to shorten convergence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochRequest {
    /// Salted name hash of the requesting node.
    pub requester: String,
    /// Hex-encoded public key of the requester.
    pub pubkey: String,
    /// Request timestamp, Unix milliseconds.
    pub ts: u64,
    /// Hex Ed25519 signature over the canonical message minus this field.
    pub signature: String,
}

/// All wire message kinds, dispatched by the `type` tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WireMessage {
    /// Periodic presence pulse.
    #[serde(rename = "ANN")]
    Announce(Announce),
    /// Epoch secret broadcast from the anchor.
    #[serde(rename = "EPOCH")]
    Epoch(Epoch),
    /// Demand for an immediate epoch broadcast.
    #[serde(rename = "REQ_EPOCH")]
    EpochRequest(EpochRequest),
}

/// Encode a message for transmission.
pub fn encode(msg: &WireMessage) -> MeshResult<Vec<u8>> {
    Ok(serde_json::to_vec(msg)?)
}

/// Decode a received datagram. Any parse failure means the datagram is
/// silently dropped by the caller.
pub fn decode(payload: &[u8]) -> MeshResult<WireMessage> {
    Ok(serde_json::from_slice(payload)?)
}

/// Canonical bytes of any serializable payload: JSON with sorted map keys.
///
/// Round-tripping through `serde_json::Value` is what sorts the keys —
/// its map type keeps entries in key order.
pub fn canonical_bytes<T: Serialize>(value: &T) -> MeshResult<Vec<u8>> {
    let v = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&v)?)
}

/// Canonical bytes of a full message with the top-level `signature` field
/// excluded. This is the exact byte string EPOCH and REQ_EPOCH signatures
/// cover.
pub fn signing_bytes(msg: &WireMessage) -> MeshResult<Vec<u8>> {
    let mut v = serde_json::to_value(msg)?;
    if let Some(map) = v.as_object_mut() {
        map.remove("signature");
    }
    Ok(serde_json::to_vec(&v)?)
}

/// Build a signed, HMAC-stamped `ANN` pulse.
pub fn build_announce(
    identity: &NodeIdentity,
    node: NodeAnnouncement,
    ts: u64,
    epoch_key: &[u8; 32],
) -> MeshResult<WireMessage> {
    let payload = canonical_bytes(&node)?;
    let signature = identity.sign(&payload);
    let hmac = security::compute_hmac(epoch_key, &payload);

    Ok(WireMessage::Announce(Announce {
        node,
        ts,
        signature,
        hmac: Some(hmac),
    }))
}

/// Build a signed `EPOCH` broadcast carrying a freshly generated key.
pub fn build_epoch(
    identity: &NodeIdentity,
    epoch_key: &[u8; 32],
    anchor_id: String,
    ego: u32,
    ts: u64,
) -> MeshResult<WireMessage> {
    let mut epoch = Epoch {
        key_hex: hex::encode(epoch_key),
        anchor_id,
        anchor_pubkey: identity.pubkey_hex().to_string(),
        ego,
        ts,
        signature: String::new(),
    };

    let payload = signing_bytes(&WireMessage::Epoch(epoch.clone()))?;
    epoch.signature = identity.sign(&payload);
    Ok(WireMessage::Epoch(epoch))
}

/// Build a signed `REQ_EPOCH` demand.
pub fn build_epoch_request(
    identity: &NodeIdentity,
    requester: String,
    ts: u64,
) -> MeshResult<WireMessage> {
    let mut request = EpochRequest {
        requester,
        pubkey: identity.pubkey_hex().to_string(),
        ts,
        signature: String::new(),
    };

    let payload = signing_bytes(&WireMessage::EpochRequest(request.clone()))?;
    request.signature = identity.sign(&payload);
    Ok(WireMessage::EpochRequest(request))
}
