//! Security validation for inbound protocol messages.
//!
//! Two independent fail-closed filters run over canonical payload bytes:
//!
//! 1. HMAC-SHA-256 under the shared epoch secret — cheap, excludes
//!    non-members and stale-epoch traffic before any signature math.
//! 2. Ed25519 signature under the claimed sender key — expensive, defeats
//!    forgery even by holders of a valid epoch key.
//!
//! Every decode or verification failure results in a drop, never an error
//! propagated to the transport loop and never a reply.

use crate::wire::{self, Announce, Epoch, WireMessage};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute the hex HMAC-SHA-256 of `payload` under `key`.
pub fn compute_hmac(key: &[u8; 32], payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a claimed hex HMAC over `payload` under `key`.
///
/// Comparison is constant-time via the `Mac` verifier.
pub fn verify_hmac(key: &[u8; 32], payload: &[u8], claimed_hex: &str) -> bool {
    let Ok(claimed) = hex::decode(claimed_hex) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(payload);
    mac.verify_slice(&claimed).is_ok()
}

/// Validate an `ANN` pulse: optional HMAC noise filter first, then the
/// Ed25519 identity filter over the canonical `node` block.
///
/// Returns the canonical payload bytes on success so the caller does not
/// serialize twice.
pub fn validate_announce(epoch_key: &[u8; 32], ann: &Announce) -> Result<Vec<u8>, DropReason> {
    let payload = wire::canonical_bytes(&ann.node).map_err(|_| DropReason::Malformed)?;

    if let Some(claimed) = &ann.hmac {
        if !verify_hmac(epoch_key, &payload, claimed) {
            return Err(DropReason::HmacMismatch);
        }
    }

    anchormesh_identity::verify_hex(&ann.node.pubkey, &payload, &ann.signature)
        .map_err(|_| DropReason::BadSignature)?;

    Ok(payload)
}

/// Validate an `EPOCH` broadcast against the local ego score and the
/// anchor's claimed public key.
pub fn validate_epoch(local_ego: u32, epoch: &Epoch) -> Result<(), DropReason> {
    // Lower-authority nodes cannot usurp epoch truth
    if epoch.ego < local_ego {
        return Err(DropReason::InsufficientAuthority);
    }

    let payload = wire::signing_bytes(&WireMessage::Epoch(epoch.clone()))
        .map_err(|_| DropReason::Malformed)?;

    anchormesh_identity::verify_hex(&epoch.anchor_pubkey, &payload, &epoch.signature)
        .map_err(|_| DropReason::BadSignature)
}

/// Why an inbound message was dropped. Authentication failures are
/// security-relevant events distinct from malformed input, but both get
/// the same fail-closed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Could not be canonicalized or parsed.
    Malformed,
    /// HMAC did not match the locally held epoch key.
    HmacMismatch,
    /// Ed25519 verification failed.
    BadSignature,
    /// EPOCH advertised a lower ego score than ours.
    InsufficientAuthority,
}
