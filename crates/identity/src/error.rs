//! Identity error types

use thiserror::Error;

/// Errors from key handling and signature verification.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Public key bytes were not a valid Ed25519 point
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Signature bytes were malformed or did not verify
    #[error("invalid signature")]
    InvalidSignature,

    /// A hex-encoded field could not be decoded
    #[error("invalid hex encoding: {0}")]
    Hex(#[from] hex::FromHexError),
}
