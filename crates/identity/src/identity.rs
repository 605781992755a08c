//! Node identity: volatile Ed25519 session keys and salted name hashing.
//!
//! # Security Model
//!
//! - The private key is generated in-process and never leaves it.
//! - Signatures are computed over canonical payload bytes supplied by the
//!   caller; this module does not decide what gets signed.
//! - Name/type hashes are `SHA-256(value ":" salt)` truncated to 16 hex
//!   characters: long enough to key a peer table, short enough to keep
//!   pulses small, and stable across every node sharing the salt.

use crate::error::IdentityError;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Number of hex characters kept from a salted identity hash.
const ID_HASH_LEN: usize = 16;

/// A per-process signing identity.
pub struct NodeIdentity {
    signing_key: SigningKey,
    public_key: [u8; 32],
    pubkey_hex: String,
    salt: String,
}

impl NodeIdentity {
    /// Generate a fresh identity. There is no persistence: a restarted node
    /// is a new cryptographic principal.
    pub fn generate(salt: impl Into<String>) -> Self {
        let mut secret_bytes = [0u8; 32];
        OsRng.fill_bytes(&mut secret_bytes);

        let signing_key = SigningKey::from_bytes(&secret_bytes);
        let public_key = signing_key.verifying_key().to_bytes();
        let pubkey_hex = hex::encode(public_key);

        Self {
            signing_key,
            public_key,
            pubkey_hex,
            salt: salt.into(),
        }
    }

    /// Raw public key bytes.
    pub fn public_key_bytes(&self) -> &[u8; 32] {
        &self.public_key
    }

    /// Hex encoding of the public key, as carried in wire messages.
    pub fn pubkey_hex(&self) -> &str {
        &self.pubkey_hex
    }

    /// Sign canonical payload bytes, returning the hex-encoded signature.
    pub fn sign(&self, payload: &[u8]) -> String {
        hex::encode(self.signing_key.sign(payload).to_bytes())
    }

    /// Salted identity hash used to obfuscate names and types on the wire.
    ///
    /// Two processes configured with the same salt produce identical hashes
    /// for the same logical value, which is what lets peers correlate
    /// announcements without learning plaintext names.
    pub fn hash_id(&self, value: &str) -> String {
        let digest = Sha256::digest(format!("{}:{}", value, self.salt).as_bytes());
        let mut hash = hex::encode(digest);
        hash.truncate(ID_HASH_LEN);
        hash
    }
}

impl std::fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        f.debug_struct("NodeIdentity")
            .field("pubkey", &self.pubkey_hex)
            .finish()
    }
}

/// Verify a hex-encoded Ed25519 signature over `payload` under a
/// hex-encoded public key.
pub fn verify_hex(
    pubkey_hex: &str,
    payload: &[u8],
    signature_hex: &str,
) -> Result<(), IdentityError> {
    let key_bytes: [u8; 32] = hex::decode(pubkey_hex)?
        .try_into()
        .map_err(|_| IdentityError::InvalidPublicKey)?;
    let key = VerifyingKey::from_bytes(&key_bytes).map_err(|_| IdentityError::InvalidPublicKey)?;

    let sig_bytes = hex::decode(signature_hex)?;
    let signature =
        Signature::from_slice(&sig_bytes).map_err(|_| IdentityError::InvalidSignature)?;

    key.verify(payload, &signature)
        .map_err(|_| IdentityError::InvalidSignature)
}
