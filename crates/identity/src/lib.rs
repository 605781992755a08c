//! Anchormesh Identity - per-process signing identity
//!
//! Every node generates a volatile Ed25519 keypair at startup (restart means
//! a new identity) and derives salted hashes that let peers correlate node
//! names across the mesh without seeing them in plaintext.

#![warn(missing_docs)]

pub mod error;
pub mod identity;

pub use error::IdentityError;
pub use identity::{verify_hex, NodeIdentity};
