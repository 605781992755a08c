//! Self-organizing IPv6 link-local multicast mesh.
//!
//! Nodes announce themselves over a well-known multicast group, validate
//! each other's pulses cryptographically, and deterministically elect a
//! single anchor that rotates a shared epoch secret. There is no broker,
//! no static configuration of peers, and no central point of failure.

#![warn(missing_docs)]

pub mod authority;
pub mod error;
pub mod node;
pub mod peer;
pub mod security;
pub mod transport;
pub mod wire;

pub use authority::{AuthorityState, FailoverDecision};
pub use error::{MeshError, MeshResult};
pub use node::MeshNode;
pub use peer::{PeerRecord, PeerTable};
pub use security::DropReason;
pub use transport::{detect_link_local_interface, LinkLocalInterface, MulticastChannel};
pub use wire::{HealthStatus, WireMessage};
