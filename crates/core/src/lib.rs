//! Anchormesh Core - shared configuration, logging and time primitives
//!
//! Everything here is consumed by the protocol crates; nothing in this
//! crate touches the network.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod time;

pub use config::MeshConfig;
pub use error::CoreError;
pub use time::unix_millis;
