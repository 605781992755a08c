//! Multi-node mesh simulations
//!
//! This test suite validates:
//! - Convergence of several nodes on a single anchor
//! - Anchor death, eviction and deterministic succession
//! - Epoch key distribution and rapid sync via REQ_EPOCH
//! - Adversarial traffic: forged pulses, tampered payloads, request floods
//!
//! All scenarios run in one process with a synthetic clock and a flooding
//! datagram bus; no sockets and no sleeps.

pub mod test_utils;

#[cfg(test)]
mod election_tests;

#[cfg(test)]
mod adversary_tests;
