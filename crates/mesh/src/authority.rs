//! Anchor authority: who holds epoch truth, and how that changes.
//!
//! Every node tracks the current anchor and epoch secret here. Failover is
//! decided locally and independently by each node — ego score plus
//! first-seen seniority gives a deterministic total order, so observers
//! holding the same peer-table view converge on the same winner without
//! exchanging a single election message. A hysteresis buffer keeps
//! equally-positioned candidates from flickering in and out of anchorship
//! during transient silence.

use crate::peer::PeerTable;
use rand::rngs::OsRng;
use rand::RngCore;
use std::time::Duration;
use zeroize::Zeroizing;

/// Authority and epoch state for one node. Mutated only by the listener
/// (EPOCH / ANN / REQ_EPOCH receipt) and the announcer's failover check,
/// both under the node's state lock.
#[derive(Debug)]
pub struct AuthorityState {
    /// Whether this node currently holds anchorship.
    pub is_anchor: bool,
    /// Address of the trusted anchor, possibly our own.
    pub anchor_id: Option<String>,
    /// Public key of the trusted anchor (hex).
    pub anchor_pubkey: Option<String>,
    /// When the current epoch began, Unix milliseconds. Zero forces a
    /// fresh broadcast on the anchor's next tick.
    pub epoch_ts: u64,
    /// Last time the trusted anchor was heard from.
    pub last_anchor_pulse: u64,
    /// Last time we answered a REQ_EPOCH. Rate-limit watermark.
    pub last_epoch_response: u64,
    epoch_key: Zeroizing<[u8; 32]>,
    hysteresis_since: u64,
}

/// Outcome of one failover evaluation, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverDecision {
    /// No known peers: the node trivially wins and promotes immediately.
    Genesis,
    /// This node is the deterministic winner and just armed its hysteresis
    /// timer.
    Armed,
    /// Hysteresis is running but has not elapsed yet.
    Waiting,
    /// Hysteresis elapsed; this node promoted itself.
    Promoted,
    /// A peer outranks us (ego or seniority); any pending promotion and
    /// any held anchorship are dropped.
    Outranked,
}

/// The local node's standing in an election.
#[derive(Debug, Clone, Copy)]
pub struct LocalCandidate {
    /// Our configured ego score.
    pub ego_score: u32,
    /// Our process start time, Unix milliseconds. Plays the role of
    /// first-seen for ourselves.
    pub start_time: u64,
}

impl AuthorityState {
    /// Fresh state: no anchor known, random fallback epoch key. Until a
    /// real epoch is adopted, our pulses fail peers' HMAC checks — which
    /// is the point of the epoch key as a membership ticket.
    pub fn new() -> Self {
        let mut key = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(key.as_mut());

        Self {
            is_anchor: false,
            anchor_id: None,
            anchor_pubkey: None,
            epoch_ts: 0,
            last_anchor_pulse: 0,
            last_epoch_response: 0,
            epoch_key: key,
            hysteresis_since: 0,
        }
    }

    /// The epoch key currently used for HMAC stamping and checking.
    pub fn epoch_key(&self) -> &[u8; 32] {
        &self.epoch_key
    }

    /// Adopt a validated epoch: new key, new anchor identity. We are the
    /// anchor exactly when the announced anchor address is our own.
    pub fn adopt_epoch(
        &mut self,
        key: [u8; 32],
        anchor_id: String,
        anchor_pubkey: String,
        now: u64,
        own_addr: Option<&str>,
    ) {
        self.epoch_key = Zeroizing::new(key);
        self.is_anchor = own_addr == Some(anchor_id.as_str());
        self.anchor_id = Some(anchor_id);
        self.anchor_pubkey = Some(anchor_pubkey);
        self.last_anchor_pulse = now;
        self.epoch_ts = now;
    }

    /// Generate and adopt a fresh epoch key, returning a copy for the
    /// outgoing broadcast. Anchor-only path.
    pub fn rotate_epoch(&mut self, now: u64) -> [u8; 32] {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        self.epoch_key = Zeroizing::new(key);
        self.epoch_ts = now;
        key
    }

    /// Whether the anchor has been silent longer than `window`.
    pub fn anchor_silent(&self, now: u64, window: Duration) -> bool {
        now.saturating_sub(self.last_anchor_pulse) > window.as_millis() as u64
    }

    /// Whether the current epoch is old enough to rotate.
    pub fn epoch_stale(&self, now: u64, rotate_after: Duration) -> bool {
        now.saturating_sub(self.epoch_ts) > rotate_after.as_millis() as u64
    }

    /// Whether enough time has passed since the last REQ_EPOCH answer.
    pub fn epoch_response_due(&self, now: u64, min_gap: Duration) -> bool {
        now.saturating_sub(self.last_epoch_response) >= min_gap.as_millis() as u64
    }

    /// Record that we answered a REQ_EPOCH.
    pub fn note_epoch_response(&mut self, now: u64) {
        self.last_epoch_response = now;
    }

    /// One failover evaluation. Called when anchor silence exceeds the
    /// threshold, and directly by tests.
    ///
    /// Selection rule: highest ego wins; ties go to the most senior node
    /// (our start time vs the minimum peer first-seen). The winner must
    /// stay eligible for the full hysteresis window before promoting, so a
    /// burst of transient silence cannot cause a promotion storm.
    pub fn evaluate_failover(
        &mut self,
        now: u64,
        local: &LocalCandidate,
        peers: &PeerTable,
        hysteresis: Duration,
    ) -> FailoverDecision {
        if peers.is_empty() {
            // Genesis path: alone in the mesh, trivially the winner
            self.is_anchor = true;
            self.hysteresis_since = 0;
            return FailoverDecision::Genesis;
        }

        let peer_max = peers.max_ego().unwrap_or(0);
        if local.ego_score < peer_max {
            self.hysteresis_since = 0;
            self.is_anchor = false;
            return FailoverDecision::Outranked;
        }

        // Seniority only breaks ties at the top; a unique maximum wins
        // outright
        if local.ego_score == peer_max {
            let min_first_seen = peers.min_first_seen().unwrap_or(u64::MAX);
            if local.start_time > min_first_seen {
                self.hysteresis_since = 0;
                self.is_anchor = false;
                return FailoverDecision::Outranked;
            }
        }

        if self.hysteresis_since == 0 {
            self.hysteresis_since = now;
            return FailoverDecision::Armed;
        }

        if now.saturating_sub(self.hysteresis_since) > hysteresis.as_millis() as u64 {
            self.is_anchor = true;
            // Zero epoch_ts so the next announcer tick broadcasts a fresh
            // epoch immediately
            self.epoch_ts = 0;
            self.hysteresis_since = 0;
            return FailoverDecision::Promoted;
        }

        FailoverDecision::Waiting
    }
}

impl Default for AuthorityState {
    fn default() -> Self {
        Self::new()
    }
}
