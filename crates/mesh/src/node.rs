//! Mesh node coordinator.
//!
//! Owns the identity, the shared peer/authority state, and the two
//! background activities: the listener (receive loop) and the announcer
//! (periodic pulse + failover check). Both share one mutex over the peer
//! table and authority state; every read-modify-write holds the lock, and
//! the lock is never held across an await — outbound messages are built
//! under the lock and sent after release.
//!
//! Protocol steps are exposed as deterministic functions of an explicit
//! `now` ([`MeshNode::handle_datagram`], [`MeshNode::announce_tick`]) so
//! that several simulated nodes can run in one process without sockets or
//! real clocks. The background loops are thin wrappers that feed them wall
//! time and datagrams.

use crate::authority::{AuthorityState, FailoverDecision, LocalCandidate};
use crate::error::{MeshError, MeshResult};
use crate::peer::{PeerRecord, PeerTable};
use crate::security;
use crate::transport::{
    detect_link_local_interface, LinkLocalInterface, MulticastChannel, MAX_DATAGRAM_BYTES,
};
use crate::wire::{self, Announce, Epoch, EpochRequest, HealthStatus, NodeAnnouncement, WireMessage};
use anchormesh_core::{unix_millis, MeshConfig};
use anchormesh_identity::NodeIdentity;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// State shared between the listener and the announcer.
struct MeshShared {
    peers: PeerTable,
    authority: AuthorityState,
    health: HealthStatus,
}

/// Everything the background loops need, behind one `Arc`.
struct NodeContext {
    config: MeshConfig,
    identity: NodeIdentity,
    name_hash: String,
    type_hash: String,
    interface: Option<LinkLocalInterface>,
    own_addr: Option<String>,
    start_time: u64,
    shared: Mutex<MeshShared>,
}

/// A single mesh node: identity, transport, peer table and anchor
/// authority, plus the SDK surface the control plane consumes.
pub struct MeshNode {
    ctx: Arc<NodeContext>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MeshNode {
    /// Create a node, auto-selecting the mesh interface by scanning for a
    /// link-local IPv6 address.
    pub fn new(config: MeshConfig) -> Self {
        Self::with_interface(config, detect_link_local_interface())
    }

    /// Create a node on an explicit interface, or none. `None` produces an
    /// inert, degraded node — useful on hosts without IPv6 and for
    /// multi-node simulations that never touch a socket.
    pub fn with_interface(config: MeshConfig, interface: Option<LinkLocalInterface>) -> Self {
        let identity = NodeIdentity::generate(config.salt.clone());
        let name_hash = identity.hash_id(&config.name);
        let type_hash = identity.hash_id(&config.node_type);
        let own_addr = interface.as_ref().map(|i| i.addr.to_string());

        let health = if let Some(iface) = &interface {
            info!(name = %config.name, interface = %iface.name, addr = %iface.addr, "mesh node initialized");
            HealthStatus::Healthy
        } else {
            warn!(name = %config.name, "no IPv6 link-local interface found; node is inert");
            HealthStatus::Degraded
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            ctx: Arc::new(NodeContext {
                config,
                identity,
                name_hash,
                type_hash,
                interface,
                own_addr,
                start_time: unix_millis(),
                shared: Mutex::new(MeshShared {
                    peers: PeerTable::new(),
                    authority: AuthorityState::new(),
                    health,
                }),
            }),
            shutdown_tx,
            shutdown_rx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start the background activities and request an immediate epoch
    /// sync. Returns as soon as the tasks are spawned.
    ///
    /// On a degraded node (no usable interface) this is a no-op apart from
    /// a warning: the process stays alive, the mesh stays silent.
    pub async fn register(&self) -> MeshResult<()> {
        let mut tasks = lock(&self.tasks);
        if !tasks.is_empty() {
            return Err(MeshError::InvalidState("node already registered".into()));
        }

        let Some(iface) = self.ctx.interface.clone() else {
            warn!("register() on an inert node; no background activities started");
            return Ok(());
        };

        let channel = Arc::new(MulticastChannel::open(
            self.ctx.config.multicast_group,
            self.ctx.config.multicast_port,
            &iface,
        )?);

        tasks.push(tokio::spawn(listen_loop(
            self.ctx.clone(),
            channel.clone(),
            self.shutdown_rx.clone(),
        )));
        tasks.push(tokio::spawn(announce_loop(
            self.ctx.clone(),
            channel.clone(),
            self.shutdown_rx.clone(),
        )));
        drop(tasks);

        // Rapid sync: demand the current epoch instead of waiting out a
        // full rotation interval
        let request = self.sync_request(unix_millis())?;
        channel.send(&request).await;

        info!("mesh node registered; rapid epoch sync requested");
        Ok(())
    }

    /// Stop the background activities. Cooperative and idempotent: loops
    /// observe the flag at their next wakeup, including mid-receive.
    pub fn close(&self) {
        let _ = self.shutdown_tx.send(true);
        info!(name = %self.ctx.config.name, "mesh node shutting down");
    }

    /// Current peer table filtered by zone; `"*"` returns everything.
    /// Reflects only previously validated announcements.
    pub fn discover(&self, zone: &str) -> Vec<PeerRecord> {
        self.ctx.state().peers.discover(zone)
    }

    /// Plaintext node type (hashed before it reaches the wire).
    pub fn node_type(&self) -> &str {
        &self.ctx.config.node_type
    }

    /// This node's authority weight.
    pub fn ego_score(&self) -> u32 {
        self.ctx.config.ego_score
    }

    /// Whether this node currently holds anchorship.
    pub fn is_anchor(&self) -> bool {
        self.ctx.state().authority.is_anchor
    }

    /// Address of the currently trusted anchor, if any.
    pub fn anchor_id(&self) -> Option<String> {
        self.ctx.state().authority.anchor_id.clone()
    }

    /// When the current epoch began, Unix milliseconds.
    pub fn epoch_ts(&self) -> u64 {
        self.ctx.state().authority.epoch_ts
    }

    /// Process start time, Unix milliseconds.
    pub fn start_time(&self) -> u64 {
        self.ctx.start_time
    }

    /// Current health. Degraded means no usable network interface.
    pub fn health(&self) -> HealthStatus {
        self.ctx.state().health
    }

    /// This node's salted name hash, as peers see it.
    pub fn name_hash(&self) -> &str {
        &self.ctx.name_hash
    }

    /// Hex-encoded public key.
    pub fn pubkey_hex(&self) -> &str {
        self.ctx.identity.pubkey_hex()
    }

    /// Feed one inbound datagram through the validation pipeline at an
    /// explicit time, returning any message the node would broadcast in
    /// response. The listener calls this with wall time; simulations and
    /// tests call it directly.
    pub fn handle_datagram(
        &self,
        payload: &[u8],
        sender: IpAddr,
        now: u64,
    ) -> Option<WireMessage> {
        self.ctx.handle_datagram(payload, sender, now)
    }

    /// Run one announcer tick (failover check, epoch rotation, presence
    /// pulse, optional eviction) at an explicit time, returning the
    /// messages the node would broadcast.
    pub fn announce_tick(&self, now: u64) -> Vec<WireMessage> {
        self.ctx.announce_tick(now)
    }

    /// The signed epoch demand this node sends on joining. Sent by
    /// [`register`](Self::register); exposed so simulations can run the
    /// same join handshake without a socket.
    pub fn sync_request(&self, now: u64) -> MeshResult<WireMessage> {
        wire::build_epoch_request(&self.ctx.identity, self.ctx.name_hash.clone(), now)
    }
}

/// Lock helper: a poisoned state lock means a panic already happened
/// under it; propagating the panic is the only honest option.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().expect("state lock poisoned")
}

impl NodeContext {
    fn state(&self) -> MutexGuard<'_, MeshShared> {
        lock(&self.shared)
    }

    fn handle_datagram(&self, payload: &[u8], sender: IpAddr, now: u64) -> Option<WireMessage> {
        let msg = match wire::decode(payload) {
            Ok(msg) => msg,
            Err(e) => {
                // Malformed traffic is dropped silently; logging at trace
                // keeps a flood from becoming log noise
                trace!("undecodable datagram dropped: {e}");
                return None;
            }
        };

        match msg {
            WireMessage::Announce(ann) => {
                self.handle_announce(ann, sender, now);
                None
            }
            WireMessage::Epoch(epoch) => {
                self.handle_epoch(epoch, now);
                None
            }
            WireMessage::EpochRequest(req) => self.handle_epoch_request(req, sender, now),
        }
    }

    fn handle_announce(&self, ann: Announce, sender: IpAddr, now: u64) {
        // Our own pulse comes back through the multicast loop
        if ann.node.name_hash == self.name_hash {
            return;
        }

        let mut shared = self.state();
        if let Err(reason) = security::validate_announce(shared.authority.epoch_key(), &ann) {
            debug!(?reason, %sender, "announcement dropped");
            return;
        }

        // Any validated pulse from the trusted anchor counts as liveness
        let sender_ip = sender.to_string();
        if shared.authority.anchor_id.as_deref() == Some(sender_ip.as_str()) {
            shared.authority.last_anchor_pulse = now;
        }

        trace!(peer = %ann.node.name_hash, zone = %ann.node.zone, "peer validated");
        shared
            .peers
            .upsert(PeerRecord::from_announcement(&ann.node, &ann.signature, now));
    }

    fn handle_epoch(&self, epoch: Epoch, now: u64) {
        let mut shared = self.state();
        if let Err(reason) = security::validate_epoch(self.config.ego_score, &epoch) {
            debug!(?reason, anchor = %epoch.anchor_id, "epoch dropped");
            return;
        }

        let Ok(key_bytes) = hex::decode(&epoch.key_hex) else {
            trace!("epoch key not hex; dropped");
            return;
        };
        let Ok(key) = <[u8; 32]>::try_from(key_bytes) else {
            trace!("epoch key wrong length; dropped");
            return;
        };

        shared.authority.adopt_epoch(
            key,
            epoch.anchor_id.clone(),
            epoch.anchor_pubkey.clone(),
            now,
            self.own_addr.as_deref(),
        );

        if shared.authority.is_anchor {
            debug!("own epoch echoed back; anchorship retained");
        } else {
            info!(anchor = %epoch.anchor_id, "epoch adopted; anchor confirmed");
        }
    }

    fn handle_epoch_request(
        &self,
        req: EpochRequest,
        sender: IpAddr,
        now: u64,
    ) -> Option<WireMessage> {
        let own_addr = self.own_addr.clone()?;

        let key = {
            let mut shared = self.state();
            if !shared.authority.is_anchor {
                return None;
            }
            // Anti-amplification: at most one epoch response per window,
            // no matter how many requests arrive
            if !shared
                .authority
                .epoch_response_due(now, self.config.epoch_response_min_gap)
            {
                trace!(requester = %req.requester, "epoch request rate-limited");
                return None;
            }
            let key = shared.authority.rotate_epoch(now);
            shared.authority.note_epoch_response(now);
            key
        };

        info!(requester = %req.requester, %sender, "answering epoch request");
        match wire::build_epoch(&self.identity, &key, own_addr, self.config.ego_score, now) {
            Ok(msg) => Some(msg),
            Err(e) => {
                debug!("epoch build failed: {e}");
                None
            }
        }
    }

    fn announce_tick(&self, now: u64) -> Vec<WireMessage> {
        let mut outbound = Vec::new();
        let mut shared = self.state();
        let MeshShared {
            peers,
            authority,
            health,
        } = &mut *shared;

        // (a) deterministic failover check on sustained anchor silence
        if !authority.is_anchor && authority.anchor_silent(now, self.config.anchor_silence) {
            let me = LocalCandidate {
                ego_score: self.config.ego_score,
                start_time: self.start_time,
            };
            match authority.evaluate_failover(now, &me, peers, self.config.failover_hysteresis) {
                FailoverDecision::Genesis => {
                    info!("alone in the mesh; assuming anchor status");
                }
                FailoverDecision::Armed => {
                    info!("anchor silent; hysteresis buffer armed");
                }
                FailoverDecision::Promoted => {
                    warn!("succession confirmed; promoted to anchor");
                }
                FailoverDecision::Waiting | FailoverDecision::Outranked => {}
            }
        }

        // (b) scheduled epoch rotation while anchor
        if authority.is_anchor && authority.epoch_stale(now, self.config.epoch_rotate) {
            if let Some(addr) = &self.own_addr {
                let key = authority.rotate_epoch(now);
                match wire::build_epoch(&self.identity, &key, addr.clone(), self.config.ego_score, now)
                {
                    Ok(msg) => {
                        info!(ts = now, "broadcasting new epoch key");
                        outbound.push(msg);
                    }
                    Err(e) => debug!("epoch build failed: {e}"),
                }
            }
        }

        // (c) presence pulse, stamped under the current epoch key
        let node = NodeAnnouncement {
            name_hash: self.name_hash.clone(),
            type_hash: self.type_hash.clone(),
            zone: self.config.zone.clone(),
            address: self.announce_address(),
            ego_score: self.config.ego_score,
            uptime: now.saturating_sub(self.start_time) / 1000,
            pubkey: self.identity.pubkey_hex().to_string(),
            status: *health,
        };
        match wire::build_announce(&self.identity, node, now, authority.epoch_key()) {
            Ok(msg) => outbound.push(msg),
            Err(e) => debug!("announce build failed: {e}"),
        }

        // (d) optional peer eviction
        if let Some(ttl) = self.config.peer_ttl {
            let evicted = peers.evict_stale(now, ttl);
            if evicted > 0 {
                debug!(evicted, "stale peers evicted");
            }
        }

        outbound
    }

    fn announce_address(&self) -> String {
        match &self.own_addr {
            Some(ip) => format!("[{}]:{}", ip, self.config.advertised_port),
            None => String::new(),
        }
    }
}

async fn listen_loop(
    ctx: Arc<NodeContext>,
    channel: Arc<MulticastChannel>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_BYTES];
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            result = channel.recv(&mut buf) => {
                match result {
                    Ok((len, addr)) => {
                        if let Some(reply) = ctx.handle_datagram(&buf[..len], addr.ip(), unix_millis()) {
                            channel.send(&reply).await;
                        }
                    }
                    Err(e) => debug!("receive error: {e}"),
                }
            }
        }
    }
    trace!("listener stopped");
}

async fn announce_loop(
    ctx: Arc<NodeContext>,
    channel: Arc<MulticastChannel>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(ctx.config.announce_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                for msg in ctx.announce_tick(unix_millis()) {
                    channel.send(&msg).await;
                }
            }
        }
    }
    trace!("announcer stopped");
}
