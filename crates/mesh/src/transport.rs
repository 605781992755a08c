//! Link-local IPv6 multicast transport.
//!
//! One unbound socket sends hop-limited pulses (hop count 1: link-local
//! only by design, independent of address scope); a second socket binds the
//! well-known port and joins the group on a single chosen interface. If no
//! non-loopback, non-virtual interface carries a link-local address the
//! mesh is inert — surfaced as degraded health, never as a crash.

use crate::error::{MeshError, MeshResult};
use crate::wire::{self, WireMessage};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};
use tokio::net::UdpSocket;
use tracing::{debug, trace};

/// Kernel receive buffer: generous enough to absorb bursts of JSON pulses.
const RECV_BUFFER_BYTES: usize = 64 * 1024;

/// Largest datagram the listener will read.
pub const MAX_DATAGRAM_BYTES: usize = 8192;

/// The interface the mesh runs on.
#[derive(Debug, Clone)]
pub struct LinkLocalInterface {
    /// OS interface name.
    pub name: String,
    /// OS interface index, used for the multicast join and send scope.
    pub index: u32,
    /// The interface's link-local address.
    pub addr: Ipv6Addr,
}

/// Pick the first non-loopback, non-virtual interface carrying an IPv6
/// link-local address. Returns `None` when the host has none, in which
/// case the mesh runs inert.
pub fn detect_link_local_interface() -> Option<LinkLocalInterface> {
    let interfaces = match if_addrs::get_if_addrs() {
        Ok(list) => list,
        Err(e) => {
            debug!("interface scan failed: {e}");
            return None;
        }
    };

    for iface in interfaces {
        if iface.is_loopback() {
            continue;
        }
        let lowered = iface.name.to_ascii_lowercase();
        if lowered.contains("veth") || lowered.contains("docker") {
            continue;
        }
        if let if_addrs::IfAddr::V6(v6) = &iface.addr {
            if (v6.ip.segments()[0] & 0xffc0) == 0xfe80 {
                if let Some(index) = iface.index {
                    return Some(LinkLocalInterface {
                        name: iface.name.clone(),
                        index,
                        addr: v6.ip,
                    });
                }
            }
        }
    }
    None
}

/// One multicast group/port pair: a send socket and a bound, joined
/// receive socket.
pub struct MulticastChannel {
    send_sock: UdpSocket,
    recv_sock: UdpSocket,
    target: SocketAddr,
}

impl MulticastChannel {
    /// Open both sockets on `iface`. Must be called from within a tokio
    /// runtime.
    pub fn open(group: Ipv6Addr, port: u16, iface: &LinkLocalInterface) -> MeshResult<Self> {
        let send_sock = {
            let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
            socket.set_multicast_hops_v6(1)?;
            socket.set_multicast_if_v6(iface.index)?;
            socket.set_nonblocking(true)?;
            UdpSocket::from_std(socket.into())?
        };

        let recv_sock = {
            let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
            socket.set_reuse_address(true)?;
            socket.set_recv_buffer_size(RECV_BUFFER_BYTES)?;
            let bind_addr = SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, port, 0, 0);
            socket.bind(&SocketAddr::V6(bind_addr).into())?;
            socket
                .join_multicast_v6(&group, iface.index)
                .map_err(|e| MeshError::Transport(format!("group join failed: {e}")))?;
            socket.set_nonblocking(true)?;
            UdpSocket::from_std(socket.into())?
        };

        let target = SocketAddr::V6(SocketAddrV6::new(group, port, 0, iface.index));
        Ok(Self {
            send_sock,
            recv_sock,
            target,
        })
    }

    /// Fire-and-forget send. Encode or send failures are logged and
    /// swallowed: no protocol message ever warrants a retry loop.
    pub async fn send(&self, msg: &WireMessage) {
        let payload = match wire::encode(msg) {
            Ok(p) => p,
            Err(e) => {
                debug!("pulse encode failed: {e}");
                return;
            }
        };
        if let Err(e) = self.send_sock.send_to(&payload, self.target).await {
            debug!("pulse send failed: {e}");
        } else {
            trace!(bytes = payload.len(), "pulse sent");
        }
    }

    /// Await the next datagram.
    pub async fn recv(&self, buf: &mut [u8]) -> std::io::Result<(usize, SocketAddr)> {
        self.recv_sock.recv_from(buf).await
    }
}
