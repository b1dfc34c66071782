//! Per-port demultiplexer and connection lifecycle.

use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::recv::{Disposition, TcpConnectionUpper};
use super::tcb::{parse, Connection, FLAG_ACK, FLAG_FIN, FLAG_SYN};
use crate::net::checksum::tcp_checksum;
use crate::net::ipv4::{Ipv4Engine, LinkSender};
use crate::net::types::{ConnectionId, Ipv4Addr};

use rand::Rng as _;

/// Notified synchronously from the segment handler when a fresh `SYN`
/// is accepted, or when a connection's peer has gone away. Handlers run
/// while the owning connection is already borrowed out of
/// [`TcpServer::connections`], so they must not try to call back into
/// [`TcpServer::send`]/[`TcpServer::close`] directly — queue replies via
/// [`OutboundQueue`] instead and the net stack will flush them once the
/// segment has finished processing.
pub trait TcpApplication: TcpConnectionUpper + OutboundQueue {
    fn on_accept(&mut self, id: ConnectionId);
}

/// Replies an application produced while handling a segment, collected here
/// instead of being sent immediately so they can be flushed once the
/// triggering call has released its borrow of the connection table. Mirrors
/// a collect-under-borrow, send-after-drop pattern.
pub trait OutboundQueue {
    fn drain_sends(&mut self) -> Vec<(ConnectionId, Vec<u8>)>;
    fn drain_closes(&mut self) -> Vec<ConnectionId>;
}

pub struct TcpServer {
    pub port: u16,
    pub ignore_checksum: bool,
    pub connections: HashMap<ConnectionId, Connection>,
}

impl TcpServer {
    pub fn new(port: u16) -> Self {
        TcpServer { port, ignore_checksum: false, connections: HashMap::new() }
    }

    /// Server demultiplex: validates the destination port and checksum,
    /// then either births a new connection on `SYN` (overwriting any
    /// existing flow with the same four-tuple, per the retained original
    /// behaviour) or routes the segment to its existing connection.
    pub fn handle_incoming_segment(
        &mut self,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        segment: &[u8],
        ip: &mut Ipv4Engine,
        link: &mut dyn LinkSender,
        app: &mut dyn TcpApplication,
        now: Instant,
    ) {
        let Some(parsed) = parse(segment) else {
            debug!("dropping TCP segment with unparsable header");
            return;
        };

        if parsed.dst_port != self.port {
            return;
        }

        if !self.ignore_checksum && tcp_checksum(src, dst, segment) != 0 {
            warn!(%src, %dst, "discarding segment with incorrect checksum");
            return;
        }

        let id = ConnectionId { src_ip: src, src_port: parsed.src_port, dst_ip: dst, dst_port: parsed.dst_port };

        if parsed.flags & FLAG_SYN != 0 {
            let initial_seq: u32 = rand::thread_rng().gen_range(0..=0xFFFFu32);
            let mut conn = Connection::from_syn(id, parsed.seq_no, initial_seq);
            conn.send_segment(FLAG_SYN | FLAG_ACK, b"", ip, link, now);
            info!(%id, "accepted connection");
            self.connections.insert(id, conn);
            app.on_accept(id);
            return;
        }

        let Some(conn) = self.connections.get_mut(&id) else {
            debug!(%id, "segment addressed to unknown connection");
            return;
        };

        match conn.receive_segment(&parsed, ip, link, app, now) {
            Disposition::Keep => {}
            Disposition::Remove => {
                info!(%id, "connection closed");
                self.connections.remove(&id);
            }
        }
    }

    /// Scans every live connection for an expired retransmission timer.
    pub fn check_retransmissions(&mut self, now: Instant, ip: &mut Ipv4Engine, link: &mut dyn LinkSender) {
        for conn in self.connections.values_mut() {
            if conn.retransmit_is_due(now) {
                conn.fire_retransmit_timer(now, ip, link);
            }
        }
    }

    /// Application-initiated close: marks the connection ready to close and
    /// enqueues a FIN. It is only actually removed once a subsequent ACK
    /// arrives (see [`Disposition::Remove`]).
    pub fn close(&mut self, id: &ConnectionId, ip: &mut Ipv4Engine, link: &mut dyn LinkSender, now: Instant) {
        if let Some(conn) = self.connections.get_mut(id) {
            conn.ready_to_close = true;
            conn.send_segment(FLAG_FIN, b"", ip, link, now);
        }
    }

    /// Sends data on an already-established connection.
    pub fn send(&mut self, id: &ConnectionId, data: &[u8], ip: &mut Ipv4Engine, link: &mut dyn LinkSender, now: Instant) {
        if let Some(conn) = self.connections.get_mut(id) {
            conn.send_segment(FLAG_ACK, data, ip, link, now);
        }
    }
}
