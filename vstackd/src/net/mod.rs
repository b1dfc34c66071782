//! Coordinates the IPv4 and TCP engines into a single owned stack, the way
//! the incoming-datagram dispatch of a small kernel networking stack would:
//! one struct owning both layers, with a single `poll`-shaped entry point
//! rather than each layer holding a stored reference to its neighbour.

pub mod checksum;
pub mod icmp;
pub mod ipv4;
pub mod tcp;
pub mod trie;
pub mod types;

use std::time::Instant;

use ipv4::{Ipv4Engine, LinkSender};
use tcp::server::OutboundQueue;
use tcp::{TcpApplication, TcpServer};
use types::Ipv4Addr;

pub struct NetStack {
    pub ipv4: Ipv4Engine,
    pub tcp: TcpServer,
}

impl NetStack {
    pub fn new(my_address: Ipv4Addr, routing_trie: trie::RoutingTrie, listen_port: u16) -> Self {
        NetStack { ipv4: Ipv4Engine::new(my_address, routing_trie), tcp: TcpServer::new(listen_port) }
    }

    /// Feeds one de-framed IP datagram (as produced by the SLIP layer)
    /// through the IPv4 engine, and if it resolves to a segment addressed
    /// to this host's listening port, on into the TCP engine.
    pub fn handle_datagram(
        &mut self,
        datagram: &[u8],
        link: &mut dyn LinkSender,
        app: &mut dyn TcpApplication,
        now: Instant,
    ) {
        if let Some(delivered) = self.ipv4.handle_incoming(datagram, link) {
            self.tcp.handle_incoming_segment(
                delivered.src,
                delivered.dst,
                &delivered.payload,
                &mut self.ipv4,
                link,
                app,
                now,
            );
        }
        self.flush_outbound(app, link, now);
    }

    pub fn poll_timers(&mut self, now: Instant, link: &mut dyn LinkSender) {
        self.tcp.check_retransmissions(now, &mut self.ipv4, link);
    }

    /// Sends and closes the application queued while the segment above was
    /// being processed. Runs after `handle_incoming_segment` has returned,
    /// so the connection table is no longer borrowed and `self.tcp.send`/
    /// `self.tcp.close` can be called freely.
    fn flush_outbound(&mut self, app: &mut dyn TcpApplication, link: &mut dyn LinkSender, now: Instant) {
        let sends = app.drain_sends();
        for (id, data) in sends {
            self.tcp.send(&id, &data, &mut self.ipv4, link, now);
        }
        let closes = app.drain_closes();
        for id in closes {
            self.tcp.close(&id, &mut self.ipv4, link, now);
        }
    }
}
