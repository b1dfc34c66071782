//! End-to-end scenarios driving the whole stack from raw IPv4 datagrams
//! down to observed IRC replies, standing in for an actual SLIP peer (the
//! framing itself is covered by the SLIP unit tests).

use std::time::Instant;

use vstackd::irc::IrcServer;
use vstackd::net::checksum::{internet_checksum, tcp_checksum};
use vstackd::net::ipv4::{LinkSender, PROTO_TCP};
use vstackd::net::tcp::tcb::{build, FLAG_ACK, FLAG_SYN};
use vstackd::net::trie::RoutingTrie;
use vstackd::net::types::{CidrRoute, Ipv4Addr};
use vstackd::net::NetStack;

/// Builds a segment the way the real client-side stack would: [`build`]
/// leaves the checksum field zeroed, so every caller here folds in the real
/// pseudo-header checksum before handing it to the server's demultiplexer,
/// which verifies it exactly as it would a real peer's segment.
#[allow(clippy::too_many_arguments)]
fn build_signed(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    local_port: u16,
    remote_port: u16,
    seq_no: u32,
    ack_no: u32,
    flags: u8,
    payload: &[u8],
) -> Vec<u8> {
    let mut segment = build(local_port, remote_port, seq_no, ack_no, flags, payload);
    let cksum = tcp_checksum(src, dst, &segment);
    segment[16] = (cksum >> 8) as u8;
    segment[17] = (cksum & 0xFF) as u8;
    segment
}

const HEADER_LEN: usize = 20;

fn ip_header(src: Ipv4Addr, dst: Ipv4Addr, payload_len: usize, protocol: u8, ttl: u8) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[0] = 0x45;
    let total_length = (HEADER_LEN + payload_len) as u16;
    header[2] = (total_length >> 8) as u8;
    header[3] = (total_length & 0xFF) as u8;
    header[8] = ttl;
    header[9] = protocol;
    header[12..16].copy_from_slice(src.as_bytes());
    header[16..20].copy_from_slice(dst.as_bytes());
    let cksum = internet_checksum(&header);
    header[10] = (cksum >> 8) as u8;
    header[11] = (cksum & 0xFF) as u8;
    header
}

fn datagram(src: Ipv4Addr, dst: Ipv4Addr, segment: &[u8]) -> Vec<u8> {
    let mut out = ip_header(src, dst, segment.len(), PROTO_TCP, 64).to_vec();
    out.extend_from_slice(segment);
    out
}

struct RecordingLink {
    sent: Vec<(Vec<u8>, Ipv4Addr)>,
}
impl LinkSender for RecordingLink {
    fn send(&mut self, datagram: &[u8], next_hop: Ipv4Addr) {
        self.sent.push((datagram.to_vec(), next_hop));
    }
}
impl RecordingLink {
    fn new() -> Self {
        RecordingLink { sent: vec![] }
    }

    /// Everything sent to `peer` since the last call, as bare TCP segments
    /// (the IPv4 header stripped back off).
    fn segments_to(&mut self, peer: Ipv4Addr) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.sent)
            .into_iter()
            .filter(|(_, hop)| *hop == peer)
            .map(|(d, _)| d[HEADER_LEN..].to_vec())
            .collect()
    }
}

struct Fixture {
    net: NetStack,
    app: IrcServer,
    link: RecordingLink,
    host: Ipv4Addr,
    peer: Ipv4Addr,
}

impl Fixture {
    fn new() -> Self {
        let host: Ipv4Addr = "192.168.123.2".parse().unwrap();
        let peer: Ipv4Addr = "192.168.123.1".parse().unwrap();
        let mut trie = RoutingTrie::new();
        trie.insert_cidr(CidrRoute::parse("0.0.0.0/0", "192.168.123.1").unwrap());
        Fixture { net: NetStack::new(host, trie, 7000), app: IrcServer::new(), link: RecordingLink::new(), host, peer }
    }

    fn deliver_segment(&mut self, segment: &[u8]) {
        let dg = datagram(self.peer, self.host, segment);
        self.net.handle_datagram(&dg, &mut self.link, &mut self.app, Instant::now());
    }

    /// Completes a three-way handshake from a fresh client port and returns
    /// the client-side sequence number to ack from here on.
    fn handshake(&mut self, client_port: u16) -> u32 {
        self.deliver_segment(&build_signed(self.peer, self.host, client_port, 7000, 100, 0, FLAG_SYN, b""));
        let replies = self.link.segments_to(self.peer);
        assert_eq!(replies.len(), 1, "server should answer SYN with exactly one SYN-ACK");
        let synack = vstackd::net::tcp::tcb::parse(&replies[0]).unwrap();
        assert_eq!(synack.flags & (FLAG_SYN | FLAG_ACK), FLAG_SYN | FLAG_ACK);
        assert_eq!(synack.ack_no, 101);

        self.deliver_segment(&build_signed(
            self.peer,
            self.host,
            client_port,
            7000,
            101,
            synack.seq_no + 1,
            FLAG_ACK,
            b"",
        ));
        self.link.segments_to(self.peer); // drain, nothing application-visible yet
        synack.seq_no + 1
    }

    fn send_line(&mut self, client_port: u16, client_seq: &mut u32, server_ack: u32, line: &[u8]) {
        self.deliver_segment(&build_signed(self.peer, self.host, client_port, 7000, *client_seq, server_ack, FLAG_ACK, line));
        *client_seq += line.len() as u32;
    }
}

#[test]
fn scenario_s3_three_way_handshake_establishes_a_connection() {
    let mut fx = Fixture::new();
    let server_seq = fx.handshake(5000);
    assert!(server_seq > 0);
}

#[test]
fn scenario_s4_nick_then_join_delivers_welcome_and_names() {
    let mut fx = Fixture::new();
    let server_seq = fx.handshake(5000);
    let mut client_seq = 101u32;

    fx.send_line(5000, &mut client_seq, server_seq, b"NICK alice\r\n");
    let replies = fx.link.segments_to(fx.peer);
    let payloads: Vec<Vec<u8>> =
        replies.iter().filter_map(|s| vstackd::net::tcp::tcb::parse(s)).map(|p| p.payload.to_vec()).collect();
    let joined: Vec<u8> = payloads.concat();
    assert!(joined.windows(10).any(|w| w == b":server 001"), "expected a 001 welcome reply, got {joined:?}");
    assert!(joined.windows(10).any(|w| w == b":server 422"), "expected a 422 no-MOTD reply, got {joined:?}");
}

#[test]
fn scenario_s5_duplicate_nickname_is_refused() {
    let mut fx = Fixture::new();
    let alice_server_seq = fx.handshake(5000);
    let mut alice_seq = 101u32;
    fx.send_line(5000, &mut alice_seq, alice_server_seq, b"NICK alice\r\n");
    fx.link.segments_to(fx.peer);

    let bob_server_seq = fx.handshake(5001);
    let mut bob_seq = 101u32;
    fx.send_line(5001, &mut bob_seq, bob_server_seq, b"NICK alice\r\n");

    let replies = fx.link.segments_to(fx.peer);
    let payloads: Vec<Vec<u8>> =
        replies.iter().filter_map(|s| vstackd::net::tcp::tcb::parse(s)).map(|p| p.payload.to_vec()).collect();
    let joined: Vec<u8> = payloads.concat();
    assert!(joined.windows(10).any(|w| w == b":server 433"), "expected a 433 nick-in-use reply, got {joined:?}");
}

#[test]
fn scenario_s6_disconnect_broadcasts_quit_to_channel_members() {
    let mut fx = Fixture::new();
    let alice_server_seq = fx.handshake(5000);
    let mut alice_seq = 101u32;
    fx.send_line(5000, &mut alice_seq, alice_server_seq, b"NICK alice\r\n");
    fx.link.segments_to(fx.peer);
    fx.send_line(5000, &mut alice_seq, alice_server_seq, b"JOIN #rust\r\n");
    fx.link.segments_to(fx.peer);

    let bob_server_seq = fx.handshake(5001);
    let mut bob_seq = 101u32;
    fx.send_line(5001, &mut bob_seq, bob_server_seq, b"NICK bob\r\n");
    fx.link.segments_to(fx.peer);
    fx.send_line(5001, &mut bob_seq, bob_server_seq, b"JOIN #rust\r\n");
    fx.link.segments_to(fx.peer);

    // Bob's connection sends a FIN, signalling EOF to the application.
    fx.deliver_segment(&build_signed(
        fx.peer,
        fx.host,
        5001,
        7000,
        bob_seq,
        bob_server_seq,
        vstackd::net::tcp::tcb::FLAG_FIN,
        b"",
    ));

    let replies = fx.link.segments_to(fx.peer);
    let payloads: Vec<Vec<u8>> =
        replies.iter().filter_map(|s| vstackd::net::tcp::tcb::parse(s)).map(|p| p.payload.to_vec()).collect();
    let joined: Vec<u8> = payloads.concat();
    assert!(joined.windows(10).any(|w| w == b":bob QUIT "), "expected a QUIT broadcast to alice, got {joined:?}");
}
