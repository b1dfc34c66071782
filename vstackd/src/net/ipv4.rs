//! IPv4 host/router engine: parses incoming datagrams, decides whether this
//! process is the destination or must forward them, and builds outgoing
//! datagrams for the TCP engine above it.

use tracing::{debug, trace, warn};

use super::checksum::{internet_checksum, tcp_checksum};
use super::icmp;
use super::trie::RoutingTrie;
use super::types::Ipv4Addr;

pub const PROTO_ICMP: u8 = 1;
pub const PROTO_TCP: u8 = 6;

pub const HEADER_LEN: usize = 20;
const DEFAULT_TTL: u8 = 64;

/// A TCP segment the engine decided was addressed to this host, handed
/// back to the caller rather than pushed through a stored callback — the
/// only "upper layer" reference this engine ever holds is the one borrowed
/// for the duration of a single call.
pub struct Delivered {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub payload: Vec<u8>,
}

/// Sends a fully-built IPv4 datagram to the link layer, addressed at a
/// next-hop (not necessarily the datagram's ultimate destination).
pub trait LinkSender {
    fn send(&mut self, datagram: &[u8], next_hop: Ipv4Addr);
}

pub struct ParsedIpv4<'a> {
    pub ttl: u8,
    pub protocol: u8,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub header: &'a [u8],
    pub payload: &'a [u8],
}

/// Parses a fixed 20-byte-or-larger IPv4 header (options are not supported;
/// IHL other than 5 is rejected) and splits off the payload.
pub fn parse(datagram: &[u8]) -> Option<ParsedIpv4<'_>> {
    if datagram.len() < HEADER_LEN {
        return None;
    }
    let ihl = (datagram[0] & 0x0F) as usize;
    let header_len = ihl * 4;
    if ihl != 5 || datagram.len() < header_len {
        return None;
    }
    let ttl = datagram[8];
    let protocol = datagram[9];
    let src = Ipv4Addr::new(datagram[12], datagram[13], datagram[14], datagram[15]);
    let dst = Ipv4Addr::new(datagram[16], datagram[17], datagram[18], datagram[19]);
    Some(ParsedIpv4 {
        ttl,
        protocol,
        src,
        dst,
        header: &datagram[..header_len],
        payload: &datagram[header_len..],
    })
}

fn build_header(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    payload_len: usize,
    protocol: u8,
    ttl: u8,
    identification: u16,
) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    header[0] = 0x45; // version 4, IHL 5
    header[1] = 0; // DSCP/ECN
    let total_length = (HEADER_LEN + payload_len) as u16;
    header[2] = (total_length >> 8) as u8;
    header[3] = (total_length & 0xFF) as u8;
    header[4] = (identification >> 8) as u8;
    header[5] = (identification & 0xFF) as u8;
    header[6] = 0; // flags/fragment offset
    header[7] = 0;
    header[8] = ttl;
    header[9] = protocol;
    // checksum (bytes 10-11) filled below
    header[12..16].copy_from_slice(src.as_bytes());
    header[16..20].copy_from_slice(dst.as_bytes());

    let cksum = internet_checksum(&header);
    header[10] = (cksum >> 8) as u8;
    header[11] = (cksum & 0xFF) as u8;
    header
}

pub struct Ipv4Engine {
    my_address: Ipv4Addr,
    routing_trie: RoutingTrie,
    identification: u16,
}

impl Ipv4Engine {
    pub fn new(my_address: Ipv4Addr, routing_trie: RoutingTrie) -> Self {
        Ipv4Engine { my_address, routing_trie, identification: 0 }
    }

    fn next_hop(&self, dest: Ipv4Addr) -> Option<Ipv4Addr> {
        self.routing_trie.find_addr(dest)
    }

    fn next_identification(&mut self) -> u16 {
        let id = self.identification;
        self.identification = self.identification.wrapping_add(1);
        id
    }

    /// Handles a datagram freshly de-framed by the link layer: dispatches
    /// to this host's TCP engine if addressed here, otherwise forwards or
    /// replies with an ICMP Time Exceeded, per the router path.
    pub fn handle_incoming(&mut self, datagram: &[u8], link: &mut dyn LinkSender) -> Option<Delivered> {
        let Some(parsed) = parse(datagram) else {
            debug!("dropping datagram with unparsable IPv4 header");
            return None;
        };

        if parsed.dst == self.my_address {
            if parsed.protocol == PROTO_TCP {
                return Some(Delivered { src: parsed.src, dst: parsed.dst, payload: parsed.payload.to_vec() });
            }
            trace!(protocol = parsed.protocol, "dropping non-TCP datagram addressed to this host");
            return None;
        }

        self.forward_or_expire(&parsed, datagram, link);
        None
    }

    fn forward_or_expire(&mut self, parsed: &ParsedIpv4<'_>, datagram: &[u8], link: &mut dyn LinkSender) {
        let new_ttl = parsed.ttl.wrapping_sub(1);

        if parsed.ttl > 1 {
            let Some(next_hop) = self.next_hop(parsed.dst) else {
                warn!(dst = %parsed.dst, "no route for forwarded datagram, dropping");
                return;
            };

            let mut forwarded = datagram.to_vec();
            forwarded[8] = new_ttl;
            forwarded[10] = 0;
            forwarded[11] = 0;
            let cksum = internet_checksum(&forwarded[..HEADER_LEN]);
            forwarded[10] = (cksum >> 8) as u8;
            forwarded[11] = (cksum & 0xFF) as u8;

            link.send(&forwarded, next_hop);
        } else {
            debug!(src = %parsed.src, dst = %parsed.dst, "TTL expired, sending ICMP Time Exceeded");
            let Some(return_hop) = self.next_hop(parsed.src) else {
                warn!(src = %parsed.src, "no route to report ICMP Time Exceeded, dropping");
                return;
            };

            let icmp_message = icmp::time_exceeded(parsed.header, parsed.payload);
            let id = self.next_identification();
            let header = build_header(self.my_address, parsed.src, icmp_message.len(), PROTO_ICMP, DEFAULT_TTL, id);

            let mut reply = Vec::with_capacity(header.len() + icmp_message.len());
            reply.extend_from_slice(&header);
            reply.extend_from_slice(&icmp_message);
            link.send(&reply, return_hop);
        }
    }

    /// Builds and forwards a TCP segment originating from this host.
    pub fn send_tcp(&mut self, segment: &[u8], dest: Ipv4Addr, link: &mut dyn LinkSender) {
        let Some(next_hop) = self.next_hop(dest) else {
            warn!(dst = %dest, "no route for outgoing segment, dropping");
            return;
        };

        let id = self.next_identification();
        let header = build_header(self.my_address, dest, segment.len(), PROTO_TCP, DEFAULT_TTL, id);

        let mut datagram = Vec::with_capacity(header.len() + segment.len());
        datagram.extend_from_slice(&header);
        datagram.extend_from_slice(segment);
        link.send(&datagram, next_hop);
    }

    pub fn my_address(&self) -> Ipv4Addr {
        self.my_address
    }

    pub fn checksum_segment(&self, dest: Ipv4Addr, segment: &[u8]) -> u16 {
        tcp_checksum(self.my_address, dest, segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::types::CidrRoute;

    struct RecordingLink {
        sent: Vec<(Vec<u8>, Ipv4Addr)>,
    }
    impl LinkSender for RecordingLink {
        fn send(&mut self, datagram: &[u8], next_hop: Ipv4Addr) {
            self.sent.push((datagram.to_vec(), next_hop));
        }
    }
    fn build_test_datagram(ttl: u8, dst: Ipv4Addr, protocol: u8, payload: &[u8]) -> Vec<u8> {
        let src: Ipv4Addr = "1.2.3.4".parse().unwrap();
        let header = build_header(src, dst, payload.len(), protocol, ttl, 0);
        let mut datagram = header.to_vec();
        datagram.extend_from_slice(payload);
        datagram
    }

    #[test]
    fn delivers_tcp_addressed_to_this_host() {
        let my_addr: Ipv4Addr = "192.168.123.2".parse().unwrap();
        let mut engine = Ipv4Engine::new(my_addr, RoutingTrie::new());
        let mut link = RecordingLink { sent: vec![] };

        let datagram = build_test_datagram(64, my_addr, PROTO_TCP, b"hello");
        let delivered = engine.handle_incoming(&datagram, &mut link);

        let delivered = delivered.expect("segment addressed to this host should be delivered");
        assert_eq!(delivered.payload, b"hello");
        assert!(link.sent.is_empty());
    }

    #[test]
    fn forwards_with_decremented_ttl_and_recomputed_checksum() {
        let my_addr: Ipv4Addr = "192.168.123.2".parse().unwrap();
        let dest: Ipv4Addr = "10.0.0.9".parse().unwrap();
        let mut trie = RoutingTrie::new();
        trie.insert_cidr(CidrRoute::parse("0.0.0.0/0", "192.168.123.1").unwrap());
        let mut engine = Ipv4Engine::new(my_addr, trie);
        let mut link = RecordingLink { sent: vec![] };

        let datagram = build_test_datagram(2, dest, PROTO_TCP, b"x");
        let delivered = engine.handle_incoming(&datagram, &mut link);
        assert!(delivered.is_none());

        assert_eq!(link.sent.len(), 1);
        let (forwarded, next_hop) = &link.sent[0];
        assert_eq!(next_hop.to_string(), "192.168.123.1");
        assert_eq!(forwarded[8], 1);
        assert_eq!(internet_checksum(&forwarded[..HEADER_LEN]), 0);
    }

    #[test]
    fn ttl_one_produces_icmp_time_exceeded() {
        let my_addr: Ipv4Addr = "192.168.123.2".parse().unwrap();
        let dest: Ipv4Addr = "10.0.0.9".parse().unwrap();
        let mut trie = RoutingTrie::new();
        trie.insert_cidr(CidrRoute::parse("0.0.0.0/0", "192.168.123.1").unwrap());
        let mut engine = Ipv4Engine::new(my_addr, trie);
        let mut link = RecordingLink { sent: vec![] };

        let datagram = build_test_datagram(1, dest, PROTO_TCP, b"0123456789abcdef");
        let delivered = engine.handle_incoming(&datagram, &mut link);
        assert!(delivered.is_none());

        assert_eq!(link.sent.len(), 1);
        let (reply, _next_hop) = &link.sent[0];
        let parsed = parse(reply).unwrap();
        assert_eq!(parsed.protocol, PROTO_ICMP);
        assert_eq!(parsed.payload[0], 11); // type: time exceeded
        assert_eq!(parsed.payload[1], 0); // code
        // original header + first 8 bytes of payload follow the 8-byte ICMP header
        assert_eq!(&parsed.payload[8..8 + HEADER_LEN], &datagram[..HEADER_LEN]);
        assert_eq!(&parsed.payload[8 + HEADER_LEN..8 + HEADER_LEN + 8], &datagram[HEADER_LEN..HEADER_LEN + 8]);
    }
}
