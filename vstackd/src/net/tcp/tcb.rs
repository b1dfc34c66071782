//! Wire format, protocol constants, and the per-connection control block.

use std::time::Instant;

use crate::net::types::{ConnectionId, Ipv4Addr};

pub const MSS: usize = 1460;
pub const TCP_HEADER_LEN: usize = 20;
/// Fixed advertised window: 8 MSS, per the wire format — no receive-window
/// tracking or flow control beyond the congestion window.
pub const ADVERTISED_WINDOW: u16 = (8 * MSS) as u16;

pub const FLAG_FIN: u8 = 1 << 0;
pub const FLAG_SYN: u8 = 1 << 1;
pub const FLAG_RST: u8 = 1 << 2;
pub const FLAG_ACK: u8 = 1 << 4;

pub struct ParsedSegment<'a> {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq_no: u32,
    pub ack_no: u32,
    pub flags: u8,
    pub window: u16,
    pub payload: &'a [u8],
}

/// Parses a 20-byte-header TCP segment (no options are understood; any
/// `data_offset` is honored for skipping, but option bytes themselves are
/// ignored).
pub fn parse(segment: &[u8]) -> Option<ParsedSegment<'_>> {
    if segment.len() < TCP_HEADER_LEN {
        return None;
    }
    let src_port = u16::from_be_bytes([segment[0], segment[1]]);
    let dst_port = u16::from_be_bytes([segment[2], segment[3]]);
    let seq_no = u32::from_be_bytes([segment[4], segment[5], segment[6], segment[7]]);
    let ack_no = u32::from_be_bytes([segment[8], segment[9], segment[10], segment[11]]);
    let data_offset = ((segment[12] >> 4) as usize) * 4;
    let flags = segment[13];
    let window = u16::from_be_bytes([segment[14], segment[15]]);
    if segment.len() < data_offset {
        return None;
    }
    Some(ParsedSegment { src_port, dst_port, seq_no, ack_no, flags, window, payload: &segment[data_offset..] })
}

/// Builds a 20-byte TCP header (no options, `data_offset = 5`) followed by
/// `payload`. The checksum field is left zeroed; callers fold it in via
/// [`crate::net::checksum::tcp_checksum`] once source/destination addresses
/// are known.
pub fn build(local_port: u16, remote_port: u16, seq_no: u32, ack_no: u32, flags: u8, payload: &[u8]) -> Vec<u8> {
    let mut segment = Vec::with_capacity(TCP_HEADER_LEN + payload.len());
    segment.extend_from_slice(&local_port.to_be_bytes());
    segment.extend_from_slice(&remote_port.to_be_bytes());
    segment.extend_from_slice(&seq_no.to_be_bytes());
    segment.extend_from_slice(&ack_no.to_be_bytes());
    segment.push(0x50); // data_offset = 5, reserved = 0
    segment.push(flags);
    segment.extend_from_slice(&ADVERTISED_WINDOW.to_be_bytes());
    segment.extend_from_slice(&[0, 0]); // checksum placeholder
    segment.extend_from_slice(&[0, 0]); // urgent pointer
    segment.extend_from_slice(payload);
    segment
}

/// A segment handed to the link layer but not yet acknowledged.
pub struct UnackedSegment {
    pub seq_no: u32,
    pub encoded: Vec<u8>,
    pub send_time: Instant,
    pub retransmitted: bool,
}

/// A segment awaiting window room before it can be sent at all.
pub struct QueuedSegment {
    pub seq_no: u32,
    pub flags: u8,
    pub payload: Vec<u8>,
}

/// Everything a single accepted TCP flow needs to track. Fields mirror
/// §3's data model directly.
pub struct Connection {
    pub id: ConnectionId,

    pub current_seq_no: u32,
    pub last_acked_no: u32,
    pub expected_seq_no: u32,
    pub current_window_size: u32,

    pub unacked_segments: Vec<UnackedSegment>,
    pub sending_queue: std::collections::VecDeque<QueuedSegment>,

    pub estimated_rtt: Option<f64>,
    pub dev_rtt: Option<f64>,

    pub handshake_complete: bool,
    pub ready_to_close: bool,

    pub retransmit_deadline: Option<Instant>,
}

impl Connection {
    /// A connection created from a SYN with peer sequence `peer_seq`.
    pub fn from_syn(id: ConnectionId, peer_seq: u32, initial_seq: u32) -> Self {
        Connection {
            id,
            current_seq_no: initial_seq,
            last_acked_no: initial_seq,
            expected_seq_no: peer_seq.wrapping_add(1),
            current_window_size: 1,
            unacked_segments: Vec::new(),
            sending_queue: std::collections::VecDeque::new(),
            estimated_rtt: None,
            dev_rtt: None,
            handshake_complete: false,
            ready_to_close: false,
            retransmit_deadline: None,
        }
    }

    pub fn local_port(&self) -> u16 {
        self.id.dst_port
    }

    pub fn remote_port(&self) -> u16 {
        self.id.src_port
    }

    pub fn remote_ip(&self) -> Ipv4Addr {
        self.id.src_ip
    }

    pub fn local_ip(&self) -> Ipv4Addr {
        self.id.dst_ip
    }

    pub fn inflight_bytes(&self) -> u32 {
        match self.unacked_segments.last() {
            None => 0,
            Some(seg) => seg.seq_no.wrapping_sub(self.last_acked_no).wrapping_add(1),
        }
    }

    /// `timeout_interval()`: 3 seconds with no RTT sample yet, else
    /// `estimated + 4*dev`.
    pub fn timeout_interval(&self) -> std::time::Duration {
        match (self.estimated_rtt, self.dev_rtt) {
            (Some(estimated), Some(dev)) => {
                std::time::Duration::from_secs_f64((estimated + 4.0 * dev).max(0.0))
            }
            _ => std::time::Duration::from_secs(3),
        }
    }
}
