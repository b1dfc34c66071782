//! Segment construction and the sliding send pipeline.

use std::time::Instant;

use super::tcb::{build, Connection, QueuedSegment, UnackedSegment, FLAG_FIN, FLAG_SYN, MSS, TCP_HEADER_LEN};
use crate::net::ipv4::{Ipv4Engine, LinkSender};

impl Connection {
    /// `send_segment(flags, payload)`: splits `payload` into MSS-sized
    /// chunks, each enqueued with a monotonically advancing sequence
    /// number, then drains the queue against the current window.
    pub fn send_segment(
        &mut self,
        flags: u8,
        mut payload: &[u8],
        ip: &mut Ipv4Engine,
        link: &mut dyn LinkSender,
        now: Instant,
    ) {
        while payload.len() > MSS {
            self.sending_queue.push_back(QueuedSegment {
                seq_no: self.current_seq_no,
                flags,
                payload: payload[..MSS].to_vec(),
            });
            self.current_seq_no = self.current_seq_no.wrapping_add(MSS as u32);
            payload = &payload[MSS..];
        }

        self.sending_queue.push_back(QueuedSegment { seq_no: self.current_seq_no, flags, payload: payload.to_vec() });
        self.current_seq_no = self.current_seq_no.wrapping_add(payload.len() as u32);
        if payload.is_empty() && (flags & (FLAG_SYN | FLAG_FIN)) != 0 {
            self.current_seq_no = self.current_seq_no.wrapping_add(1);
        }

        self.send_queue(ip, link, now);
    }

    /// Pops the queue head while `inflight_bytes + head_len <= window * MSS`.
    pub fn send_queue(&mut self, ip: &mut Ipv4Engine, link: &mut dyn LinkSender, now: Instant) {
        let window_bytes = self.current_window_size as usize * MSS;

        while let Some(head) = self.sending_queue.front() {
            if self.inflight_bytes() as usize + head.payload.len() > window_bytes {
                break;
            }
            let QueuedSegment { seq_no, flags, payload } = self.sending_queue.pop_front().unwrap();

            let mut segment = build(self.local_port(), self.remote_port(), seq_no, self.expected_seq_no, flags, &payload);
            let cksum = ip.checksum_segment(self.remote_ip(), &segment);
            segment[16] = (cksum >> 8) as u8;
            segment[17] = (cksum & 0xFF) as u8;

            self.unacked_segments.push(UnackedSegment {
                seq_no,
                encoded: segment.clone(),
                send_time: now,
                retransmitted: false,
            });

            ip.send_tcp(&segment, self.remote_ip(), link);

            if self.retransmit_deadline.is_none() {
                self.retransmit_deadline = Some(now + self.timeout_interval());
            }
        }
    }
}

/// Size of a TCP header with no options; segments never exceed `MSS` bytes
/// of payload plus this header.
pub const MAX_SEGMENT_WIRE_LEN: usize = TCP_HEADER_LEN + MSS;
