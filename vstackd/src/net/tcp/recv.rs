//! Per-segment receive processing (`_rdt_rcv`).

use std::time::Instant;

use super::tcb::{Connection, ParsedSegment, FLAG_ACK, FLAG_FIN};
use crate::net::ipv4::{Ipv4Engine, LinkSender};
use crate::net::types::ConnectionId;

/// Receives application-layer bytes delivered in order from an established
/// connection. An empty payload signals EOF (the peer sent FIN).
pub trait TcpConnectionUpper {
    fn deliver(&mut self, id: ConnectionId, payload: &[u8]);
}

/// What the server-level demultiplexer should do with the connection after
/// this segment was processed.
pub enum Disposition {
    Keep,
    Remove,
}

impl Connection {
    /// Processes one incoming segment already addressed to this connection,
    /// in the exact order laid out for `_rdt_rcv`: FIN, then ACK bookkeeping,
    /// then in-order data delivery, then the trailing bare ACK.
    pub fn receive_segment(
        &mut self,
        segment: &ParsedSegment<'_>,
        ip: &mut Ipv4Engine,
        link: &mut dyn LinkSender,
        app: &mut dyn TcpConnectionUpper,
        now: Instant,
    ) -> Disposition {
        if segment.flags & FLAG_FIN != 0 {
            self.expected_seq_no = self.expected_seq_no.wrapping_add(1);
            self.send_segment(FLAG_ACK, b"", ip, link, now);
            app.deliver(self.id, b"");
            return Disposition::Keep;
        }

        if segment.flags & FLAG_ACK != 0 {
            if segment.ack_no > self.last_acked_no {
                self.retransmit_deadline = None;
                self.last_acked_no = segment.ack_no;

                if self.handshake_complete {
                    self.current_window_size += 1;
                }

                let first_still_unacked = self
                    .unacked_segments
                    .iter()
                    .position(|u| u.seq_no > self.last_acked_no.wrapping_sub(1));

                match first_still_unacked {
                    None => {
                        if let Some(last) = self.unacked_segments.last() {
                            if !last.retransmitted {
                                let sample = now.duration_since(last.send_time).as_secs_f64();
                                self.estimate_rtt(sample);
                            }
                        }
                        self.unacked_segments.clear();
                    }
                    Some(i) => {
                        if i > 0 && !self.unacked_segments[i - 1].retransmitted {
                            let sample = now.duration_since(self.unacked_segments[i - 1].send_time).as_secs_f64();
                            self.estimate_rtt(sample);
                        }
                        self.unacked_segments.drain(..i);
                        self.retransmit_deadline = Some(now + self.timeout_interval());
                    }
                }

                self.send_queue(ip, link, now);
            }

            if self.ready_to_close {
                return Disposition::Remove;
            }
            if segment.payload.is_empty() {
                return Disposition::Keep;
            }
        }

        if segment.seq_no == self.expected_seq_no {
            self.expected_seq_no = self.expected_seq_no.wrapping_add(segment.payload.len() as u32);
            if !segment.payload.is_empty() {
                app.deliver(self.id, segment.payload);
            }
        }

        self.send_segment(FLAG_ACK, b"", ip, link, now);
        Disposition::Keep
    }
}
