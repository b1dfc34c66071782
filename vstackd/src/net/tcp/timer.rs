//! Retransmission timer handling.
//!
//! The engine scans every live connection each reactor tick rather than
//! maintaining a timer wheel — connection counts are small and this keeps
//! the cooperative-loop model in §5 honest (no hidden per-connection tasks).

use std::time::Instant;

use super::tcb::Connection;
use crate::net::ipv4::{Ipv4Engine, LinkSender};

impl Connection {
    pub fn retransmit_is_due(&self, now: Instant) -> bool {
        matches!(self.retransmit_deadline, Some(deadline) if now >= deadline)
    }

    /// Fires the retransmission timer: halves the window and resends the
    /// first unacked segment, marking it retransmitted so its eventual ACK
    /// cannot be used as an RTT sample (Karn's rule). Rearms only if
    /// segments remain unacked after the fire — firing on an empty
    /// `unacked_segments` is dead work the original left running forever.
    pub fn fire_retransmit_timer(&mut self, now: Instant, ip: &mut Ipv4Engine, link: &mut dyn LinkSender) {
        if let Some(first) = self.unacked_segments.first() {
            let encoded = first.encoded.clone();
            let remote = self.remote_ip();

            self.current_window_size = (self.current_window_size / 2).max(1);
            ip.send_tcp(&encoded, remote, link);
            self.unacked_segments[0].retransmitted = true;
        }

        self.retransmit_deadline =
            if self.unacked_segments.is_empty() { None } else { Some(now + self.timeout_interval()) };
    }
}
