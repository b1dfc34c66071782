//! Jacobson/Karn RTT estimator.

use super::tcb::Connection;

const ALPHA: f64 = 0.125;
const BETA: f64 = 0.25;

impl Connection {
    /// Feeds a clean RTT sample (in seconds) into the estimator. The very
    /// first call after a connection is born is the handshake-closing ACK
    /// and must not be sampled — it only flips `handshake_complete`.
    pub fn estimate_rtt(&mut self, sample_rtt: f64) {
        if !self.handshake_complete {
            self.handshake_complete = true;
            return;
        }

        match (self.estimated_rtt, self.dev_rtt) {
            (None, _) | (_, None) => {
                self.estimated_rtt = Some(sample_rtt);
                self.dev_rtt = Some(sample_rtt / 2.0);
            }
            (Some(estimated), Some(dev)) => {
                let new_estimated = (1.0 - ALPHA) * estimated + ALPHA * sample_rtt;
                let new_dev = (1.0 - BETA) * dev + BETA * (sample_rtt - new_estimated).abs();
                self.estimated_rtt = Some(new_estimated);
                self.dev_rtt = Some(new_dev);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::types::{ConnectionId, Ipv4Addr};

    fn test_connection() -> Connection {
        let id = ConnectionId {
            src_ip: Ipv4Addr::new(10, 0, 0, 1),
            src_port: 1234,
            dst_ip: Ipv4Addr::new(10, 0, 0, 2),
            dst_port: 7000,
        };
        Connection::from_syn(id, 100, 5000)
    }

    #[test]
    fn handshake_closing_ack_is_not_sampled() {
        let mut conn = test_connection();
        assert!(!conn.handshake_complete);
        conn.estimate_rtt(0.2);
        assert!(conn.handshake_complete);
        assert_eq!(conn.estimated_rtt, None);
    }

    #[test]
    fn first_real_sample_initializes_dev_as_half() {
        let mut conn = test_connection();
        conn.estimate_rtt(0.2); // handshake ack, discarded
        conn.estimate_rtt(0.4);
        assert_eq!(conn.estimated_rtt, Some(0.4));
        assert_eq!(conn.dev_rtt, Some(0.2));
    }

    #[test]
    fn subsequent_samples_follow_jacobson_formula() {
        let mut conn = test_connection();
        conn.estimate_rtt(0.2); // handshake ack
        conn.estimate_rtt(0.4);
        conn.estimate_rtt(0.6);

        let expected_estimated = 0.75 * 0.4 + 0.125 * 0.6;
        let expected_dev = 0.75 * 0.2 + 0.25 * (0.6 - expected_estimated).abs();
        assert!((conn.estimated_rtt.unwrap() - expected_estimated).abs() < 1e-9);
        assert!((conn.dev_rtt.unwrap() - expected_dev).abs() < 1e-9);
    }

    #[test]
    fn timeout_interval_defaults_to_three_seconds() {
        let conn = test_connection();
        assert_eq!(conn.timeout_interval(), std::time::Duration::from_secs(3));
    }
}
