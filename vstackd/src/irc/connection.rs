//! Per-connection IRC registration state.

use std::collections::BTreeSet;

/// Placeholder nickname for a connection that has not sent a valid `NICK`
/// yet. Mirrors the reference server's `b'*'` sentinel.
pub const UNREGISTERED_NICK: &[u8] = b"*";

pub struct ConnectionState {
    /// Bytes received but not yet split into a complete `\r\n`-terminated line.
    pub residue: Vec<u8>,
    pub nickname: Vec<u8>,
    /// Lowercased channel names (including the leading `#`) this connection has joined.
    pub channels: BTreeSet<Vec<u8>>,
}

impl ConnectionState {
    pub fn new() -> Self {
        ConnectionState { residue: Vec::new(), nickname: UNREGISTERED_NICK.to_vec(), channels: BTreeSet::new() }
    }

    pub fn is_registered(&self) -> bool {
        self.nickname != UNREGISTERED_NICK
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}
