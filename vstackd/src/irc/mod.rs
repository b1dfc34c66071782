//! The IRC application sitting on top of the TCP engine: a small RFC 1459
//! subset (`NICK`/`JOIN`/`PART`/`PRIVMSG`/`PING`, plus `QUIT`-on-disconnect)
//! over a nickname and channel registry.
//!
//! Replies are queued rather than sent inline from [`TcpConnectionUpper`]/
//! [`TcpApplication`] callbacks: those callbacks run while the triggering
//! connection is already borrowed out of the TCP server's connection table,
//! so calling back into it to send a reply would alias that borrow. The
//! net stack drains [`OutboundQueue`] once the triggering segment has
//! finished processing instead — collect under the borrow, send after it
//! drops.

pub mod commands;
pub mod connection;
pub mod parser;

use std::collections::{HashMap, HashSet};

use tracing::info;

use crate::net::tcp::recv::TcpConnectionUpper;
use crate::net::tcp::server::{OutboundQueue, TcpApplication};
use crate::net::types::ConnectionId;

use connection::ConnectionState;

pub struct IrcServer {
    connections: HashMap<ConnectionId, ConnectionState>,
    /// Lowercased nickname to the connection currently holding it.
    nicks: HashMap<Vec<u8>, ConnectionId>,
    /// Lowercased channel name (with leading `#`) to its member set.
    channels: HashMap<Vec<u8>, HashSet<ConnectionId>>,
    outbound: Vec<(ConnectionId, Vec<u8>)>,
    closing: Vec<ConnectionId>,
}

impl IrcServer {
    pub fn new() -> Self {
        IrcServer {
            connections: HashMap::new(),
            nicks: HashMap::new(),
            channels: HashMap::new(),
            outbound: Vec::new(),
            closing: Vec::new(),
        }
    }

    fn reply(&mut self, id: ConnectionId, line: Vec<u8>) {
        self.outbound.push((id, line));
    }

    fn connection_left(&mut self, id: ConnectionId) {
        self.process_exit(id);
        self.connections.remove(&id);
        info!(%id, "IRC connection closed");
        self.closing.push(id);
    }
}

impl Default for IrcServer {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpConnectionUpper for IrcServer {
    fn deliver(&mut self, id: ConnectionId, payload: &[u8]) {
        if payload.is_empty() {
            self.connection_left(id);
            return;
        }

        let lines = {
            let Some(state) = self.connections.get_mut(&id) else { return };
            parser::extract_lines(&mut state.residue, payload)
        };

        for message in lines {
            self.interpret_message(id, &message);
        }
    }
}

impl TcpApplication for IrcServer {
    fn on_accept(&mut self, id: ConnectionId) {
        info!(%id, "new IRC connection");
        self.connections.insert(id, ConnectionState::new());
    }
}

impl OutboundQueue for IrcServer {
    fn drain_sends(&mut self) -> Vec<(ConnectionId, Vec<u8>)> {
        std::mem::take(&mut self.outbound)
    }

    fn drain_closes(&mut self) -> Vec<ConnectionId> {
        std::mem::take(&mut self.closing)
    }
}
