//! SLIP (RFC 1055) framer: byte-stuffs/de-stuffs `C0`/`DB` and turns a
//! byte-oriented serial line into a datagram-oriented link.
//!
//! Decoding never calls back into caller code mid-frame — it returns
//! completed frames as a batch once the input is exhausted, which is the
//! Rust-idiomatic way to guarantee the decoder's own state can never be
//! corrupted by whatever the caller does with a frame: there is no callback
//! for a fault in the upper layer to unwind through in the first place.

use std::collections::HashMap;

use tracing::warn;

use crate::net::ipv4::LinkSender;
use crate::net::types::Ipv4Addr;

const END: u8 = 0xC0;
const ESC: u8 = 0xDB;
const ESC_END: u8 = 0xDC;
const ESC_ESC: u8 = 0xDD;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum DecodeState {
    Idle,
    Reading,
    Escape,
}

/// A serial device the link layer can write encoded frames to.
pub trait SerialSink {
    fn send(&mut self, bytes: &[u8]);
}

/// One SLIP link over a single serial line: an accumulating frame buffer
/// plus the three-state decoder.
pub struct Link {
    sink: Box<dyn SerialSink>,
    buffer: Vec<u8>,
    state: DecodeState,
}

impl Link {
    pub fn new(sink: Box<dyn SerialSink>) -> Self {
        Link { sink, buffer: Vec::new(), state: DecodeState::Idle }
    }

    /// Encodes `datagram` and writes the framed bytes to the serial line.
    /// Empty datagrams must not be emitted.
    pub fn send(&mut self, datagram: &[u8]) {
        if datagram.is_empty() {
            warn!("refusing to emit an empty SLIP frame");
            return;
        }

        let mut frame = Vec::with_capacity(datagram.len() + 2);
        frame.push(END);
        for &byte in datagram {
            match byte {
                END => frame.extend_from_slice(&[ESC, ESC_END]),
                ESC => frame.extend_from_slice(&[ESC, ESC_ESC]),
                other => frame.push(other),
            }
        }
        frame.push(END);
        self.sink.send(&frame);
    }

    /// Runs raw bytes from the serial line through the decoder, returning
    /// every complete frame produced. Frames delimited back-to-back with no
    /// content between them (`C0 C0`) are silently swallowed.
    pub fn on_bytes(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();

        for &byte in data {
            match self.state {
                DecodeState::Idle => match byte {
                    ESC => self.state = DecodeState::Escape,
                    END => self.state = DecodeState::Reading,
                    _ => {
                        self.buffer.push(byte);
                        self.state = DecodeState::Reading;
                    }
                },
                DecodeState::Reading => match byte {
                    END => {
                        if !self.buffer.is_empty() {
                            frames.push(std::mem::take(&mut self.buffer));
                        }
                        self.state = DecodeState::Idle;
                    }
                    ESC => self.state = DecodeState::Escape,
                    _ => self.buffer.push(byte),
                },
                DecodeState::Escape => {
                    match byte {
                        ESC_END => self.buffer.push(END),
                        ESC_ESC => self.buffer.push(ESC),
                        _ => {} // unknown escape: discard silently
                    }
                    self.state = DecodeState::Reading;
                }
            }
        }

        frames
    }
}

/// Owns one [`Link`] per configured peer and dispatches outgoing datagrams
/// to whichever link reaches the given next hop.
pub struct SlipEngine {
    links: HashMap<Ipv4Addr, Link>,
}

impl SlipEngine {
    pub fn new() -> Self {
        SlipEngine { links: HashMap::new() }
    }

    pub fn add_link(&mut self, peer: Ipv4Addr, sink: Box<dyn SerialSink>) {
        self.links.insert(peer, Link::new(sink));
    }

    /// Feeds bytes that arrived on the link to `peer`, returning any
    /// complete datagrams it produced.
    pub fn on_bytes(&mut self, peer: Ipv4Addr, data: &[u8]) -> Vec<Vec<u8>> {
        match self.links.get_mut(&peer) {
            Some(link) => link.on_bytes(data),
            None => {
                warn!(%peer, "bytes received from an unconfigured link");
                Vec::new()
            }
        }
    }
}

impl Default for SlipEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkSender for SlipEngine {
    fn send(&mut self, datagram: &[u8], next_hop: Ipv4Addr) {
        match self.links.get_mut(&next_hop) {
            Some(link) => link.send(datagram),
            None => warn!(%next_hop, "no link configured to reach this next hop"),
        }
    }
}
