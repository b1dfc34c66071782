//! A user-space network stack: SLIP framing over a serial line, an IPv4
//! host/router engine with longest-prefix-match routing, a simplified TCP
//! engine (AIMD congestion control, Karn/Jacobson RTT estimation), and a
//! small IRC server running on top of it.

pub mod config;
pub mod error;
pub mod irc;
pub mod net;
pub mod reactor;
pub mod serial;
pub mod slip;

pub use error::{Error, Result};
