//! Crate-wide error type.
//!
//! Only the boundary-crossing, truly fallible operations (device setup,
//! configuration, CLI argument validation) produce one of these. Dropped
//! frames, bad checksums, and malformed IRC lines are outcomes handled
//! in place per the protocol engines' own state machines — never an
//! `Error` variant.

use crate::net::types::ParseAddrError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid address or route in configuration: {0}")]
    InvalidAddress(#[from] ParseAddrError),

    #[error("failed to open PTY device: {0}")]
    PtyOpen(#[source] std::io::Error),

    #[error("failed to configure PTY terminal attributes: {0}")]
    PtyTermios(#[source] rustix::io::Errno),

    #[error("I/O error on PTY device: {0}")]
    PtyIo(#[source] std::io::Error),

    #[error("failed to register serial device with the event loop: {0}")]
    ReactorRegister(#[source] std::io::Error),

    #[error("failed to poll the event loop: {0}")]
    ReactorPoll(#[source] std::io::Error),
}
