//! Process configuration: host/peer addressing, routing table, listen port,
//! and the serial device to use. Loadable from an optional YAML file and
//! overridable by CLI flags, mirroring the bootstrap in the reference
//! `run_irc.py` (host 192.168.123.2, peer 192.168.123.1, default route via
//! the peer, port 7000).

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::net::types::{CidrRoute, Ipv4Addr};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteEntry {
    pub cidr: String,
    pub next_hop: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host_address: String,
    pub peer_address: String,
    #[serde(default)]
    pub routes: Vec<RouteEntry>,
    #[serde(default = "default_port")]
    pub listen_port: u16,
    pub pty_path: Option<PathBuf>,
}

fn default_port() -> u16 {
    7000
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host_address: "192.168.123.2".to_string(),
            peer_address: "192.168.123.1".to_string(),
            routes: vec![RouteEntry {
                cidr: "0.0.0.0/0".to_string(),
                next_hop: "192.168.123.1".to_string(),
            }],
            listen_port: default_port(),
            pty_path: None,
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn host_addr(&self) -> Result<Ipv4Addr> {
        Ok(self.host_address.parse()?)
    }

    pub fn peer_addr(&self) -> Result<Ipv4Addr> {
        Ok(self.peer_address.parse()?)
    }

    pub fn cidr_routes(&self) -> Result<Vec<CidrRoute>> {
        self.routes
            .iter()
            .map(|r| CidrRoute::parse(&r.cidr, &r.next_hop).map_err(Error::from))
            .collect()
    }

    /// Applies CLI overrides on top of whatever was loaded from file/defaults.
    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(host) = &cli.host_address {
            self.host_address = host.clone();
        }
        if let Some(peer) = &cli.peer_address {
            self.peer_address = peer.clone();
        }
        if let Some(port) = cli.listen_port {
            self.listen_port = port;
        }
        if let Some(pty) = &cli.pty_path {
            self.pty_path = Some(pty.clone());
        }
        if !cli.route.is_empty() {
            self.routes = cli
                .route
                .iter()
                .filter_map(|entry| {
                    let (cidr, next_hop) = entry.split_once('=')?;
                    Some(RouteEntry { cidr: cidr.to_string(), next_hop: next_hop.to_string() })
                })
                .collect();
        }
    }
}

/// A user-space SLIP/IPv4/TCP stack fronting a small IRC server.
#[derive(Debug, Parser)]
#[command(name = "vstackd", version, about)]
pub struct Cli {
    /// Path to a YAML configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// This host's IPv4 address, e.g. 192.168.123.2.
    #[arg(long)]
    pub host_address: Option<String>,

    /// The SLIP peer's IPv4 address, e.g. 192.168.123.1.
    #[arg(long)]
    pub peer_address: Option<String>,

    /// IRC listen port.
    #[arg(long)]
    pub listen_port: Option<u16>,

    /// Path to an existing PTY/serial device to use instead of allocating one.
    #[arg(long)]
    pub pty_path: Option<PathBuf>,

    /// Routing table entry of the form "cidr=next_hop"; may be repeated.
    /// Replaces the configured routing table entirely when given.
    #[arg(long = "route")]
    pub route: Vec<String>,
}

/// Loads the configuration file named on the command line (if any), falling
/// back to defaults, then layers any CLI overrides on top.
pub fn load(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_cli(cli);
    Ok(config)
}
