use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vstackd::config::{self, Cli};
use vstackd::irc::IrcServer;
use vstackd::net::trie::RoutingTrie;
use vstackd::net::NetStack;
use vstackd::reactor::Reactor;
use vstackd::serial::Serial;
use vstackd::slip::SlipEngine;
use vstackd::Result;

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let config = config::load(&cli)?;

    let host_addr = config.host_addr()?;
    let peer_addr = config.peer_addr()?;

    let mut trie = RoutingTrie::new();
    for route in config.cidr_routes()? {
        trie.insert_cidr(route);
    }

    let serial = match &config.pty_path {
        Some(path) => Serial::open_path(path)?,
        None => {
            let (serial, subordinate_path) = Serial::open_pty()?;
            info!(%subordinate_path, "connect the peer to this PTY subordinate");
            serial
        }
    };

    // The reactor reads from `serial` directly; the SLIP link writes
    // through a duplicated handle to the same device, so the two duties
    // don't have to fight over one owner.
    let writer = serial.try_clone()?;
    let mut link = SlipEngine::new();
    link.add_link(peer_addr, Box::new(writer));

    let net = NetStack::new(host_addr, trie, config.listen_port);
    let app = IrcServer::new();

    info!(%host_addr, %peer_addr, port = config.listen_port, "starting vstackd");

    let mut reactor = Reactor::new(serial, peer_addr, link, net, app)?;
    reactor.run()
}
