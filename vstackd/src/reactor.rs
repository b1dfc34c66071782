//! Single-threaded, `mio`-driven event loop. The whole stack is built to
//! run cooperatively on one thread — no locking anywhere above this file —
//! so the reactor's only job is to decide what runs next: drain the serial
//! device when it's readable, and otherwise sweep retransmission timers on
//! a fixed tick.

use std::time::{Duration, Instant};

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use tracing::debug;

use crate::error::{Error, Result};
use crate::irc::IrcServer;
use crate::net::types::Ipv4Addr;
use crate::net::NetStack;
use crate::serial::Serial;
use crate::slip::SlipEngine;

const SERIAL_TOKEN: Token = Token(0);
const TIMER_TICK: Duration = Duration::from_millis(200);

pub struct Reactor {
    poll: Poll,
    serial: Serial,
    peer: Ipv4Addr,
    link: SlipEngine,
    net: NetStack,
    app: IrcServer,
}

impl Reactor {
    pub fn new(serial: Serial, peer: Ipv4Addr, link: SlipEngine, net: NetStack, app: IrcServer) -> Result<Self> {
        let poll = Poll::new().map_err(Error::ReactorRegister)?;
        poll.registry()
            .register(&mut SourceFd(&serial.raw_fd()), SERIAL_TOKEN, Interest::READABLE)
            .map_err(Error::ReactorRegister)?;
        Ok(Reactor { poll, serial, peer, link, net, app })
    }

    /// Runs forever, alternating between draining the serial device and
    /// sweeping retransmission timers. Never returns except on a fatal
    /// reactor error.
    pub fn run(&mut self) -> Result<()> {
        let mut events = Events::with_capacity(16);
        loop {
            match self.poll.poll(&mut events, Some(TIMER_TICK)) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(Error::ReactorPoll(err)),
            }

            for event in events.iter() {
                if event.token() == SERIAL_TOKEN && event.is_readable() {
                    self.drain_serial()?;
                }
            }

            self.net.poll_timers(Instant::now(), &mut self.link);
        }
    }

    fn drain_serial(&mut self) -> Result<()> {
        let bytes = self.serial.read_available()?;
        if bytes.is_empty() {
            return Ok(());
        }

        let frames = self.link.on_bytes(self.peer, &bytes);
        let now = Instant::now();
        for frame in frames {
            debug!(len = frame.len(), "decoded SLIP frame");
            self.net.handle_datagram(&frame, &mut self.link, &mut self.app, now);
        }
        Ok(())
    }
}
