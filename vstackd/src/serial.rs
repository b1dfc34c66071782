//! Serial endpoint the SLIP link runs over: either a freshly allocated PTY
//! pair (the controller side is ours, the subordinate side's path is logged
//! for a peer process to open) or an existing device path handed in via
//! configuration. Put in raw, non-blocking mode the way a real terminal
//! line would be for protocol framing rather than line editing.

use std::ffi::CStr;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::Path;

use rustix::termios;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::slip::SerialSink;

pub struct Serial {
    file: File,
}

impl Serial {
    /// Allocates a fresh PTY pair, configures the controller side, and
    /// returns it along with the path of the subordinate side.
    pub fn open_pty() -> Result<(Self, String)> {
        let mut controller_fd: libc::c_int = -1;
        let mut subordinate_fd: libc::c_int = -1;
        let rc = unsafe {
            libc::openpty(
                &mut controller_fd,
                &mut subordinate_fd,
                std::ptr::null_mut(),
                std::ptr::null(),
                std::ptr::null(),
            )
        };
        if rc != 0 {
            return Err(Error::PtyOpen(io::Error::last_os_error()));
        }

        let controller = unsafe { OwnedFd::from_raw_fd(controller_fd) };
        let path = ptsname(controller_fd)?;
        // The subordinate fd was only needed to exist while granting the
        // PTY; the peer process opens it by path.
        unsafe { libc::close(subordinate_fd) };

        set_raw_mode(controller.as_raw_fd())?;
        set_nonblocking(controller.as_raw_fd())?;

        info!(%path, "allocated PTY, peer should connect to the subordinate side");
        Ok((Serial { file: File::from(controller) }, path))
    }

    /// Opens an already-existing serial device path (e.g. a real tty, or a
    /// PTY subordinate another process allocated) in raw, non-blocking mode.
    pub fn open_path(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(Error::PtyOpen)?;
        set_raw_mode(file.as_raw_fd())?;
        set_nonblocking(file.as_raw_fd())?;
        info!(path = %path.display(), "opened serial device");
        Ok(Serial { file })
    }

    pub fn raw_fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    /// Duplicates the underlying fd so writes (the [`SerialSink`] the link
    /// layer holds) and non-blocking reads (driven by the reactor) can be
    /// owned by two independent handles to the same device.
    pub fn try_clone(&self) -> Result<Serial> {
        let file = self.file.try_clone().map_err(Error::PtyIo)?;
        Ok(Serial { file })
    }

    /// Drains whatever is currently available without blocking. An empty
    /// `Ok` return means "nothing more right now", not end of stream; a
    /// peer hangup (`EIO`, matching a PTY whose subordinate side closed)
    /// is logged and also treated as "nothing more for now" rather than
    /// a hard error, since the peer may still reopen the device.
    pub fn read_available(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            match self.file.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => out.extend_from_slice(&buf[..n]),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) if err.raw_os_error() == Some(libc::EIO) => {
                    warn!("peer is not connected to the serial device (EIO)");
                    break;
                }
                Err(err) => return Err(Error::PtyIo(err)),
            }
        }
        Ok(out)
    }
}

impl SerialSink for Serial {
    fn send(&mut self, bytes: &[u8]) {
        if let Err(err) = self.file.write_all(bytes) {
            warn!(%err, "failed writing to serial device");
        }
    }
}

fn ptsname(controller_fd: libc::c_int) -> Result<String> {
    let mut buf = [0i8; 4096];
    let rc = unsafe { libc::ptsname_r(controller_fd, buf.as_mut_ptr(), buf.len()) };
    if rc != 0 {
        return Err(Error::PtyOpen(io::Error::last_os_error()));
    }
    let cstr = unsafe { CStr::from_ptr(buf.as_ptr()) };
    Ok(cstr.to_string_lossy().into_owned())
}

fn set_raw_mode(fd: RawFd) -> Result<()> {
    let mut attrs = termios::tcgetattr(unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) })
        .map_err(Error::PtyTermios)?;
    attrs.make_raw();
    termios::tcsetattr(
        unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) },
        termios::OptionalActions::Now,
        &attrs,
    )
    .map_err(Error::PtyTermios)?;
    Ok(())
}

fn set_nonblocking(fd: RawFd) -> Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };
    if flags < 0 {
        return Err(Error::PtyOpen(io::Error::last_os_error()));
    }
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(Error::PtyOpen(io::Error::last_os_error()));
    }
    Ok(())
}
