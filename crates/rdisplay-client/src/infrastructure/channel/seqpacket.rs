//! Unix `SOCK_SEQPACKET` channel to the display server.
//!
//! Sequenced packets keep message boundaries, so each `send` is one frame
//! and each `recv` returns exactly one frame.  The connect itself blocks, so
//! a server with a full accept backlog makes it wait rather than fail; the
//! socket is switched to non-blocking once connected.  After that only
//! [`Channel::wait_ready`] sleeps, in `poll(2)` without a timeout.

use std::io;
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::path::Path;

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::socket::{
    connect, recv, send, socket, AddressFamily, MsgFlags, SockFlag, SockType, UnixAddr,
};
use tracing::debug;

use crate::application::channel::{Channel, Connector, Interest};

/// A connected, non-blocking sequenced-packet socket.
#[derive(Debug)]
pub struct SeqPacketChannel {
    fd: OwnedFd,
}

impl SeqPacketChannel {
    /// Connects to the socket at `path`.
    ///
    /// # Errors
    ///
    /// `ENAMETOOLONG` when `path` does not fit a Unix socket address, and the
    /// error of `socket(2)` or `connect(2)`.
    pub fn connect(path: &Path) -> io::Result<Self> {
        let addr = UnixAddr::new(path)?;
        let fd = socket(
            AddressFamily::Unix,
            SockType::SeqPacket,
            SockFlag::SOCK_CLOEXEC,
            None,
        )?;
        loop {
            match connect(fd.as_raw_fd(), &addr) {
                Ok(()) => break,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        set_nonblocking(&fd)?;
        debug!(path = %path.display(), "seqpacket socket connected");
        Ok(Self { fd })
    }
}

fn set_nonblocking(fd: &OwnedFd) -> io::Result<()> {
    let flags = OFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFL)?);
    fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    Ok(())
}

impl Channel for SeqPacketChannel {
    fn send(&mut self, frame: &[u8]) -> io::Result<usize> {
        Ok(send(
            self.fd.as_raw_fd(),
            frame,
            MsgFlags::MSG_DONTWAIT | MsgFlags::MSG_NOSIGNAL,
        )?)
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // MSG_TRUNC reports the real length of a datagram that did not fit.
        Ok(recv(
            self.fd.as_raw_fd(),
            buf,
            MsgFlags::MSG_DONTWAIT | MsgFlags::MSG_TRUNC,
        )?)
    }

    fn wait_ready(&mut self, interest: Interest) -> io::Result<()> {
        let mut events = PollFlags::POLLIN;
        if interest.includes_write() {
            events |= PollFlags::POLLOUT;
        }
        loop {
            let mut fds = [PollFd::new(self.fd.as_fd(), events)];
            match poll(&mut fds, PollTimeout::NONE) {
                Ok(_) => return Ok(()),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Opens [`SeqPacketChannel`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeqPacketConnector;

impl Connector for SeqPacketConnector {
    fn connect(&self, address: &Path) -> io::Result<Box<dyn Channel>> {
        Ok(Box::new(SeqPacketChannel::connect(address)?))
    }
}
