//! The message channel between the session and the display server.
//!
//! A channel moves whole frames: one `send` writes one frame and one `recv`
//! returns one frame.  It never blocks except inside [`Channel::wait_ready`].

use std::io;
use std::path::Path;

/// Readiness a blocking wait is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    /// Wake when a frame can be read.
    Readable,
    /// Wake when a frame can be read or queued output can be written.
    ReadableOrWritable,
}

impl Interest {
    pub fn includes_write(self) -> bool {
        matches!(self, Interest::ReadableOrWritable)
    }
}

/// A connected, message-boundary-preserving, non-blocking channel.
pub trait Channel: Send {
    /// Writes as much of `frame` as the channel accepts.
    ///
    /// # Errors
    ///
    /// [`io::ErrorKind::WouldBlock`] when nothing can be written now,
    /// [`io::ErrorKind::Interrupted`] when a signal interrupted the call, and
    /// any other error when the channel is broken.
    fn send(&mut self, frame: &[u8]) -> io::Result<usize>;

    /// Reads one frame into `buf`, returning the frame's full length.  A
    /// frame longer than `buf` is truncated but its real length is still
    /// returned.  `Ok(0)` means the peer closed the channel.
    ///
    /// # Errors
    ///
    /// Same conventions as [`Channel::send`].
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Suspends the calling thread until the channel is ready for `interest`.
    /// There is no timeout.
    ///
    /// # Errors
    ///
    /// Returns the readiness primitive's error.  Implementations retry
    /// signal interruptions themselves.
    fn wait_ready(&mut self, interest: Interest) -> io::Result<()>;
}

/// Opens a [`Channel`] to a server address.
pub trait Connector {
    /// # Errors
    ///
    /// Returns an I/O error when the address cannot be encoded or the
    /// connection is refused.
    fn connect(&self, address: &Path) -> io::Result<Box<dyn Channel>>;
}

/// Outcome of one non-blocking receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Received {
    Frame(usize),
    /// A frame longer than the buffer; its tail was lost.
    Oversized(usize),
    WouldBlock,
    Closed,
}

/// Receives one frame, retrying signal interruptions.
pub(crate) fn receive(channel: &mut dyn Channel, buf: &mut [u8]) -> io::Result<Received> {
    loop {
        match channel.recv(buf) {
            Ok(0) => return Ok(Received::Closed),
            Ok(n) if n > buf.len() => return Ok(Received::Oversized(n)),
            Ok(n) => return Ok(Received::Frame(n)),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Received::WouldBlock),
            Err(e) => return Err(e),
        }
    }
}
