//! Pending-write queue.
//!
//! Frames are written straight to the channel when it accepts them.  Only
//! when a write cannot complete is the frame (or its unwritten tail) queued,
//! and the queue is always flushed before a new frame is attempted so output
//! order is preserved.

use std::collections::VecDeque;
use std::io;

use tracing::debug;

use crate::application::channel::Channel;

/// Result of a flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    /// Everything queued has been written.
    Drained,
    /// The channel stopped accepting data; something is still queued.
    Pending,
}

#[derive(Debug)]
struct PendingBuffer {
    data: Vec<u8>,
    /// Bytes of `data` already written.
    consumed: usize,
}

impl PendingBuffer {
    fn remaining(&self) -> &[u8] {
        &self.data[self.consumed..]
    }
}

/// Ordered queue of outbound frames not yet fully written.
#[derive(Debug, Default)]
pub struct PendingWrites {
    queue: VecDeque<PendingBuffer>,
}

impl PendingWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `frame` to the tail.
    pub fn enqueue(&mut self, frame: Vec<u8>) {
        self.enqueue_from(frame, 0);
    }

    fn enqueue_from(&mut self, data: Vec<u8>, consumed: usize) {
        self.queue.push_back(PendingBuffer { data, consumed });
    }

    /// Number of queued frames.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Bytes still waiting to be written.
    pub fn pending_bytes(&self) -> usize {
        self.queue.iter().map(|b| b.remaining().len()).sum()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Writes queued frames head first until the queue is empty or the
    /// channel would block.  A partially written head stays at the front and
    /// resumes from where it stopped on the next call.
    ///
    /// # Errors
    ///
    /// Any I/O error other than would-block or interrupted.  The session is
    /// dead when this fails.
    pub fn try_flush(&mut self, channel: &mut dyn Channel) -> io::Result<FlushStatus> {
        while let Some(head) = self.queue.front_mut() {
            debug!(bytes = head.remaining().len(), "sending buffered output");
            match channel.send(head.remaining()) {
                Ok(0) => return Err(write_zero()),
                Ok(n) => {
                    head.consumed += n;
                    if head.consumed >= head.data.len() {
                        self.queue.pop_front();
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(FlushStatus::Pending),
                Err(e) => return Err(e),
            }
        }
        Ok(FlushStatus::Drained)
    }

    /// Sends `frame`, queueing whatever cannot be written immediately.
    ///
    /// The queue is flushed first; if it does not drain, `frame` goes to the
    /// tail without touching the channel.
    ///
    /// # Errors
    ///
    /// Same as [`PendingWrites::try_flush`].
    pub fn send(&mut self, channel: &mut dyn Channel, frame: Vec<u8>) -> io::Result<FlushStatus> {
        if self.try_flush(channel)? == FlushStatus::Pending {
            self.enqueue(frame);
            return Ok(FlushStatus::Pending);
        }
        loop {
            match channel.send(&frame) {
                Ok(n) if n >= frame.len() => return Ok(FlushStatus::Drained),
                Ok(0) => return Err(write_zero()),
                Ok(n) => {
                    self.enqueue_from(frame, n);
                    return Ok(FlushStatus::Pending);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.enqueue(frame);
                    return Ok(FlushStatus::Pending);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// A non-empty write that made no progress.  Retrying would spin.
fn write_zero() -> io::Error {
    io::Error::new(io::ErrorKind::WriteZero, "channel accepted no bytes")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
