//! Scripted in-memory channel for tests and offline runs.
//!
//! # How scripting works
//!
//! Every `recv` pops the next [`RecvStep`]; an empty script reads as
//! would-block.  Every `send` pops the next [`SendStep`]; an empty script
//! accepts the whole frame.  Accepted bytes are recorded per call so tests
//! can inspect exactly what reached the wire and in what order.
//!
//! `wait_ready` fails when nothing inbound is scripted: a blocking wait with
//! nothing left to read would otherwise sleep forever.
//!
//! Clones share one script, so a test keeps a clone while the session owns
//! the boxed original.
//!
//! ```ignore
//! let channel = MockChannel::new();
//! channel.push_message(&mode_reply(640, 480, true, "/fb"))?;
//! let mut session = Session::with_channel(Box::new(channel.clone()), shm, sink);
//! session.set_video_mode(640, 480, true, false)?;
//! assert_eq!(channel.sent_messages().len(), 1);
//! ```

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rdisplay_core::protocol::codec::{decode_frame, encode_message, Decoded, ProtocolError};
use rdisplay_core::protocol::messages::{DisplayMessage, VideoModeSetMessage};

use crate::application::channel::{Channel, Connector, Interest};

/// One scripted outcome of `recv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecvStep {
    Frame(Vec<u8>),
    WouldBlock,
    Interrupted,
    /// The peer hung up.
    Closed,
    Fail(io::ErrorKind),
}

/// One scripted outcome of `send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStep {
    Accept,
    /// Accept only the first `n` bytes.
    Partial(usize),
    WouldBlock,
    Interrupted,
    Fail(io::ErrorKind),
}

#[derive(Debug, Default)]
struct Script {
    inbound: VecDeque<RecvStep>,
    outbound: VecDeque<SendStep>,
    sent: Vec<Vec<u8>>,
    waits: Vec<Interest>,
    wait_error: Option<io::ErrorKind>,
}

/// A [`Channel`] driven by a script.
#[derive(Debug, Clone, Default)]
pub struct MockChannel {
    script: Arc<Mutex<Script>>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_step(&self, step: RecvStep) {
        self.script().inbound.push_back(step);
    }

    /// Queues raw bytes as one inbound frame.
    pub fn push_raw(&self, frame: Vec<u8>) {
        self.push_step(RecvStep::Frame(frame));
    }

    /// Encodes `msg` and queues it as one inbound frame.
    ///
    /// # Errors
    ///
    /// Returns the encoding error for messages that do not fit a frame.
    pub fn push_message(&self, msg: &DisplayMessage) -> Result<(), ProtocolError> {
        self.push_raw(encode_message(msg)?);
        Ok(())
    }

    pub fn script_send(&self, step: SendStep) {
        self.script().outbound.push_back(step);
    }

    /// Makes every later `wait_ready` fail with `kind`.
    pub fn fail_wait(&self, kind: io::ErrorKind) {
        self.script().wait_error = Some(kind);
    }

    /// Bytes accepted by each `send` call, in order.
    pub fn sent_frames(&self) -> Vec<Vec<u8>> {
        self.script().sent.clone()
    }

    /// All accepted bytes concatenated.
    pub fn written_bytes(&self) -> Vec<u8> {
        self.script().sent.concat()
    }

    /// Sent frames that decode to known messages.
    pub fn sent_messages(&self) -> Vec<DisplayMessage> {
        self.sent_frames()
            .iter()
            .filter_map(|frame| match decode_frame(frame) {
                Ok(Decoded::Message(msg)) => Some(msg),
                _ => None,
            })
            .collect()
    }

    /// Interests passed to `wait_ready`, in order.
    pub fn wait_calls(&self) -> Vec<Interest> {
        self.script().waits.clone()
    }

    /// Inbound steps not consumed yet.
    pub fn pending_inbound(&self) -> usize {
        self.script().inbound.len()
    }
}

impl Channel for MockChannel {
    fn send(&mut self, frame: &[u8]) -> io::Result<usize> {
        let mut script = self.script();
        match script.outbound.pop_front().unwrap_or(SendStep::Accept) {
            SendStep::Accept => {
                script.sent.push(frame.to_vec());
                Ok(frame.len())
            }
            SendStep::Partial(n) => {
                let n = n.min(frame.len());
                script.sent.push(frame[..n].to_vec());
                Ok(n)
            }
            SendStep::WouldBlock => Err(io::ErrorKind::WouldBlock.into()),
            SendStep::Interrupted => Err(io::ErrorKind::Interrupted.into()),
            SendStep::Fail(kind) => Err(kind.into()),
        }
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.script().inbound.pop_front() {
            None | Some(RecvStep::WouldBlock) => Err(io::ErrorKind::WouldBlock.into()),
            Some(RecvStep::Frame(frame)) => {
                let n = frame.len().min(buf.len());
                buf[..n].copy_from_slice(&frame[..n]);
                Ok(frame.len())
            }
            Some(RecvStep::Interrupted) => Err(io::ErrorKind::Interrupted.into()),
            Some(RecvStep::Closed) => Ok(0),
            Some(RecvStep::Fail(kind)) => Err(kind.into()),
        }
    }

    fn wait_ready(&mut self, interest: Interest) -> io::Result<()> {
        let mut script = self.script();
        script.waits.push(interest);
        if let Some(kind) = script.wait_error {
            return Err(kind.into());
        }
        if script.inbound.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "mock channel: waiting with nothing scripted to read",
            ));
        }
        Ok(())
    }
}

/// A [`Connector`] that hands out a [`MockChannel`] or fails.
#[derive(Debug)]
pub struct MockConnector {
    channel: MockChannel,
    fail: Option<io::ErrorKind>,
    addresses: Mutex<Vec<PathBuf>>,
}

impl MockConnector {
    pub fn new(channel: MockChannel) -> Self {
        Self {
            channel,
            fail: None,
            addresses: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(kind: io::ErrorKind) -> Self {
        Self {
            fail: Some(kind),
            ..Self::new(MockChannel::new())
        }
    }

    /// Addresses passed to `connect`.
    pub fn addresses(&self) -> Vec<PathBuf> {
        self.addresses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Connector for MockConnector {
    fn connect(&self, address: &Path) -> io::Result<Box<dyn Channel>> {
        self.addresses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(address.to_path_buf());
        match self.fail {
            Some(kind) => Err(kind.into()),
            None => Ok(Box::new(self.channel.clone())),
        }
    }
}

/// A successful mode-set reply for a 32-bit framebuffer with a tight pitch.
pub fn mode_reply(width: i32, height: i32, double_buffered: bool, shm_name: &str) -> DisplayMessage {
    DisplayMessage::VideoModeSet(VideoModeSetMessage {
        success: true,
        double_buffered,
        width,
        height,
        pitch: width * 4,
        depth: 32,
        red_mask: 0x00FF_0000,
        green_mask: 0x0000_FF00,
        blue_mask: 0x0000_00FF,
        shm_name: shm_name.to_string(),
    })
}

/// A mode-set reply declining the request.
pub fn mode_refused() -> DisplayMessage {
    DisplayMessage::VideoModeSet(VideoModeSetMessage {
        success: false,
        double_buffered: false,
        width: 0,
        height: 0,
        pitch: 0,
        depth: 0,
        red_mask: 0,
        green_mask: 0,
        blue_mask: 0,
        shm_name: String::new(),
    })
}
