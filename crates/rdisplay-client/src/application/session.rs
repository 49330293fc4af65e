//! One client-to-display connection and its negotiated framebuffer.
//!
//! # How the session moves data (for beginners)
//!
//! The socket is non-blocking, so neither direction may stall the
//! application:
//!
//! - **Outbound**: a frame is written immediately when possible.  If the
//!   socket is full it goes to the pending-write queue, which is flushed
//!   before anything new is written so frames never overtake each other.
//!
//! - **Inbound**: [`Session::pump`] is called from the application's main
//!   loop.  It flushes output, dispatches events buffered by earlier waits,
//!   then reads until the socket is empty.
//!
//! - **Request/reply**: setting a video mode, flipping and adding a cursor
//!   need an answer before they can return.  The blocking wait reads until a
//!   frame whose tag is in the awaited mask arrives, parking every other
//!   frame in the pending-read queue so the next pump sees it.  Only here
//!   does the session sleep (in `poll`, without a timeout).
//!
//! Any I/O or protocol failure closes the session: the socket is dropped,
//! the framebuffer is unmapped, the sink is told to quit, and every later
//! call fails with [`SessionError::Disconnected`] without touching the
//! socket.

use std::io;
use std::path::Path;
use std::sync::Arc;

use rdisplay_core::protocol::codec::{decode_frame, encode_message, peek_tag, Decoded};
use rdisplay_core::protocol::messages::{
    AddCursorMessage, CursorOp, DisplayMessage, DrawMessage, ManageCursorMessage, MessageMask,
    MessageType, SetVideoModeMessage, WarpMouseMessage, MAX_FRAME_SIZE,
};
use rdisplay_core::{FramebufferGeometry, GeometryError, ProtocolError, Rect};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::application::channel::{receive, Channel, Connector, Interest, Received};
use crate::application::events::{self, Dispatch, EventSink};
use crate::application::framebuffer::{MappedFramebuffer, SharedMemory, SurfaceHandle};
use crate::application::read_queue::PendingReads;
use crate::application::write_queue::{FlushStatus, PendingWrites};

/// Errors returned by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No address configured, address unusable, or the server refused.
    #[error("connection failed: {0}")]
    Connection(String),

    /// A frame could not be encoded or an inbound frame was malformed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The server declined the requested mode.  The previous mode, if any,
    /// is still in place.
    #[error("display server rejected {width}x{height} video mode")]
    ModeRejected { width: i32, height: i32 },

    /// The mode reply described an unusable framebuffer.
    #[error("invalid framebuffer geometry: {0}")]
    Geometry(#[from] GeometryError),

    /// Opening or mapping the shared framebuffer failed.
    #[error("{context}: {source}")]
    Resource {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Send or receive failed.  The session has been closed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The session is closed, or the server closed the channel.
    #[error("session is disconnected")]
    Disconnected,

    /// The server sent Quit.  The session has been closed.
    #[error("display server requested quit")]
    PeerQuit,

    #[error("no video mode has been set")]
    NoVideoMode,

    #[error("surface does not belong to the current video mode")]
    InvalidSurface,

    #[error("display server rejected the cursor")]
    CursorRejected,

    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitState {
    Idle,
    Waiting(MessageMask),
}

/// A cursor registered with the display server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CursorHandle(i32);

impl CursorHandle {
    /// Server-side cursor index.
    pub fn index(self) -> i32 {
        self.0
    }
}

/// A display session.
pub struct Session {
    channel: Option<Box<dyn Channel>>,
    state: SessionState,
    shm: Arc<dyn SharedMemory>,
    sink: Arc<dyn EventSink>,
    writes: PendingWrites,
    reads: PendingReads,
    scratch: Vec<u8>,
    wait: WaitState,
    framebuffer: Option<MappedFramebuffer>,
    /// Last caption set, replayed after every mode change.
    caption: Option<String>,
    generation: u64,
    /// Set once a connected session has been closed.
    closed: bool,
}

impl Session {
    /// Creates a disconnected session.
    pub fn new(shm: Arc<dyn SharedMemory>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            channel: None,
            state: SessionState::Disconnected,
            shm,
            sink,
            writes: PendingWrites::new(),
            reads: PendingReads::new(),
            scratch: vec![0; MAX_FRAME_SIZE],
            wait: WaitState::Idle,
            framebuffer: None,
            caption: None,
            generation: 0,
            closed: false,
        }
    }

    /// Wraps an already connected channel.
    pub fn with_channel(
        channel: Box<dyn Channel>,
        shm: Arc<dyn SharedMemory>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let mut session = Self::new(shm, sink);
        session.channel = Some(channel);
        session.state = SessionState::Connected;
        session
    }

    /// Connects to the display server at `address`.
    ///
    /// # Errors
    ///
    /// [`SessionError::Connection`] when `address` is unset or empty, cannot
    /// be encoded, or the connect call fails.  Connecting an already
    /// connected session is an [`SessionError::InvalidArgument`].
    pub fn connect(
        &mut self,
        address: Option<&Path>,
        connector: &dyn Connector,
    ) -> Result<(), SessionError> {
        if self.channel.is_some() {
            return Err(SessionError::InvalidArgument(
                "session is already connected".to_string(),
            ));
        }
        let address = address
            .filter(|a| !a.as_os_str().is_empty())
            .ok_or_else(|| SessionError::Connection("no server address configured".to_string()))?;

        self.state = SessionState::Connecting;
        match connector.connect(address) {
            Ok(channel) => {
                self.channel = Some(channel);
                self.state = SessionState::Connected;
                self.closed = false;
                info!(address = %address.display(), "connected to display server");
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Disconnected;
                Err(SessionError::Connection(format!(
                    "{}: {e}",
                    address.display()
                )))
            }
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    /// Geometry of the current video mode.
    pub fn geometry(&self) -> Option<&FramebufferGeometry> {
        self.framebuffer.as_ref().map(MappedFramebuffer::geometry)
    }

    /// The view the application should draw into next.
    pub fn current_surface(&self) -> Option<SurfaceHandle> {
        self.framebuffer.as_ref().map(MappedFramebuffer::current)
    }

    /// Pixels of `surface`, `pitch * height` bytes.
    ///
    /// # Errors
    ///
    /// [`SessionError::NoVideoMode`] or [`SessionError::InvalidSurface`].
    pub fn surface_pixels(&mut self, surface: SurfaceHandle) -> Result<&mut [u8], SessionError> {
        self.check_surface(surface)?;
        let fb = self.framebuffer.as_mut().ok_or(SessionError::NoVideoMode)?;
        fb.view_mut(surface).ok_or(SessionError::InvalidSurface)
    }

    /// Checks that `surface` is a view of the current video mode.
    ///
    /// # Errors
    ///
    /// [`SessionError::NoVideoMode`] or [`SessionError::InvalidSurface`].
    pub fn check_surface(&self, surface: SurfaceHandle) -> Result<(), SessionError> {
        let fb = self.framebuffer.as_ref().ok_or(SessionError::NoVideoMode)?;
        if fb.owns(surface) {
            Ok(())
        } else {
            Err(SessionError::InvalidSurface)
        }
    }

    /// The whole mapping (both views when double-buffered).
    pub fn framebuffer_bytes(&self) -> Option<&[u8]> {
        self.framebuffer.as_ref().map(MappedFramebuffer::bytes)
    }

    /// Messages parked by blocking waits, awaiting the next pump.
    pub fn buffered_events(&self) -> usize {
        self.reads.len()
    }

    /// Frames waiting for the socket to accept them.
    pub fn buffered_output(&self) -> usize {
        self.writes.len()
    }

    // ── Async pump ────────────────────────────────────────────────────────────

    /// Flushes output, dispatches buffered events, then reads and dispatches
    /// everything available without blocking.
    ///
    /// # Errors
    ///
    /// [`SessionError::Disconnected`] if the session is closed or the server
    /// hung up, [`SessionError::PeerQuit`] after a Quit message, and I/O or
    /// protocol errors.  Every error except on an already closed session
    /// closes it.
    pub fn pump(&mut self) -> Result<(), SessionError> {
        if self.channel.is_none() {
            return Err(SessionError::Disconnected);
        }
        self.pump_inner().map_err(|e| self.fail(e))
    }

    fn pump_inner(&mut self) -> Result<(), SessionError> {
        let channel = self.channel.as_deref_mut().ok_or(SessionError::Disconnected)?;
        let sink = self.sink.as_ref();

        self.writes.try_flush(channel)?;

        if !self.reads.is_empty() {
            debug!(count = self.reads.len(), "processing buffered input");
        }
        self.reads.drain_into(|frame| dispatch_frame(sink, frame))?;

        loop {
            match receive(channel, &mut self.scratch)? {
                Received::Frame(len) => dispatch_frame(sink, &self.scratch[..len])?,
                Received::Oversized(size) => return Err(oversized(size)),
                Received::WouldBlock => return Ok(()),
                Received::Closed => return Err(SessionError::Disconnected),
            }
        }
    }

    // ── Blocking wait ─────────────────────────────────────────────────────────

    /// Blocks until a frame whose tag is in `wanted` arrives, dispatches it
    /// and returns it.  Frames in `drop` are discarded; all others are
    /// buffered for the next pump in arrival order.
    fn block_for(
        &mut self,
        wanted: MessageMask,
        drop: MessageMask,
    ) -> Result<DisplayMessage, SessionError> {
        if let WaitState::Waiting(active) = self.wait {
            return Err(SessionError::InvalidArgument(format!(
                "already waiting for {active:?}"
            )));
        }
        debug!(?wanted, "blocking for reply");
        self.wait = WaitState::Waiting(wanted);
        let result = self.wait_loop(wanted, drop);
        self.wait = WaitState::Idle;
        result.map_err(|e| self.fail(e))
    }

    fn wait_loop(
        &mut self,
        wanted: MessageMask,
        drop: MessageMask,
    ) -> Result<DisplayMessage, SessionError> {
        let channel = self.channel.as_deref_mut().ok_or(SessionError::Disconnected)?;
        loop {
            let output = self.writes.try_flush(channel)?;

            let len = match receive(channel, &mut self.scratch)? {
                Received::Frame(len) => len,
                Received::Oversized(size) => return Err(oversized(size)),
                Received::Closed => return Err(SessionError::Disconnected),
                Received::WouldBlock => {
                    let interest = match output {
                        FlushStatus::Drained => Interest::Readable,
                        FlushStatus::Pending => Interest::ReadableOrWritable,
                    };
                    channel.wait_ready(interest)?;
                    continue;
                }
            };

            let frame = &self.scratch[..len];
            let tag = peek_tag(frame)?;
            if wanted.matches_tag(tag) {
                match decode_frame(frame)? {
                    Decoded::Message(msg) => {
                        if events::dispatch(self.sink.as_ref(), &msg) == Dispatch::Quit {
                            return Err(SessionError::PeerQuit);
                        }
                        return Ok(msg);
                    }
                    Decoded::Unhandled { tag } => {
                        warn!(tag, "awaited tag is not a known message");
                        continue;
                    }
                }
            }
            if drop.matches_tag(tag) {
                debug!(tag, "dropping message during wait");
                continue;
            }
            debug!(tag, len, "buffering message received during wait");
            self.reads.push(frame.to_vec());
        }
    }

    // ── Requests ──────────────────────────────────────────────────────────────

    /// Negotiates a video mode and maps its framebuffer.
    ///
    /// Nothing about the previous mode changes until the new one is fully
    /// mapped; any failure leaves it in place.  On success the remembered
    /// caption is sent again.
    ///
    /// # Errors
    ///
    /// - [`SessionError::ModeRejected`] if the server declines.
    /// - [`SessionError::Geometry`] or [`SessionError::Resource`] if the reply
    ///   cannot be mapped.  The session stays open.
    /// - I/O and protocol errors, which close the session.
    pub fn set_video_mode(
        &mut self,
        width: i32,
        height: i32,
        double_buffered: bool,
        resizable: bool,
    ) -> Result<SurfaceHandle, SessionError> {
        self.ensure_connected()?;
        if width <= 0 || height <= 0 {
            return Err(SessionError::InvalidArgument(format!(
                "video mode {width}x{height}"
            )));
        }

        debug!(width, height, double_buffered, resizable, "requesting video mode");
        self.send(&DisplayMessage::SetVideoMode(SetVideoModeMessage {
            width,
            height,
            double_buffered,
            resizable,
        }))?;

        let reply = match self.block_for(MessageType::VideoModeSet.into(), MessageType::Flipped.into())? {
            DisplayMessage::VideoModeSet(reply) => reply,
            other => return Err(self.unexpected_reply(&other)),
        };
        if !reply.success {
            warn!(width, height, "display server rejected video mode");
            return Err(SessionError::ModeRejected { width, height });
        }

        let geometry = FramebufferGeometry::from_reply(&reply)?;
        debug!(name = %reply.shm_name, len = geometry.mapping_len(), "mapping shared framebuffer");
        let region = self
            .shm
            .map(&reply.shm_name, geometry.mapping_len())
            .map_err(|source| SessionError::Resource {
                context: format!("mapping shared memory {:?}", reply.shm_name),
                source,
            })?;
        let framebuffer = MappedFramebuffer::new(geometry, region, self.generation + 1).map_err(
            |source| SessionError::Resource {
                context: "building surface views".to_string(),
                source,
            },
        )?;

        self.generation += 1;
        let surface = framebuffer.current();
        self.framebuffer = Some(framebuffer);
        info!(
            width = geometry.width,
            height = geometry.height,
            pitch = geometry.pitch,
            depth = geometry.format.depth,
            double_buffered = geometry.double_buffered,
            "video mode set"
        );

        if let Some(caption) = self.caption.clone() {
            self.send(&DisplayMessage::SetCaption(caption))?;
        }
        Ok(surface)
    }

    /// Shows `surface`.  When double-buffered, waits for the server to
    /// confirm the flip and returns the other view for the next frame;
    /// otherwise returns `surface` as soon as the Draw is sent.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidSurface`] for a handle from another mode, plus
    /// the I/O errors that close the session.
    pub fn flip(&mut self, surface: SurfaceHandle) -> Result<SurfaceHandle, SessionError> {
        self.ensure_connected()?;
        self.check_surface(surface)?;
        let double_buffered = self
            .framebuffer
            .as_ref()
            .is_some_and(|fb| fb.geometry().double_buffered);

        self.send(&DisplayMessage::Draw(DrawMessage {
            flip: double_buffered,
        }))?;
        if !double_buffered {
            return Ok(surface);
        }

        match self.block_for(MessageType::Flipped.into(), MessageMask::NONE)? {
            DisplayMessage::Flipped => {}
            other => return Err(self.unexpected_reply(&other)),
        }
        let fb = self.framebuffer.as_mut().ok_or(SessionError::NoVideoMode)?;
        let next = fb.swap_after_flip(surface);
        debug!(slot = next.slot(), "flipped");
        Ok(next)
    }

    /// Shows the front view without flipping.  When double-buffered, the
    /// dirty rectangles are first copied into the back view so both stay
    /// consistent.  An empty slice does nothing.
    ///
    /// # Errors
    ///
    /// [`SessionError::NoVideoMode`], and the I/O errors that close the
    /// session.
    pub fn present(&mut self, rects: &[Rect]) -> Result<(), SessionError> {
        self.ensure_connected()?;
        if rects.is_empty() {
            return Ok(());
        }
        let fb = self.framebuffer.as_mut().ok_or(SessionError::NoVideoMode)?;
        if fb.geometry().double_buffered {
            fb.copy_front_to_back(rects);
        }
        self.send(&DisplayMessage::Draw(DrawMessage { flip: false }))
    }

    /// Remembers `caption` and sends it if a video mode is active.  Before
    /// the first connect the caption is only remembered.
    ///
    /// # Errors
    ///
    /// [`SessionError::Disconnected`] once the session has been closed, and
    /// [`SessionError::Protocol`] if the caption does not fit in one frame or
    /// contains NUL; the session stays open and the old caption is kept.
    pub fn set_caption(&mut self, caption: &str) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Disconnected);
        }
        let frame = encode_message(&DisplayMessage::SetCaption(caption.to_string()))?;
        self.caption = Some(caption.to_string());
        if self.framebuffer.is_none() || self.channel.is_none() {
            return Ok(());
        }
        self.send_frame(frame)
    }

    /// The caption most recently set.
    pub fn caption(&self) -> Option<&str> {
        self.caption.as_deref()
    }

    /// Moves the pointer to (`x`, `y`) in surface coordinates.
    ///
    /// # Errors
    ///
    /// [`SessionError::Disconnected`] and the I/O errors that close the
    /// session.
    pub fn warp_mouse(&mut self, x: u16, y: u16) -> Result<(), SessionError> {
        self.ensure_connected()?;
        self.send(&DisplayMessage::WarpMouse(WarpMouseMessage {
            x: i32::from(x),
            y: i32::from(y),
        }))
    }

    /// Registers a monochrome cursor.  `data` and `mask` each hold
    /// `width / 8 * height` bytes.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidArgument`] for wrongly sized planes,
    /// [`SessionError::Protocol`] if the bitmap does not fit in one frame,
    /// [`SessionError::CursorRejected`] if the server refuses it, and the
    /// errors that close the session.
    pub fn create_cursor(
        &mut self,
        data: &[u8],
        mask: &[u8],
        width: i32,
        height: i32,
        hot_x: i32,
        hot_y: i32,
    ) -> Result<CursorHandle, SessionError> {
        self.ensure_connected()?;
        let plane = AddCursorMessage::plane_len(width, height).ok_or_else(|| {
            SessionError::InvalidArgument(format!("cursor size {width}x{height}"))
        })?;
        if data.len() != plane || mask.len() != plane {
            return Err(SessionError::InvalidArgument(format!(
                "cursor planes must be {plane} bytes, got data={} mask={}",
                data.len(),
                mask.len()
            )));
        }

        self.send(&DisplayMessage::AddCursor(AddCursorMessage {
            width,
            height,
            hot_x,
            hot_y,
            data: data.to_vec(),
            mask: mask.to_vec(),
        }))?;

        let added = match self.block_for(MessageType::CursorAdded.into(), MessageType::Flipped.into())? {
            DisplayMessage::CursorAdded(added) => added,
            other => return Err(self.unexpected_reply(&other)),
        };
        if added.index == -1 {
            warn!(width, height, "display server rejected cursor");
            return Err(SessionError::CursorRejected);
        }
        debug!(index = added.index, "cursor added");
        Ok(CursorHandle(added.index))
    }

    /// Shows `cursor`, or hides the pointer when `None`.
    ///
    /// # Errors
    ///
    /// [`SessionError::NoVideoMode`], and the errors that close the session.
    pub fn show_cursor(&mut self, cursor: Option<CursorHandle>) -> Result<(), SessionError> {
        self.ensure_connected()?;
        if self.framebuffer.is_none() {
            return Err(SessionError::NoVideoMode);
        }
        match cursor {
            Some(CursorHandle(index)) => {
                self.manage_cursor(CursorOp::Set, index)?;
                self.manage_cursor(CursorOp::Show, index)
            }
            None => self.manage_cursor(CursorOp::Hide, -1),
        }
    }

    /// Releases a cursor on the server.
    ///
    /// # Errors
    ///
    /// [`SessionError::Disconnected`], and the errors that close the session.
    pub fn free_cursor(&mut self, cursor: CursorHandle) -> Result<(), SessionError> {
        self.ensure_connected()?;
        self.manage_cursor(CursorOp::Delete, cursor.0)
    }

    fn manage_cursor(&mut self, op: CursorOp, index: i32) -> Result<(), SessionError> {
        self.send(&DisplayMessage::ManageCursor(ManageCursorMessage { op, index }))
    }

    /// Unmaps the framebuffer, drops buffered frames and closes the channel.
    /// Calling it again does nothing.  The sink is not notified.
    pub fn teardown(&mut self) {
        if self.channel.is_none() && self.framebuffer.is_none() {
            return;
        }
        info!("tearing down display session");
        self.release();
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn ensure_connected(&self) -> Result<(), SessionError> {
        if self.channel.is_some() {
            Ok(())
        } else {
            Err(SessionError::Disconnected)
        }
    }

    fn send(&mut self, msg: &DisplayMessage) -> Result<(), SessionError> {
        let frame = encode_message(msg)?;
        self.send_frame(frame)
    }

    fn send_frame(&mut self, frame: Vec<u8>) -> Result<(), SessionError> {
        let channel = self.channel.as_deref_mut().ok_or(SessionError::Disconnected)?;
        match self.writes.send(channel, frame) {
            Ok(FlushStatus::Drained) => Ok(()),
            Ok(FlushStatus::Pending) => {
                debug!(queued = self.writes.len(), "output buffered");
                Ok(())
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    fn unexpected_reply(&mut self, msg: &DisplayMessage) -> SessionError {
        let err = SessionError::Protocol(ProtocolError::MalformedPayload(format!(
            "unexpected reply {:?}",
            msg.message_type()
        )));
        self.fail(err)
    }

    /// Closes a live session after `err` and tells the sink, unless the
    /// server's own Quit already did.  A closed session is left alone.
    fn fail(&mut self, err: SessionError) -> SessionError {
        if self.channel.is_none() {
            return err;
        }
        match &err {
            SessionError::PeerQuit => info!("closing session at server's request"),
            other => error!(error = %other, "closing display session"),
        }
        self.release();
        if !matches!(err, SessionError::PeerQuit) {
            self.sink.quit();
        }
        err
    }

    fn release(&mut self) {
        self.closed = true;
        self.framebuffer = None;
        self.channel = None;
        self.state = SessionState::Disconnected;
        self.writes.clear();
        self.reads.clear();
        self.wait = WaitState::Idle;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn oversized(size: usize) -> SessionError {
    SessionError::Protocol(ProtocolError::FrameTooLarge {
        size,
        max: MAX_FRAME_SIZE,
    })
}

/// Decodes one inbound frame and hands it to the sink.
fn dispatch_frame(sink: &dyn EventSink, frame: &[u8]) -> Result<(), SessionError> {
    match decode_frame(frame)? {
        Decoded::Message(msg) => match events::dispatch(sink, &msg) {
            Dispatch::Continue => Ok(()),
            Dispatch::Quit => Err(SessionError::PeerQuit),
        },
        Decoded::Unhandled { tag } => {
            warn!(tag, len = frame.len(), "unhandled message");
            Ok(())
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
