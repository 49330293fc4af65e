//! The capability trait a graphics layer drives the display through.
//!
//! A generic graphics layer needs a small, fixed set of operations from a
//! video backend: initialise, pick a mode, hand out surfaces, show them, pump
//! input, set a caption, manage cursors and shut down.  [`DisplayBackend`]
//! names that set; [`Session`] is the implementation that speaks the display
//! protocol.  Tests and other backends can implement the trait as well.

use std::path::Path;

use rdisplay_core::Rect;

use crate::application::channel::Connector;
use crate::application::framebuffer::SurfaceHandle;
use crate::application::session::{CursorHandle, Session, SessionError};

/// Requested video mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeRequest {
    pub width: i32,
    pub height: i32,
    pub double_buffered: bool,
    pub resizable: bool,
}

/// A monochrome cursor bitmap.  `data` and `mask` each hold
/// `width / 8 * height` bytes.
#[derive(Debug, Clone, Copy)]
pub struct CursorImage<'a> {
    pub data: &'a [u8],
    pub mask: &'a [u8],
    pub width: i32,
    pub height: i32,
    pub hot_x: i32,
    pub hot_y: i32,
}

/// Video backend operations.
pub trait DisplayBackend {
    /// Connects to the display server at `address`.
    fn init(&mut self, address: Option<&Path>, connector: &dyn Connector)
        -> Result<(), SessionError>;

    /// Sets a video mode and returns the surface to draw into first.
    fn negotiate_mode(&mut self, request: ModeRequest) -> Result<SurfaceHandle, SessionError>;

    /// Allocates an extra hardware surface.
    fn acquire_surface(&mut self) -> Result<SurfaceHandle, SessionError>;

    fn release_surface(&mut self, surface: SurfaceHandle);

    /// Prepares `surface` for direct pixel access.
    fn lock(&mut self, surface: SurfaceHandle) -> Result<(), SessionError>;

    fn unlock(&mut self, surface: SurfaceHandle);

    /// Shows `surface` and returns the one to draw into next.
    fn flip(&mut self, surface: SurfaceHandle) -> Result<SurfaceHandle, SessionError>;

    fn present(&mut self, rects: &[Rect]) -> Result<(), SessionError>;

    /// Dispatches pending input without blocking.
    fn pump(&mut self) -> Result<(), SessionError>;

    fn set_caption(&mut self, caption: &str) -> Result<(), SessionError>;

    fn create_cursor(&mut self, image: CursorImage<'_>) -> Result<CursorHandle, SessionError>;

    /// Shows `cursor`, or hides the pointer when `None`.
    fn show_cursor(&mut self, cursor: Option<CursorHandle>) -> Result<(), SessionError>;

    fn free_cursor(&mut self, cursor: CursorHandle) -> Result<(), SessionError>;

    fn warp_mouse(&mut self, x: u16, y: u16) -> Result<(), SessionError>;

    /// Releases everything.  Safe to call more than once.
    fn teardown(&mut self);
}

impl DisplayBackend for Session {
    fn init(
        &mut self,
        address: Option<&Path>,
        connector: &dyn Connector,
    ) -> Result<(), SessionError> {
        self.connect(address, connector)
    }

    fn negotiate_mode(&mut self, request: ModeRequest) -> Result<SurfaceHandle, SessionError> {
        self.set_video_mode(
            request.width,
            request.height,
            request.double_buffered,
            request.resizable,
        )
    }

    fn acquire_surface(&mut self) -> Result<SurfaceHandle, SessionError> {
        // The screen is the only surface the server provides.
        Err(SessionError::Unsupported("hardware surfaces"))
    }

    fn release_surface(&mut self, _surface: SurfaceHandle) {}

    fn lock(&mut self, surface: SurfaceHandle) -> Result<(), SessionError> {
        self.check_surface(surface)
    }

    fn unlock(&mut self, _surface: SurfaceHandle) {}

    fn flip(&mut self, surface: SurfaceHandle) -> Result<SurfaceHandle, SessionError> {
        Session::flip(self, surface)
    }

    fn present(&mut self, rects: &[Rect]) -> Result<(), SessionError> {
        Session::present(self, rects)
    }

    fn pump(&mut self) -> Result<(), SessionError> {
        Session::pump(self)
    }

    fn set_caption(&mut self, caption: &str) -> Result<(), SessionError> {
        Session::set_caption(self, caption)
    }

    fn create_cursor(&mut self, image: CursorImage<'_>) -> Result<CursorHandle, SessionError> {
        Session::create_cursor(
            self,
            image.data,
            image.mask,
            image.width,
            image.height,
            image.hot_x,
            image.hot_y,
        )
    }

    fn show_cursor(&mut self, cursor: Option<CursorHandle>) -> Result<(), SessionError> {
        Session::show_cursor(self, cursor)
    }

    fn free_cursor(&mut self, cursor: CursorHandle) -> Result<(), SessionError> {
        Session::free_cursor(self, cursor)
    }

    fn warp_mouse(&mut self, x: u16, y: u16) -> Result<(), SessionError> {
        Session::warp_mouse(self, x, y)
    }

    fn teardown(&mut self) {
        Session::teardown(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use rdisplay_core::protocol::messages::{
        CursorAddedMessage, CursorOp, DisplayMessage, ManageCursorMessage, SetVideoModeMessage,
    };

    use crate::infrastructure::channel::mock::{mode_reply, MockChannel, MockConnector};
    use crate::infrastructure::event_sink::mock::RecordingEventSink;
    use crate::infrastructure::shm::mock::HeapSharedMemory;

    fn backend() -> (Box<dyn DisplayBackend>, MockChannel, Arc<HeapSharedMemory>) {
        let channel = MockChannel::new();
        let shm = Arc::new(HeapSharedMemory::new());
        let mut session: Box<dyn DisplayBackend> = Box::new(Session::new(
            shm.clone(),
            Arc::new(RecordingEventSink::new()),
        ));
        session
            .init(
                Some(Path::new("/tmp/display.sock")),
                &MockConnector::new(channel.clone()),
            )
            .unwrap();
        (session, channel, shm)
    }

    #[test]
    fn test_negotiate_mode_sends_request_fields() {
        // Arrange
        let (mut backend, channel, _shm) = backend();
        channel.push_message(&mode_reply(32, 16, false, "/fb")).unwrap();
        let request = ModeRequest {
            width: 32,
            height: 16,
            double_buffered: false,
            resizable: true,
        };

        // Act
        let surface = backend.negotiate_mode(request).unwrap();

        // Assert
        assert_eq!(surface.slot(), 0);
        assert_eq!(
            channel.sent_messages(),
            vec![DisplayMessage::SetVideoMode(SetVideoModeMessage {
                width: 32,
                height: 16,
                double_buffered: false,
                resizable: true,
            })]
        );
    }

    #[test]
    fn test_acquire_surface_is_unsupported() {
        let (mut backend, channel, _shm) = backend();

        let result = backend.acquire_surface();

        assert!(matches!(result, Err(SessionError::Unsupported(_))));
        assert!(channel.written_bytes().is_empty());
    }

    #[test]
    fn test_lock_validates_surface_only() {
        // Arrange
        let (mut backend, channel, _shm) = backend();
        channel.push_message(&mode_reply(8, 8, false, "/fb")).unwrap();
        let surface = backend
            .negotiate_mode(ModeRequest {
                width: 8,
                height: 8,
                double_buffered: false,
                resizable: false,
            })
            .unwrap();
        let sent_before = channel.sent_frames().len();

        // Act
        let locked = backend.lock(surface);
        backend.unlock(surface);
        backend.release_surface(surface);

        // Assert
        assert!(locked.is_ok());
        assert_eq!(channel.sent_frames().len(), sent_before);
    }

    #[test]
    fn test_lock_without_mode_fails() {
        let (mut backend, _channel, _shm) = backend();
        let stranger = {
            let other = MockChannel::new();
            other.push_message(&mode_reply(4, 4, false, "/x")).unwrap();
            let mut s = Session::with_channel(
                Box::new(other),
                Arc::new(HeapSharedMemory::new()),
                Arc::new(RecordingEventSink::new()),
            );
            s.set_video_mode(4, 4, false, false).unwrap()
        };

        assert!(matches!(
            backend.lock(stranger),
            Err(SessionError::NoVideoMode)
        ));
    }

    #[test]
    fn test_cursor_ops_go_through_trait() {
        // Arrange
        let (mut backend, channel, _shm) = backend();
        channel.push_message(&mode_reply(8, 8, false, "/fb")).unwrap();
        channel
            .push_message(&DisplayMessage::CursorAdded(CursorAddedMessage { index: 3 }))
            .unwrap();
        backend
            .negotiate_mode(ModeRequest {
                width: 8,
                height: 8,
                double_buffered: false,
                resizable: false,
            })
            .unwrap();
        let plane = [0u8; 2];

        // Act
        let cursor = backend
            .create_cursor(CursorImage {
                data: &plane,
                mask: &plane,
                width: 8,
                height: 2,
                hot_x: 0,
                hot_y: 0,
            })
            .unwrap();
        backend.show_cursor(Some(cursor)).unwrap();
        backend.free_cursor(cursor).unwrap();

        // Assert
        let manage: Vec<_> = channel
            .sent_messages()
            .into_iter()
            .filter_map(|m| match m {
                DisplayMessage::ManageCursor(m) => Some(m),
                _ => None,
            })
            .collect();
        assert_eq!(
            manage,
            vec![
                ManageCursorMessage { op: CursorOp::Set, index: 3 },
                ManageCursorMessage { op: CursorOp::Show, index: 3 },
                ManageCursorMessage { op: CursorOp::Delete, index: 3 },
            ]
        );
    }

    #[test]
    fn test_teardown_through_trait_unmaps() {
        let (mut backend, channel, shm) = backend();
        channel.push_message(&mode_reply(8, 8, true, "/fb")).unwrap();
        backend
            .negotiate_mode(ModeRequest {
                width: 8,
                height: 8,
                double_buffered: true,
                resizable: false,
            })
            .unwrap();
        assert_eq!(shm.live_mappings(), 1);

        backend.teardown();
        backend.teardown();

        assert_eq!(shm.live_mappings(), 0);
        assert!(matches!(backend.pump(), Err(SessionError::Disconnected)));
    }
}
