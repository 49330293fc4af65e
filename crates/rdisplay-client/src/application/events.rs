//! Input event delivery.
//!
//! Decoded events from the display server are handed to an [`EventSink`].
//! Replies (mode set, flip, cursor added) are consumed by the blocking wait
//! and carry nothing for the sink.

use rdisplay_core::protocol::messages::{
    ActiveMessage, DisplayMessage, KeyEventMessage, MouseButtonMessage, MouseMoveMessage,
};
use tracing::{debug, trace};

/// Receives input events decoded from the display server.
///
/// Implementations must be cheap: they run on the pump thread between reads.
pub trait EventSink: Send + Sync {
    fn key(&self, event: &KeyEventMessage);

    fn mouse_button(&self, event: &MouseButtonMessage);

    fn mouse_motion(&self, event: &MouseMoveMessage);

    /// The server resized the window.  The application should negotiate a
    /// new mode.
    fn resized(&self, width: i32, height: i32);

    fn active(&self, event: &ActiveMessage);

    /// The session is over, either because the server asked the client to
    /// quit or because the connection failed.  Called at most once per
    /// session.
    fn quit(&self);
}

/// What the caller should do after a message has been dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Continue,
    /// A Quit message was delivered; the session must close.
    Quit,
}

/// Routes one decoded message to `sink`.
pub fn dispatch(sink: &dyn EventSink, msg: &DisplayMessage) -> Dispatch {
    match msg {
        DisplayMessage::KeyEvent(e) => sink.key(e),
        DisplayMessage::MouseButtonEvent(e) => sink.mouse_button(e),
        DisplayMessage::MouseMoveEvent(e) => sink.mouse_motion(e),
        DisplayMessage::ResizedEvent(e) => sink.resized(e.width, e.height),
        DisplayMessage::ActiveEvent(e) => sink.active(e),
        DisplayMessage::QuitEvent => {
            debug!("server requested quit");
            sink.quit();
            return Dispatch::Quit;
        }
        // Replies are only meaningful to a blocking wait.
        DisplayMessage::VideoModeSet(_) | DisplayMessage::Flipped | DisplayMessage::CursorAdded(_) => {}
        // Client-to-server requests are never expected inbound.
        other => trace!(message = ?other.message_type(), "ignoring request-type message"),
    }
    Dispatch::Continue
}
