//! Event sinks.
//!
//! [`LoggingEventSink`] is what the demo binary uses: it logs each input
//! event and raises a flag when the session ends.  [`mock::RecordingEventSink`]
//! records events for assertions.

pub mod mock;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rdisplay_core::protocol::messages::{
    ActiveMessage, ButtonState, KeyEventMessage, MouseButtonMessage, MouseMoveMessage,
};
use tracing::{debug, info, trace};

use crate::application::events::EventSink;

/// Logs input events through `tracing`.
#[derive(Debug, Default)]
pub struct LoggingEventSink {
    quit: Arc<AtomicBool>,
}

impl LoggingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag set once the session has ended.
    pub fn quit_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.quit)
    }
}

impl EventSink for LoggingEventSink {
    fn key(&self, event: &KeyEventMessage) {
        debug!(
            sym = event.keysym.sym,
            scancode = event.keysym.scancode,
            pressed = event.state == ButtonState::Pressed,
            "key"
        );
    }

    fn mouse_button(&self, event: &MouseButtonMessage) {
        debug!(
            button = event.button,
            pressed = event.state == ButtonState::Pressed,
            x = event.x,
            y = event.y,
            "mouse button"
        );
    }

    fn mouse_motion(&self, event: &MouseMoveMessage) {
        trace!(x = event.x, y = event.y, buttons = event.buttons, "mouse motion");
    }

    fn resized(&self, width: i32, height: i32) {
        info!(width, height, "window resized");
    }

    fn active(&self, event: &ActiveMessage) {
        debug!(gain = event.gain, state = event.state, "focus changed");
    }

    fn quit(&self) {
        info!("display session ended");
        self.quit.store(true, Ordering::SeqCst);
    }
}
