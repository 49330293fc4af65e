//! Recording event sink for tests.
//!
//! Each delivered event is pushed into a `Mutex<Vec<...>>` so assertions can
//! check exactly what reached the application and in what order.

use std::sync::{Mutex, PoisonError};

use rdisplay_core::protocol::messages::{
    ActiveMessage, KeyEventMessage, MouseButtonMessage, MouseMoveMessage,
};

use crate::application::events::EventSink;

/// One event as seen by the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedEvent {
    Key(KeyEventMessage),
    MouseButton(MouseButtonMessage),
    MouseMotion(MouseMoveMessage),
    Resized(i32, i32),
    Active(ActiveMessage),
    Quit,
}

#[derive(Debug, Default)]
pub struct RecordingEventSink {
    pub events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything delivered so far.
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn quit_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| **e == RecordedEvent::Quit)
            .count()
    }

    fn record(&self, event: RecordedEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

impl EventSink for RecordingEventSink {
    fn key(&self, event: &KeyEventMessage) {
        self.record(RecordedEvent::Key(*event));
    }

    fn mouse_button(&self, event: &MouseButtonMessage) {
        self.record(RecordedEvent::MouseButton(*event));
    }

    fn mouse_motion(&self, event: &MouseMoveMessage) {
        self.record(RecordedEvent::MouseMotion(*event));
    }

    fn resized(&self, width: i32, height: i32) {
        self.record(RecordedEvent::Resized(width, height));
    }

    fn active(&self, event: &ActiveMessage) {
        self.record(RecordedEvent::Active(*event));
    }

    fn quit(&self) {
        self.record(RecordedEvent::Quit);
    }
}
