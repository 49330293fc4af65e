//! Integration tests for the display session.
//!
//! Drive a [`Session`] through its public API over the scripted channel and
//! heap shared memory, checking the blocking-wait, pump, framebuffer and
//! failure behaviour end to end.

use std::io;
use std::sync::atomic::Ordering;
use std::sync::{Arc, PoisonError};

use mockall::mock;

use rdisplay_client::application::{EventSink, Interest, Session, SessionError};
use rdisplay_client::infrastructure::channel::mock::{
    mode_refused, mode_reply, MockChannel, RecvStep, SendStep,
};
use rdisplay_client::infrastructure::event_sink::mock::{RecordedEvent, RecordingEventSink};
use rdisplay_client::infrastructure::shm::mock::HeapSharedMemory;
use rdisplay_core::protocol::messages::{
    ActiveMessage, ButtonState, CursorAddedMessage, CursorOp, DisplayMessage, DrawMessage,
    KeyEventMessage, KeySym, ManageCursorMessage, MouseButtonMessage, MouseMoveMessage,
    ResizedMessage, SetVideoModeMessage, WarpMouseMessage, MAX_FRAME_SIZE,
};
use rdisplay_core::{ProtocolError, Rect};

mock! {
    pub Sink {}

    impl EventSink for Sink {
        fn key(&self, event: &KeyEventMessage);
        fn mouse_button(&self, event: &MouseButtonMessage);
        fn mouse_motion(&self, event: &MouseMoveMessage);
        fn resized(&self, width: i32, height: i32);
        fn active(&self, event: &ActiveMessage);
        fn quit(&self);
    }
}

// ── Fixtures ──────────────────────────────────────────────────────────────────

struct Harness {
    session: Session,
    channel: MockChannel,
    sink: Arc<RecordingEventSink>,
    shm: Arc<HeapSharedMemory>,
}

fn harness() -> Harness {
    let channel = MockChannel::new();
    let sink = Arc::new(RecordingEventSink::new());
    let shm = Arc::new(HeapSharedMemory::new());
    let session = Session::with_channel(Box::new(channel.clone()), shm.clone(), sink.clone());
    Harness {
        session,
        channel,
        sink,
        shm,
    }
}

fn key_press(sym: u32) -> KeyEventMessage {
    KeyEventMessage {
        event_type: 2,
        which: 0,
        state: ButtonState::Pressed,
        keysym: KeySym {
            scancode: 30,
            sym,
            modifiers: 0,
            unicode: 0,
        },
    }
}

fn mouse_move(x: u16, y: u16) -> MouseMoveMessage {
    MouseMoveMessage {
        event_type: 4,
        which: 0,
        buttons: 0,
        x,
        y,
        x_rel: 1,
        y_rel: -1,
    }
}

fn cursor_added(index: i32) -> DisplayMessage {
    DisplayMessage::CursorAdded(CursorAddedMessage { index })
}

// ── Blocking wait ─────────────────────────────────────────────────────────────

#[test]
fn test_wait_buffers_earlier_message_and_pump_dispatches_it_once() {
    // Arrange
    let mut h = harness();
    h.channel
        .push_message(&DisplayMessage::KeyEvent(key_press(97)))
        .unwrap();
    h.channel.push_message(&mode_reply(8, 8, false, "/fb")).unwrap();

    // Act
    h.session.set_video_mode(8, 8, false, false).unwrap();
    let events_after_wait = h.sink.events();
    let buffered = h.session.buffered_events();
    h.session.pump().unwrap();
    h.session.pump().unwrap();

    // Assert
    assert!(events_after_wait.is_empty());
    assert_eq!(buffered, 1);
    assert_eq!(h.sink.events(), vec![RecordedEvent::Key(key_press(97))]);
    assert_eq!(h.session.buffered_events(), 0);
}

#[test]
fn test_flipped_during_mode_set_is_dropped_not_buffered() {
    let mut h = harness();
    h.channel.push_message(&DisplayMessage::Flipped).unwrap();
    h.channel.push_message(&mode_reply(8, 8, true, "/fb")).unwrap();

    h.session.set_video_mode(8, 8, true, false).unwrap();

    assert_eq!(h.session.buffered_events(), 0);
    assert_eq!(h.channel.pending_inbound(), 0);
}

#[test]
fn test_quit_during_wait_is_buffered_until_next_pump() {
    // Arrange
    let mut h = harness();
    h.channel.push_message(&DisplayMessage::QuitEvent).unwrap();
    h.channel.push_message(&mode_reply(8, 8, false, "/fb")).unwrap();

    // Act
    let mode = h.session.set_video_mode(8, 8, false, false);
    let quit_before_pump = h.sink.quit_count();
    let pumped = h.session.pump();

    // Assert
    assert!(mode.is_ok());
    assert_eq!(quit_before_pump, 0);
    assert!(matches!(pumped, Err(SessionError::PeerQuit)));
    assert_eq!(h.sink.quit_count(), 1);
    assert!(!h.session.is_connected());
    assert_eq!(h.shm.live_mappings(), 0);
}

#[test]
fn test_wait_with_pending_output_polls_for_write_readiness() {
    // Arrange
    let mut h = harness();
    h.channel.script_send(SendStep::WouldBlock);
    h.channel.script_send(SendStep::WouldBlock);
    h.channel.push_step(RecvStep::WouldBlock);
    h.channel.push_message(&mode_reply(8, 8, false, "/fb")).unwrap();

    // Act
    h.session.set_video_mode(8, 8, false, false).unwrap();

    // Assert
    assert_eq!(h.channel.wait_calls(), vec![Interest::ReadableOrWritable]);
    assert_eq!(h.session.buffered_output(), 0);
    assert_eq!(
        h.channel.sent_messages(),
        vec![DisplayMessage::SetVideoMode(SetVideoModeMessage {
            width: 8,
            height: 8,
            double_buffered: false,
            resizable: false,
        })]
    );
}

#[test]
fn test_wait_with_nothing_pending_polls_for_read_only() {
    let mut h = harness();
    h.channel.push_step(RecvStep::WouldBlock);
    h.channel.push_step(RecvStep::Interrupted);
    h.channel.push_message(&mode_reply(8, 8, false, "/fb")).unwrap();

    h.session.set_video_mode(8, 8, false, false).unwrap();

    assert_eq!(h.channel.wait_calls(), vec![Interest::Readable]);
}

#[test]
fn test_read_error_during_wait_closes_session_and_unmaps() {
    // Arrange
    let mut h = harness();
    h.channel.push_message(&mode_reply(8, 8, false, "/fb")).unwrap();
    h.session.set_video_mode(8, 8, false, false).unwrap();
    h.channel.push_step(RecvStep::Fail(io::ErrorKind::ConnectionReset));

    // Act
    let result = h.session.create_cursor(&[0; 8], &[0; 8], 8, 8, 0, 0);

    // Assert
    assert!(matches!(result, Err(SessionError::Io(_))));
    assert!(!h.session.is_connected());
    assert_eq!(h.shm.live_mappings(), 0);
    assert_eq!(h.sink.quit_count(), 1);
}

#[test]
fn test_poll_failure_during_wait_closes_session() {
    // Arrange
    let mut h = harness();
    h.channel.push_message(&mode_reply(8, 8, false, "/fb")).unwrap();
    h.session.set_video_mode(8, 8, false, false).unwrap();
    h.channel.push_step(RecvStep::WouldBlock);
    h.channel.fail_wait(io::ErrorKind::Other);

    // Act
    let result = h.session.create_cursor(&[0; 8], &[0; 8], 8, 8, 0, 0);

    // Assert
    assert!(matches!(result, Err(SessionError::Io(_))));
    assert_eq!(h.channel.wait_calls(), vec![Interest::Readable]);
    assert!(!h.session.is_connected());
    assert_eq!(h.shm.live_mappings(), 0);
    assert_eq!(h.sink.quit_count(), 1);
    assert!(matches!(h.session.pump(), Err(SessionError::Disconnected)));
}

#[test]
fn test_eof_during_wait_is_disconnected() {
    let mut h = harness();
    h.channel.push_step(RecvStep::Closed);

    let result = h.session.set_video_mode(8, 8, false, false);

    assert!(matches!(result, Err(SessionError::Disconnected)));
    assert_eq!(h.sink.quit_count(), 1);
}

// ── Pump ──────────────────────────────────────────────────────────────────────

#[test]
fn test_pump_dispatches_in_wire_order() {
    // Arrange
    let mut h = harness();
    h.channel
        .push_message(&DisplayMessage::MouseMoveEvent(mouse_move(3, 4)))
        .unwrap();
    h.channel
        .push_message(&DisplayMessage::KeyEvent(key_press(13)))
        .unwrap();
    h.channel
        .push_message(&DisplayMessage::ResizedEvent(ResizedMessage {
            event_type: 16,
            width: 800,
            height: 600,
        }))
        .unwrap();

    // Act
    h.session.pump().unwrap();

    // Assert
    assert_eq!(
        h.sink.events(),
        vec![
            RecordedEvent::MouseMotion(mouse_move(3, 4)),
            RecordedEvent::Key(key_press(13)),
            RecordedEvent::Resized(800, 600),
        ]
    );
    assert!(h.session.is_connected());
}

#[test]
fn test_pump_read_error_closes_session_and_unmaps() {
    // Arrange
    let mut h = harness();
    h.channel.push_message(&mode_reply(8, 8, true, "/fb")).unwrap();
    h.session.set_video_mode(8, 8, true, false).unwrap();
    h.channel.push_step(RecvStep::Fail(io::ErrorKind::ConnectionReset));

    // Act
    let first = h.session.pump();
    let second = h.session.pump();

    // Assert
    assert!(matches!(first, Err(SessionError::Io(_))));
    assert!(matches!(second, Err(SessionError::Disconnected)));
    assert!(!h.session.is_connected());
    assert!(h.session.geometry().is_none());
    assert_eq!(h.shm.live_mappings(), 0);
    assert_eq!(h.sink.quit_count(), 1);
}

#[test]
fn test_pump_rejects_frame_longer_than_maximum() {
    // Arrange: a valid key event padded past the frame limit
    let mut h = harness();
    let mut frame =
        rdisplay_core::encode_message(&DisplayMessage::KeyEvent(key_press(97))).unwrap();
    frame.resize(3000, 0);
    h.channel.push_raw(frame);

    // Act
    let result = h.session.pump();

    // Assert
    assert!(matches!(
        result,
        Err(SessionError::Protocol(ProtocolError::FrameTooLarge {
            size: 3000,
            max: MAX_FRAME_SIZE
        }))
    ));
    assert!(h.sink.events().iter().all(|e| *e == RecordedEvent::Quit));
    assert_eq!(h.sink.quit_count(), 1);
    assert!(!h.session.is_connected());
}

#[test]
fn test_oversized_frame_during_wait_is_protocol_error() {
    let mut h = harness();
    h.channel.push_raw(vec![0; MAX_FRAME_SIZE + 1]);

    let result = h.session.set_video_mode(8, 8, false, false);

    assert!(matches!(
        result,
        Err(SessionError::Protocol(ProtocolError::FrameTooLarge { .. }))
    ));
    assert!(!h.session.is_connected());
}

#[test]
fn test_pump_flushes_queued_output_first() {
    let mut h = harness();
    h.channel.script_send(SendStep::Partial(3));
    h.session.warp_mouse(1, 2).unwrap();
    assert_eq!(h.session.buffered_output(), 1);

    h.session.pump().unwrap();

    assert_eq!(h.session.buffered_output(), 0);
    assert_eq!(h.channel.sent_frames().len(), 2);
    let expected =
        rdisplay_core::encode_message(&DisplayMessage::WarpMouse(WarpMouseMessage { x: 1, y: 2 }))
            .unwrap();
    assert_eq!(h.channel.written_bytes(), expected);
}

#[test]
fn test_eof_notifies_mock_sink_exactly_once() {
    // Arrange
    let mut sink = MockSink::new();
    sink.expect_quit().times(1).return_const(());
    let channel = MockChannel::new();
    channel.push_step(RecvStep::Closed);
    let mut session = Session::with_channel(
        Box::new(channel.clone()),
        Arc::new(HeapSharedMemory::new()),
        Arc::new(sink),
    );

    // Act
    let first = session.pump();
    let second = session.pump();
    session.teardown();

    // Assert
    assert!(matches!(first, Err(SessionError::Disconnected)));
    assert!(matches!(second, Err(SessionError::Disconnected)));
}

#[test]
fn test_mock_sink_receives_button_and_focus_events() {
    // Arrange
    let button = MouseButtonMessage {
        event_type: 5,
        which: 0,
        button: 1,
        state: ButtonState::Pressed,
        x: 10,
        y: 20,
    };
    let focus = ActiveMessage {
        event_type: 1,
        gain: true,
        state: 2,
    };
    let mut sink = MockSink::new();
    sink.expect_mouse_button()
        .withf(move |e| *e == button)
        .times(1)
        .return_const(());
    sink.expect_active()
        .withf(move |e| *e == focus)
        .times(1)
        .return_const(());
    let channel = MockChannel::new();
    channel
        .push_message(&DisplayMessage::MouseButtonEvent(button))
        .unwrap();
    channel
        .push_message(&DisplayMessage::ActiveEvent(focus))
        .unwrap();
    let mut session = Session::with_channel(
        Box::new(channel),
        Arc::new(HeapSharedMemory::new()),
        Arc::new(sink),
    );

    // Act / Assert
    session.pump().unwrap();
}

// ── Mode set ──────────────────────────────────────────────────────────────────

#[test]
fn test_mode_set_maps_both_views_of_640x480() {
    // Arrange
    let mut h = harness();
    h.channel
        .push_message(&mode_reply(640, 480, true, "/rdisplay-fb"))
        .unwrap();

    // Act
    let surface = h.session.set_video_mode(640, 480, true, false).unwrap();

    // Assert
    let geometry = *h.session.geometry().unwrap();
    let opened = h
        .shm
        .opened
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    assert_eq!(opened, vec![("/rdisplay-fb".to_string(), 2_457_600)]);
    assert_eq!(geometry.view_offset(1), Some(1_228_800));
    assert_eq!(h.session.framebuffer_bytes().unwrap().len(), 2_457_600);
    assert_eq!(surface.slot(), 0);
    assert_eq!(h.session.surface_pixels(surface).unwrap().len(), 1_228_800);
}

#[test]
fn test_rejected_mode_keeps_previous_mode() {
    // Arrange
    let mut h = harness();
    h.channel.push_message(&mode_reply(8, 8, true, "/a")).unwrap();
    h.channel.push_message(&mode_refused()).unwrap();
    let surface = h.session.set_video_mode(8, 8, true, false).unwrap();

    // Act
    let result = h.session.set_video_mode(16, 16, true, false);

    // Assert
    assert!(matches!(
        result,
        Err(SessionError::ModeRejected {
            width: 16,
            height: 16
        })
    ));
    assert!(h.session.is_connected());
    assert_eq!(h.session.geometry().unwrap().width, 8);
    assert_eq!(h.session.current_surface(), Some(surface));
    assert_eq!(h.shm.live_mappings(), 1);
    assert_eq!(h.shm.opened_names(), vec!["/a".to_string()]);
    assert_eq!(h.sink.quit_count(), 0);
}

#[test]
fn test_mapping_failure_is_recoverable_and_leaks_nothing() {
    // Arrange
    let mut h = harness();
    h.shm.should_fail.store(true, Ordering::SeqCst);
    h.channel.push_message(&mode_reply(8, 8, true, "/gone")).unwrap();
    h.channel.push_message(&mode_reply(8, 8, true, "/fb")).unwrap();

    // Act
    let failed = h.session.set_video_mode(8, 8, true, false);
    h.shm.should_fail.store(false, Ordering::SeqCst);
    let retried = h.session.set_video_mode(8, 8, true, false);

    // Assert
    assert!(matches!(failed, Err(SessionError::Resource { .. })));
    assert!(retried.is_ok());
    assert_eq!(h.shm.live_mappings(), 1);
    assert_eq!(h.sink.quit_count(), 0);
}

#[test]
fn test_short_mapping_is_unmapped_and_resource_error() {
    let mut h = harness();
    h.shm.short_by.store(1, Ordering::SeqCst);
    h.channel.push_message(&mode_reply(8, 8, false, "/fb")).unwrap();

    let result = h.session.set_video_mode(8, 8, false, false);

    assert!(matches!(result, Err(SessionError::Resource { .. })));
    assert_eq!(h.shm.live_mappings(), 0);
    assert!(h.session.geometry().is_none());
    assert!(h.session.is_connected());
}

#[test]
fn test_new_mode_invalidates_old_surfaces() {
    // Arrange
    let mut h = harness();
    h.channel.push_message(&mode_reply(8, 8, false, "/a")).unwrap();
    h.channel.push_message(&mode_reply(16, 16, false, "/b")).unwrap();
    let old = h.session.set_video_mode(8, 8, false, false).unwrap();

    // Act
    let new = h.session.set_video_mode(16, 16, false, false).unwrap();

    // Assert
    assert_ne!(old, new);
    assert!(matches!(
        h.session.flip(old),
        Err(SessionError::InvalidSurface)
    ));
    assert_eq!(h.shm.live_mappings(), 1);
}

#[test]
fn test_caption_is_replayed_after_mode_set() {
    // Arrange
    let mut h = harness();
    h.session.set_caption("hello").unwrap();
    h.channel.push_message(&mode_reply(8, 8, false, "/fb")).unwrap();

    // Act
    h.session.set_video_mode(8, 8, false, false).unwrap();
    h.session.set_caption("world").unwrap();

    // Assert
    let sent = h.channel.sent_messages();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[1], DisplayMessage::SetCaption("hello".to_string()));
    assert_eq!(sent[2], DisplayMessage::SetCaption("world".to_string()));
}

// ── Flip / present ────────────────────────────────────────────────────────────

#[test]
fn test_single_buffered_flip_sends_draw_without_waiting() {
    // Arrange
    let mut h = harness();
    h.channel.push_message(&mode_reply(8, 8, false, "/fb")).unwrap();
    let surface = h.session.set_video_mode(8, 8, false, false).unwrap();

    // Act
    let next = h.session.flip(surface).unwrap();

    // Assert
    assert_eq!(next, surface);
    assert!(h.channel.wait_calls().is_empty());
    assert_eq!(
        h.channel.sent_messages().last(),
        Some(&DisplayMessage::Draw(DrawMessage { flip: false }))
    );
}

#[test]
fn test_double_buffered_flip_alternates_views() {
    // Arrange
    let mut h = harness();
    h.channel.push_message(&mode_reply(8, 8, true, "/fb")).unwrap();
    h.channel.push_message(&DisplayMessage::Flipped).unwrap();
    h.channel.push_message(&DisplayMessage::Flipped).unwrap();
    let first = h.session.set_video_mode(8, 8, true, false).unwrap();

    // Act
    let second = h.session.flip(first).unwrap();
    let third = h.session.flip(second).unwrap();

    // Assert
    assert_eq!(first.slot(), 0);
    assert_eq!(second.slot(), 1);
    assert_eq!(third, first);
    let draws = h
        .channel
        .sent_messages()
        .into_iter()
        .filter(|m| *m == DisplayMessage::Draw(DrawMessage { flip: true }))
        .count();
    assert_eq!(draws, 2);
}

#[test]
fn test_present_copies_dirty_rect_into_back_view() {
    // Arrange
    let mut h = harness();
    h.channel.push_message(&mode_reply(4, 4, true, "/fb")).unwrap();
    let front = h.session.set_video_mode(4, 4, true, false).unwrap();
    h.session.surface_pixels(front).unwrap().fill(0xAA);

    // Act
    h.session.present(&[Rect::new(1, 1, 2, 2)]).unwrap();

    // Assert
    let bytes = h.session.framebuffer_bytes().unwrap();
    let back = &bytes[64..];
    for y in 0..4 {
        for x in 0..4 {
            let expected = if (1..3).contains(&x) && (1..3).contains(&y) {
                0xAA
            } else {
                0
            };
            let offset = y * 16 + x * 4;
            assert_eq!(back[offset..offset + 4], [expected; 4], "pixel ({x},{y})");
        }
    }
    assert_eq!(
        h.channel.sent_messages().last(),
        Some(&DisplayMessage::Draw(DrawMessage { flip: false }))
    );
}

#[test]
fn test_present_whole_surface_marker_copies_everything() {
    let mut h = harness();
    h.channel.push_message(&mode_reply(4, 4, true, "/fb")).unwrap();
    let front = h.session.set_video_mode(4, 4, true, false).unwrap();
    h.session.surface_pixels(front).unwrap().fill(0x11);

    h.session.present(&[Rect::default()]).unwrap();

    let bytes = h.session.framebuffer_bytes().unwrap();
    assert!(bytes.iter().all(|b| *b == 0x11));
}

#[test]
fn test_present_without_rects_sends_nothing() {
    let mut h = harness();
    h.channel.push_message(&mode_reply(4, 4, true, "/fb")).unwrap();
    h.session.set_video_mode(4, 4, true, false).unwrap();
    let sent_before = h.channel.sent_frames().len();

    h.session.present(&[]).unwrap();

    assert_eq!(h.channel.sent_frames().len(), sent_before);
}

// ── Cursors ───────────────────────────────────────────────────────────────────

#[test]
fn test_cursor_lifecycle() {
    // Arrange
    let mut h = harness();
    h.channel.push_message(&mode_reply(8, 8, false, "/fb")).unwrap();
    h.channel.push_message(&DisplayMessage::Flipped).unwrap();
    h.channel.push_message(&cursor_added(5)).unwrap();
    h.session.set_video_mode(8, 8, false, false).unwrap();

    // Act
    let cursor = h
        .session
        .create_cursor(&[0xFF; 16], &[0x0F; 16], 16, 8, 1, 2)
        .unwrap();
    h.session.show_cursor(Some(cursor)).unwrap();
    h.session.show_cursor(None).unwrap();
    h.session.free_cursor(cursor).unwrap();

    // Assert
    assert_eq!(cursor.index(), 5);
    assert_eq!(h.session.buffered_events(), 0);
    let manage: Vec<ManageCursorMessage> = h
        .channel
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
            ManageCursorMessage { op: CursorOp::Set, index: 5 },
            ManageCursorMessage { op: CursorOp::Show, index: 5 },
            ManageCursorMessage { op: CursorOp::Hide, index: -1 },
            ManageCursorMessage { op: CursorOp::Delete, index: 5 },
        ]
    );
}

#[test]
fn test_rejected_cursor_keeps_session_open() {
    let mut h = harness();
    h.channel.push_message(&cursor_added(-1)).unwrap();

    let result = h.session.create_cursor(&[0; 2], &[0; 2], 8, 2, 0, 0);

    assert!(matches!(result, Err(SessionError::CursorRejected)));
    assert!(h.session.is_connected());
    assert_eq!(h.sink.quit_count(), 0);
}

// ── Teardown ──────────────────────────────────────────────────────────────────

#[test]
fn test_teardown_twice_releases_mapping_once() {
    // Arrange
    let mut h = harness();
    h.channel.push_message(&mode_reply(8, 8, true, "/fb")).unwrap();
    h.session.set_video_mode(8, 8, true, false).unwrap();
    assert_eq!(h.shm.live_mappings(), 1);

    // Act
    h.session.teardown();
    h.session.teardown();

    // Assert
    assert_eq!(h.shm.live_mappings(), 0);
    assert!(h.session.geometry().is_none());
    assert!(matches!(
        h.session.warp_mouse(0, 0),
        Err(SessionError::Disconnected)
    ));
    assert_eq!(h.sink.quit_count(), 0);
}

#[test]
fn test_dropping_session_unmaps_framebuffer() {
    let h = harness();
    let Harness {
        mut session,
        channel,
        shm,
        ..
    } = h;
    channel.push_message(&mode_reply(8, 8, false, "/fb")).unwrap();
    session.set_video_mode(8, 8, false, false).unwrap();

    drop(session);

    assert_eq!(shm.live_mappings(), 0);
}
