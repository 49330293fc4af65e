//! All rdisplay protocol message types.
//!
//! Every frame on the wire is a 4-byte type tag followed by a payload whose
//! layout is fixed per tag.  Two variants (caption text and cursor bitmaps)
//! carry trailing data whose length follows from the frame size.
//!
//! Tags are powers of two so a set of acceptable replies can be expressed as
//! a [`MessageMask`] built with `|`.

use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Size of the type tag that starts every frame.
pub const TAG_SIZE: usize = 4;

/// Largest payload a single frame may carry.
pub const MAX_PAYLOAD_SIZE: usize = 1024;

/// Largest frame (tag + payload) that may be sent or received.
pub const MAX_FRAME_SIZE: usize = TAG_SIZE + MAX_PAYLOAD_SIZE;

// ── Message type codes ────────────────────────────────────────────────────────

/// Message type tags.  Each value is a distinct bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum MessageType {
    SetVideoMode = 1,
    VideoModeSet = 2,
    Draw = 4,
    Flipped = 8,
    WarpMouse = 16,
    SetCaption = 32,
    KeyEvent = 64,
    MouseButtonEvent = 128,
    MouseMoveEvent = 256,
    ResizedEvent = 512,
    ActiveEvent = 1024,
    QuitEvent = 2048,
    AddCursor = 4096,
    CursorAdded = 8192,
    ManageCursor = 16384,
}

impl MessageType {
    /// Every known message type, in tag order.
    pub const ALL: [MessageType; 15] = [
        MessageType::SetVideoMode,
        MessageType::VideoModeSet,
        MessageType::Draw,
        MessageType::Flipped,
        MessageType::WarpMouse,
        MessageType::SetCaption,
        MessageType::KeyEvent,
        MessageType::MouseButtonEvent,
        MessageType::MouseMoveEvent,
        MessageType::ResizedEvent,
        MessageType::ActiveEvent,
        MessageType::QuitEvent,
        MessageType::AddCursor,
        MessageType::CursorAdded,
        MessageType::ManageCursor,
    ];

    /// Raw tag value as written on the wire.
    pub const fn tag(self) -> u32 {
        self as u32
    }

    /// Minimum payload length for this type.  Shorter frames are rejected.
    pub const fn min_payload_len(self) -> usize {
        match self {
            MessageType::SetVideoMode => SET_VIDEO_MODE_LEN,
            MessageType::VideoModeSet => VIDEO_MODE_SET_FIXED_LEN,
            MessageType::Draw => DRAW_LEN,
            MessageType::Flipped => 0,
            MessageType::WarpMouse => WARP_MOUSE_LEN,
            MessageType::SetCaption => 0,
            MessageType::KeyEvent => KEY_EVENT_LEN,
            MessageType::MouseButtonEvent => MOUSE_BUTTON_LEN,
            MessageType::MouseMoveEvent => MOUSE_MOVE_LEN,
            MessageType::ResizedEvent => RESIZED_LEN,
            MessageType::ActiveEvent => ACTIVE_LEN,
            MessageType::QuitEvent => 0,
            MessageType::AddCursor => ADD_CURSOR_FIXED_LEN,
            MessageType::CursorAdded => CURSOR_ADDED_LEN,
            MessageType::ManageCursor => MANAGE_CURSOR_LEN,
        }
    }
}

impl TryFrom<u32> for MessageType {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, ()> {
        MessageType::ALL
            .iter()
            .copied()
            .find(|t| t.tag() == value)
            .ok_or(())
    }
}

// Fixed payload sizes.  They match the C struct layout the display server
// uses (4-byte ints, 1-byte bools, natural alignment).
pub(crate) const SET_VIDEO_MODE_LEN: usize = 12;
pub(crate) const VIDEO_MODE_SET_FIXED_LEN: usize = 32;
pub(crate) const DRAW_LEN: usize = 1;
pub(crate) const WARP_MOUSE_LEN: usize = 8;
pub(crate) const KEY_EVENT_LEN: usize = 20;
pub(crate) const MOUSE_BUTTON_LEN: usize = 8;
pub(crate) const MOUSE_MOVE_LEN: usize = 12;
pub(crate) const RESIZED_LEN: usize = 12;
pub(crate) const ACTIVE_LEN: usize = 3;
pub(crate) const ADD_CURSOR_FIXED_LEN: usize = 16;
pub(crate) const CURSOR_ADDED_LEN: usize = 4;
pub(crate) const MANAGE_CURSOR_LEN: usize = 8;

// ── Type mask ─────────────────────────────────────────────────────────────────

/// A set of message types, used to say which replies a blocking wait accepts
/// and which ones it silently drops.
///
/// ```rust
/// use rdisplay_core::protocol::messages::{MessageMask, MessageType};
///
/// let mask = MessageType::VideoModeSet | MessageType::QuitEvent;
/// assert!(mask.matches_tag(MessageType::QuitEvent.tag()));
/// assert!(!mask.matches_tag(MessageType::Flipped.tag()));
/// assert!(MessageMask::NONE.is_empty());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MessageMask(pub u32);

impl MessageMask {
    pub const NONE: MessageMask = MessageMask(0);

    /// Returns `true` if the raw `tag` shares a bit with this mask.
    ///
    /// Unknown tags are tested bitwise too, so a future tag never matches an
    /// empty mask.
    pub const fn matches_tag(self, tag: u32) -> bool {
        self.0 & tag != 0
    }

    pub const fn contains(self, ty: MessageType) -> bool {
        self.matches_tag(ty.tag())
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl From<MessageType> for MessageMask {
    fn from(ty: MessageType) -> Self {
        MessageMask(ty.tag())
    }
}

impl BitOr for MessageMask {
    type Output = MessageMask;

    fn bitor(self, rhs: MessageMask) -> MessageMask {
        MessageMask(self.0 | rhs.0)
    }
}

impl BitOr<MessageType> for MessageMask {
    type Output = MessageMask;

    fn bitor(self, rhs: MessageType) -> MessageMask {
        MessageMask(self.0 | rhs.tag())
    }
}

impl BitOr for MessageType {
    type Output = MessageMask;

    fn bitor(self, rhs: MessageType) -> MessageMask {
        MessageMask(self.tag() | rhs.tag())
    }
}

impl BitOrAssign<MessageType> for MessageMask {
    fn bitor_assign(&mut self, rhs: MessageType) {
        self.0 |= rhs.tag();
    }
}

// ── Shared field types ────────────────────────────────────────────────────────

/// Pressed/released state byte used by key and mouse button events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ButtonState {
    Released = 0,
    Pressed = 1,
}

impl TryFrom<u8> for ButtonState {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ButtonState::Released),
            1 => Ok(ButtonState::Pressed),
            _ => Err(()),
        }
    }
}

/// Operation codes carried by [`ManageCursorMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum CursorOp {
    /// Make `index` the current cursor.
    Set = 0,
    /// Forget the cursor at `index`.
    Delete = 1,
    Show = 2,
    Hide = 3,
}

impl TryFrom<i32> for CursorOp {
    type Error = ();

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CursorOp::Set),
            1 => Ok(CursorOp::Delete),
            2 => Ok(CursorOp::Show),
            3 => Ok(CursorOp::Hide),
            _ => Err(()),
        }
    }
}

/// Bits of [`ActiveMessage::state`].
pub mod active_state {
    pub const MOUSE_FOCUS: u8 = 0x01;
    pub const INPUT_FOCUS: u8 = 0x02;
    pub const APP_ACTIVE: u8 = 0x04;
}

// ── Per-message payload structs ───────────────────────────────────────────────

/// SET_VIDEO_MODE (client → server): ask for a framebuffer of the given size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetVideoModeMessage {
    pub width: i32,
    pub height: i32,
    pub double_buffered: bool,
    pub resizable: bool,
}

/// VIDEO_MODE_SET (server → client): reply to [`SetVideoModeMessage`].
///
/// On success the server has created a shared memory segment called
/// `shm_name` holding `pitch * height` bytes per buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoModeSetMessage {
    pub success: bool,
    pub double_buffered: bool,
    pub width: i32,
    pub height: i32,
    /// Bytes per row.
    pub pitch: i32,
    /// Bits per pixel.
    pub depth: i32,
    pub red_mask: u32,
    pub green_mask: u32,
    pub blue_mask: u32,
    /// Name of the shared memory segment (NUL-terminated on the wire).
    pub shm_name: String,
}

/// DRAW (client → server): the framebuffer changed.  With `flip` set the
/// server swaps buffers and answers with FLIPPED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawMessage {
    pub flip: bool,
}

/// WARP_MOUSE (client → server).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarpMouseMessage {
    pub x: i32,
    pub y: i32,
}

/// Key symbol block embedded in [`KeyEventMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeySym {
    pub scancode: u8,
    /// Virtual key code (translation tables live with the event consumer).
    pub sym: u32,
    /// Modifier bit set.
    pub modifiers: u32,
    pub unicode: u16,
}

/// KEY_EVENT (server → client).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEventMessage {
    /// Event kind byte as produced by the server's toolkit.
    pub event_type: u8,
    pub which: u8,
    pub state: ButtonState,
    pub keysym: KeySym,
}

/// MOUSE_BUTTON_EVENT (server → client).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MouseButtonMessage {
    pub event_type: u8,
    pub which: u8,
    pub button: u8,
    pub state: ButtonState,
    pub x: u16,
    pub y: u16,
}

/// MOUSE_MOVE_EVENT (server → client).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MouseMoveMessage {
    pub event_type: u8,
    pub which: u8,
    /// Bit set of held buttons.
    pub buttons: u8,
    pub x: u16,
    pub y: u16,
    pub x_rel: i16,
    pub y_rel: i16,
}

/// RESIZED_EVENT (server → client): the user resized the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizedMessage {
    pub event_type: u8,
    pub width: i32,
    pub height: i32,
}

/// ACTIVE_EVENT (server → client): focus or visibility changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveMessage {
    pub event_type: u8,
    pub gain: bool,
    /// Bits from [`active_state`].
    pub state: u8,
}

/// ADD_CURSOR (client → server): upload a 1-bpp cursor image and mask.
///
/// `data` and `mask` each hold `width / 8 * height` bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddCursorMessage {
    pub width: i32,
    pub height: i32,
    pub hot_x: i32,
    pub hot_y: i32,
    pub data: Vec<u8>,
    pub mask: Vec<u8>,
}

impl AddCursorMessage {
    /// Bytes per bitmap plane for a `width` x `height` cursor, or `None` when
    /// the dimensions are negative.
    pub fn plane_len(width: i32, height: i32) -> Option<usize> {
        let w = usize::try_from(width).ok()?;
        let h = usize::try_from(height).ok()?;
        (w / 8).checked_mul(h)
    }
}

/// CURSOR_ADDED (server → client): reply to [`AddCursorMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorAddedMessage {
    /// Server-side cursor slot, or `-1` when the upload was refused.
    pub index: i32,
}

/// MANAGE_CURSOR (client → server).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManageCursorMessage {
    pub op: CursorOp,
    /// Cursor slot; ignored by the server for `Show` and `Hide`.
    pub index: i32,
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// A decoded rdisplay protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayMessage {
    SetVideoMode(SetVideoModeMessage),
    VideoModeSet(VideoModeSetMessage),
    Draw(DrawMessage),
    Flipped,
    WarpMouse(WarpMouseMessage),
    SetCaption(String),
    KeyEvent(KeyEventMessage),
    MouseButtonEvent(MouseButtonMessage),
    MouseMoveEvent(MouseMoveMessage),
    ResizedEvent(ResizedMessage),
    ActiveEvent(ActiveMessage),
    QuitEvent,
    AddCursor(AddCursorMessage),
    CursorAdded(CursorAddedMessage),
    ManageCursor(ManageCursorMessage),
}

impl DisplayMessage {
    /// Returns the [`MessageType`] tag for this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            DisplayMessage::SetVideoMode(_) => MessageType::SetVideoMode,
            DisplayMessage::VideoModeSet(_) => MessageType::VideoModeSet,
            DisplayMessage::Draw(_) => MessageType::Draw,
            DisplayMessage::Flipped => MessageType::Flipped,
            DisplayMessage::WarpMouse(_) => MessageType::WarpMouse,
            DisplayMessage::SetCaption(_) => MessageType::SetCaption,
            DisplayMessage::KeyEvent(_) => MessageType::KeyEvent,
            DisplayMessage::MouseButtonEvent(_) => MessageType::MouseButtonEvent,
            DisplayMessage::MouseMoveEvent(_) => MessageType::MouseMoveEvent,
            DisplayMessage::ResizedEvent(_) => MessageType::ResizedEvent,
            DisplayMessage::ActiveEvent(_) => MessageType::ActiveEvent,
            DisplayMessage::QuitEvent => MessageType::QuitEvent,
            DisplayMessage::AddCursor(_) => MessageType::AddCursor,
            DisplayMessage::CursorAdded(_) => MessageType::CursorAdded,
            DisplayMessage::ManageCursor(_) => MessageType::ManageCursor,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
