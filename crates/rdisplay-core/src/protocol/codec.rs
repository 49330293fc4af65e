//! Binary codec for encoding and decoding rdisplay protocol messages.
//!
//! Wire format:
//! ```text
//! [type_tag:4][payload:N]          N <= 1024
//! ```
//! The channel preserves message boundaries, so one read yields exactly one
//! frame and no reassembly is needed.  Integers use host byte order: both
//! ends always run on the same machine.
//!
//! Payload layouts mirror the C structs used by the display server (natural
//! alignment, 1-byte bools, padding bytes written as zero).

use thiserror::Error;
use tracing::trace;

use crate::protocol::messages::{
    ActiveMessage, AddCursorMessage, ButtonState, CursorAddedMessage, CursorOp, DisplayMessage,
    DrawMessage, KeyEventMessage, KeySym, ManageCursorMessage, MessageType, MouseButtonMessage,
    MouseMoveMessage, ResizedMessage, SetVideoModeMessage, VideoModeSetMessage,
    WarpMouseMessage, ADD_CURSOR_FIXED_LEN, MAX_FRAME_SIZE, TAG_SIZE, VIDEO_MODE_SET_FIXED_LEN,
};

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The frame cannot even hold the 4-byte type tag.
    #[error("frame too short: need 4 bytes for the type tag, got {available}")]
    FrameTooShort { available: usize },

    /// The payload is shorter than the fixed layout of its message type.
    #[error("{message:?}: need {needed} payload bytes, got {available}")]
    InsufficientData {
        message: MessageType,
        needed: usize,
        available: usize,
    },

    /// The payload could not be parsed (enum value out of range, UTF-8 error, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The encoded frame would not fit in a single protocol frame.
    #[error("frame of {size} bytes exceeds the {max}-byte maximum")]
    FrameTooLarge { size: usize, max: usize },
}

/// Result of decoding one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A message this client understands.
    Message(DisplayMessage),
    /// A well-formed frame with a tag this client does not know.  Callers skip
    /// it so newer servers can add message types.
    Unhandled { tag: u32 },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`DisplayMessage`] into a complete frame (tag + payload).
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooLarge`] when variable data (caption,
/// cursor bitmap) pushes the frame past [`MAX_FRAME_SIZE`], and
/// [`ProtocolError::MalformedPayload`] when the message cannot be represented
/// on the wire (embedded NUL in a string, cursor planes of the wrong size).
///
/// # Examples
///
/// ```rust
/// use rdisplay_core::protocol::codec::{decode_frame, encode_message, Decoded};
/// use rdisplay_core::protocol::messages::{DisplayMessage, DrawMessage};
///
/// let msg = DisplayMessage::Draw(DrawMessage { flip: true });
/// let bytes = encode_message(&msg).unwrap();
/// assert_eq!(bytes.len(), 5);
/// assert_eq!(decode_frame(&bytes).unwrap(), Decoded::Message(msg));
/// ```
pub fn encode_message(msg: &DisplayMessage) -> Result<Vec<u8>, ProtocolError> {
    let ty = msg.message_type();
    let mut buf = Vec::with_capacity(TAG_SIZE + ty.min_payload_len());
    buf.extend_from_slice(&ty.tag().to_ne_bytes());
    encode_payload(&mut buf, msg)?;

    if buf.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: buf.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    Ok(buf)
}

/// Reads the type tag at the start of `frame` without decoding the payload.
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooShort`] if fewer than 4 bytes are present.
pub fn peek_tag(frame: &[u8]) -> Result<u32, ProtocolError> {
    match frame.get(..TAG_SIZE) {
        Some(tag) => Ok(u32::from_ne_bytes([tag[0], tag[1], tag[2], tag[3]])),
        None => Err(ProtocolError::FrameTooShort {
            available: frame.len(),
        }),
    }
}

/// Decodes one complete frame.
///
/// Unknown tags decode to [`Decoded::Unhandled`] rather than an error.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the frame is shorter than the tag, shorter
/// than the fixed payload of its type, or the payload is malformed.
pub fn decode_frame(frame: &[u8]) -> Result<Decoded, ProtocolError> {
    let tag = peek_tag(frame)?;
    let Ok(ty) = MessageType::try_from(tag) else {
        trace!(tag, len = frame.len(), "unknown message tag");
        return Ok(Decoded::Unhandled { tag });
    };

    let payload = &frame[TAG_SIZE..];
    require_len(payload, ty.min_payload_len(), ty)?;
    decode_payload(ty, payload).map(Decoded::Message)
}

// ── Payload encoding ──────────────────────────────────────────────────────────

fn encode_payload(buf: &mut Vec<u8>, msg: &DisplayMessage) -> Result<(), ProtocolError> {
    match msg {
        DisplayMessage::SetVideoMode(m) => encode_set_video_mode(buf, m),
        DisplayMessage::VideoModeSet(m) => encode_video_mode_set(buf, m)?,
        DisplayMessage::Draw(m) => buf.push(u8::from(m.flip)),
        DisplayMessage::Flipped => {} // empty payload
        DisplayMessage::WarpMouse(m) => {
            put_i32(buf, m.x);
            put_i32(buf, m.y);
        }
        DisplayMessage::SetCaption(caption) => write_c_string(buf, caption, "caption")?,
        DisplayMessage::KeyEvent(m) => encode_key_event(buf, m),
        DisplayMessage::MouseButtonEvent(m) => encode_mouse_button(buf, m),
        DisplayMessage::MouseMoveEvent(m) => encode_mouse_move(buf, m),
        DisplayMessage::ResizedEvent(m) => {
            buf.extend_from_slice(&[m.event_type, 0, 0, 0]);
            put_i32(buf, m.width);
            put_i32(buf, m.height);
        }
        DisplayMessage::ActiveEvent(m) => {
            buf.extend_from_slice(&[m.event_type, u8::from(m.gain), m.state]);
        }
        DisplayMessage::QuitEvent => {}
        DisplayMessage::AddCursor(m) => encode_add_cursor(buf, m)?,
        DisplayMessage::CursorAdded(m) => put_i32(buf, m.index),
        DisplayMessage::ManageCursor(m) => {
            put_i32(buf, m.op as i32);
            put_i32(buf, m.index);
        }
    }
    Ok(())
}

// ── Payload decoding ──────────────────────────────────────────────────────────

fn decode_payload(ty: MessageType, p: &[u8]) -> Result<DisplayMessage, ProtocolError> {
    match ty {
        MessageType::SetVideoMode => Ok(DisplayMessage::SetVideoMode(SetVideoModeMessage {
            width: read_i32(p, 0),
            height: read_i32(p, 4),
            double_buffered: p[8] != 0,
            resizable: p[9] != 0,
        })),
        MessageType::VideoModeSet => decode_video_mode_set(p).map(DisplayMessage::VideoModeSet),
        MessageType::Draw => Ok(DisplayMessage::Draw(DrawMessage { flip: p[0] != 0 })),
        MessageType::Flipped => Ok(DisplayMessage::Flipped),
        MessageType::WarpMouse => Ok(DisplayMessage::WarpMouse(WarpMouseMessage {
            x: read_i32(p, 0),
            y: read_i32(p, 4),
        })),
        MessageType::SetCaption => read_c_string(p, 0).map(DisplayMessage::SetCaption),
        MessageType::KeyEvent => decode_key_event(p).map(DisplayMessage::KeyEvent),
        MessageType::MouseButtonEvent => {
            decode_mouse_button(p).map(DisplayMessage::MouseButtonEvent)
        }
        MessageType::MouseMoveEvent => Ok(DisplayMessage::MouseMoveEvent(MouseMoveMessage {
            event_type: p[0],
            which: p[1],
            buttons: p[2],
            x: read_u16(p, 4),
            y: read_u16(p, 6),
            x_rel: read_u16(p, 8) as i16,
            y_rel: read_u16(p, 10) as i16,
        })),
        MessageType::ResizedEvent => Ok(DisplayMessage::ResizedEvent(ResizedMessage {
            event_type: p[0],
            width: read_i32(p, 4),
            height: read_i32(p, 8),
        })),
        MessageType::ActiveEvent => Ok(DisplayMessage::ActiveEvent(ActiveMessage {
            event_type: p[0],
            gain: p[1] != 0,
            state: p[2],
        })),
        MessageType::QuitEvent => Ok(DisplayMessage::QuitEvent),
        MessageType::AddCursor => decode_add_cursor(p).map(DisplayMessage::AddCursor),
        MessageType::CursorAdded => Ok(DisplayMessage::CursorAdded(CursorAddedMessage {
            index: read_i32(p, 0),
        })),
        MessageType::ManageCursor => {
            let raw_op = read_i32(p, 0);
            let op = CursorOp::try_from(raw_op).map_err(|_| {
                ProtocolError::MalformedPayload(format!("unknown cursor op: {raw_op}"))
            })?;
            Ok(DisplayMessage::ManageCursor(ManageCursorMessage {
                op,
                index: read_i32(p, 4),
            }))
        }
    }
}

// ── Per-message encode helpers ────────────────────────────────────────────────

fn encode_set_video_mode(buf: &mut Vec<u8>, m: &SetVideoModeMessage) {
    put_i32(buf, m.width);
    put_i32(buf, m.height);
    buf.extend_from_slice(&[u8::from(m.double_buffered), u8::from(m.resizable), 0, 0]);
}

fn encode_video_mode_set(buf: &mut Vec<u8>, m: &VideoModeSetMessage) -> Result<(), ProtocolError> {
    buf.extend_from_slice(&[u8::from(m.success), u8::from(m.double_buffered), 0, 0]);
    put_i32(buf, m.width);
    put_i32(buf, m.height);
    put_i32(buf, m.pitch);
    put_i32(buf, m.depth);
    buf.extend_from_slice(&m.red_mask.to_ne_bytes());
    buf.extend_from_slice(&m.green_mask.to_ne_bytes());
    buf.extend_from_slice(&m.blue_mask.to_ne_bytes());
    write_c_string(buf, &m.shm_name, "shared memory name")
}

fn encode_key_event(buf: &mut Vec<u8>, m: &KeyEventMessage) {
    buf.extend_from_slice(&[m.event_type, m.which, m.state as u8, 0]);
    buf.extend_from_slice(&[m.keysym.scancode, 0, 0, 0]);
    buf.extend_from_slice(&m.keysym.sym.to_ne_bytes());
    buf.extend_from_slice(&m.keysym.modifiers.to_ne_bytes());
    buf.extend_from_slice(&m.keysym.unicode.to_ne_bytes());
    buf.extend_from_slice(&[0, 0]);
}

fn encode_mouse_button(buf: &mut Vec<u8>, m: &MouseButtonMessage) {
    buf.extend_from_slice(&[m.event_type, m.which, m.button, m.state as u8]);
    buf.extend_from_slice(&m.x.to_ne_bytes());
    buf.extend_from_slice(&m.y.to_ne_bytes());
}

fn encode_mouse_move(buf: &mut Vec<u8>, m: &MouseMoveMessage) {
    buf.extend_from_slice(&[m.event_type, m.which, m.buttons, 0]);
    buf.extend_from_slice(&m.x.to_ne_bytes());
    buf.extend_from_slice(&m.y.to_ne_bytes());
    buf.extend_from_slice(&m.x_rel.to_ne_bytes());
    buf.extend_from_slice(&m.y_rel.to_ne_bytes());
}

fn encode_add_cursor(buf: &mut Vec<u8>, m: &AddCursorMessage) -> Result<(), ProtocolError> {
    let plane = AddCursorMessage::plane_len(m.width, m.height).ok_or_else(|| {
        ProtocolError::MalformedPayload(format!(
            "cursor dimensions {}x{} are negative",
            m.width, m.height
        ))
    })?;
    if m.data.len() != plane || m.mask.len() != plane {
        return Err(ProtocolError::MalformedPayload(format!(
            "cursor planes must be {plane} bytes each, got data={} mask={}",
            m.data.len(),
            m.mask.len()
        )));
    }
    put_i32(buf, m.width);
    put_i32(buf, m.height);
    put_i32(buf, m.hot_x);
    put_i32(buf, m.hot_y);
    buf.extend_from_slice(&m.data);
    buf.extend_from_slice(&m.mask);
    Ok(())
}

// ── Per-message decode helpers ────────────────────────────────────────────────

fn decode_video_mode_set(p: &[u8]) -> Result<VideoModeSetMessage, ProtocolError> {
    let shm_name = read_c_string(p, VIDEO_MODE_SET_FIXED_LEN)?;
    Ok(VideoModeSetMessage {
        success: p[0] != 0,
        double_buffered: p[1] != 0,
        width: read_i32(p, 4),
        height: read_i32(p, 8),
        pitch: read_i32(p, 12),
        depth: read_i32(p, 16),
        red_mask: read_u32(p, 20),
        green_mask: read_u32(p, 24),
        blue_mask: read_u32(p, 28),
        shm_name,
    })
}

fn decode_key_event(p: &[u8]) -> Result<KeyEventMessage, ProtocolError> {
    let state = ButtonState::try_from(p[2])
        .map_err(|_| ProtocolError::MalformedPayload(format!("unknown key state: {}", p[2])))?;
    Ok(KeyEventMessage {
        event_type: p[0],
        which: p[1],
        state,
        keysym: KeySym {
            scancode: p[4],
            sym: read_u32(p, 8),
            modifiers: read_u32(p, 12),
            unicode: read_u16(p, 16),
        },
    })
}

fn decode_mouse_button(p: &[u8]) -> Result<MouseButtonMessage, ProtocolError> {
    let state = ButtonState::try_from(p[3]).map_err(|_| {
        ProtocolError::MalformedPayload(format!("unknown mouse button state: {}", p[3]))
    })?;
    Ok(MouseButtonMessage {
        event_type: p[0],
        which: p[1],
        button: p[2],
        state,
        x: read_u16(p, 4),
        y: read_u16(p, 6),
    })
}

fn decode_add_cursor(p: &[u8]) -> Result<AddCursorMessage, ProtocolError> {
    let width = read_i32(p, 0);
    let height = read_i32(p, 4);
    let plane = AddCursorMessage::plane_len(width, height).ok_or_else(|| {
        ProtocolError::MalformedPayload(format!("cursor dimensions {width}x{height} are negative"))
    })?;
    let bitmap = &p[ADD_CURSOR_FIXED_LEN..];
    if bitmap.len() < 2 * plane {
        return Err(ProtocolError::InsufficientData {
            message: MessageType::AddCursor,
            needed: ADD_CURSOR_FIXED_LEN + 2 * plane,
            available: p.len(),
        });
    }
    Ok(AddCursorMessage {
        width,
        height,
        hot_x: read_i32(p, 8),
        hot_y: read_i32(p, 12),
        data: bitmap[..plane].to_vec(),
        mask: bitmap[plane..2 * plane].to_vec(),
    })
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize, message: MessageType) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        Err(ProtocolError::InsufficientData {
            message,
            needed,
            available: buf.len(),
        })
    } else {
        Ok(())
    }
}

fn put_i32(buf: &mut Vec<u8>, value: i32) {
    buf.extend_from_slice(&value.to_ne_bytes());
}

// Callers check lengths with `require_len` before reading fixed offsets.
fn read_i32(buf: &[u8], offset: usize) -> i32 {
    i32::from_ne_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_ne_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_ne_bytes([buf[offset], buf[offset + 1]])
}

/// Writes the UTF-8 bytes of `s` followed by a terminating NUL.
fn write_c_string(buf: &mut Vec<u8>, s: &str, what: &str) -> Result<(), ProtocolError> {
    if s.as_bytes().contains(&0) {
        return Err(ProtocolError::MalformedPayload(format!(
            "{what} contains an embedded NUL"
        )));
    }
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
    Ok(())
}

/// Reads a NUL-terminated string starting at `offset`.  A missing terminator
/// means the string runs to the end of the frame.
fn read_c_string(buf: &[u8], offset: usize) -> Result<String, ProtocolError> {
    let tail = buf.get(offset..).unwrap_or_default();
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    std::str::from_utf8(&tail[..end])
        .map(str::to_string)
        .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8: {e}")))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
