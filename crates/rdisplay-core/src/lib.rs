//! # rdisplay-core
//!
//! Shared library for the rdisplay remote display client: the wire protocol,
//! its binary codec, and framebuffer geometry.
//!
//! It has no dependencies on sockets, shared memory or any OS API, so it
//! builds and tests anywhere.
//!
//! # Architecture overview (for beginners)
//!
//! A graphics client talks to a display server over a local socket that keeps
//! message boundaries.  The client asks for a video mode, the server answers
//! with the name of a shared-memory segment holding the framebuffer, the
//! client draws into it and tells the server when to show it.  Input events
//! travel the other way.
//!
//! - **`protocol`** – Message types and how they become bytes.  Every frame is
//!   a 4-byte type tag followed by a fixed payload; tags are single bits so a
//!   caller can wait for any of several replies with one mask.
//!
//! - **`domain`** – Framebuffer geometry: segment size, where the front and
//!   back views start, and which bytes a dirty rectangle touches.

pub mod domain;
pub mod protocol;

pub use domain::framebuffer::{FramebufferGeometry, GeometryError, PixelFormat, Rect};
pub use protocol::codec::{decode_frame, encode_message, Decoded, ProtocolError};
pub use protocol::messages::{DisplayMessage, MessageMask, MessageType};
