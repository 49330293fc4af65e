//! Application layer for the display client.
//!
//! # What lives here?
//!
//! - **`channel`** – The [`Channel`] trait the session talks through, plus the
//!   [`Connector`] that opens one.  The real socket lives in infrastructure.
//!
//! - **`write_queue`** / **`read_queue`** – Per-session buffers for frames the
//!   socket could not take yet, and for events that arrived while a request
//!   was waiting for its reply.
//!
//! - **`events`** – The [`EventSink`] that receives decoded input events.
//!
//! - **`framebuffer`** – The shared-memory seam and the mapped framebuffer
//!   with its front/back views.
//!
//! - **`session`** – The [`Session`]: pump, blocking wait, mode set, flip,
//!   present, caption, cursors and teardown.
//!
//! - **`backend`** – [`DisplayBackend`], the capability trait a graphics
//!   layer drives the session through.

pub mod backend;
pub mod channel;
pub mod events;
pub mod framebuffer;
pub mod read_queue;
pub mod session;
pub mod write_queue;

pub use backend::{CursorImage, DisplayBackend, ModeRequest};
pub use channel::{Channel, Connector, Interest};
pub use events::EventSink;
pub use framebuffer::{MappedRegion, SharedMemory, SurfaceHandle};
pub use session::{CursorHandle, Session, SessionError, SessionState};
