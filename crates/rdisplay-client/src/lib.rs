//! rdisplay-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does rdisplay-client do? (for beginners)
//!
//! A display server owns the real window.  This client connects to it over a
//! local socket and:
//!
//! 1. Asks for a video mode (`SetVideoMode`) and waits for the answer.
//! 2. Maps the shared-memory framebuffer the server names in its reply.
//! 3. Draws into that memory and sends `Draw` to have it shown, flipping
//!    between two views when double-buffered.
//! 4. Receives keyboard, mouse, resize, focus and quit events and hands them
//!    to an [`application::EventSink`].
//!
//! The socket is non-blocking.  Outbound frames that cannot be written yet
//! are queued, and request/reply exchanges use a blocking wait that buffers
//! unrelated events for the next pump.

/// Application layer: the session engine and the seams it depends on.
pub mod application;

/// Infrastructure layer: OS adapters, configuration and test doubles.
pub mod infrastructure;
