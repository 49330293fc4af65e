//! Domain entities for rdisplay.
//!
//! Pure arithmetic over the negotiated framebuffer.  Nothing here touches the
//! socket or the shared-memory segment; the client crate owns those and asks
//! this module where views start and which bytes a dirty rectangle covers.

pub mod framebuffer;
