//! Channel adapters.
//!
//! The real adapter is a Unix `SOCK_SEQPACKET` socket, available on Linux.
//! A scripted mock is provided for tests.

pub mod mock;

#[cfg(target_os = "linux")]
pub mod seqpacket;
