//! Infrastructure layer: adapters behind the application-layer traits.
//!
//! # Adapters
//!
//! | Trait | Real adapter | Test double |
//! |-------|--------------|-------------|
//! | `Channel` / `Connector` | `channel::seqpacket` (Linux) | `channel::mock` |
//! | `SharedMemory` | `shm::posix` (Linux) | `shm::mock` |
//! | `EventSink` | `event_sink::LoggingEventSink` | `event_sink::mock` |
//!
//! `config` loads the TOML settings used by the binary.

pub mod channel;
pub mod config;
pub mod event_sink;
pub mod shm;
