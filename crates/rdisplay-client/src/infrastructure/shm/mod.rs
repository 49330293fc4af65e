//! Shared-memory adapters.
//!
//! [`posix::PosixSharedMemory`] maps segments with `shm_open` and `mmap` on
//! Linux.  [`mock::HeapSharedMemory`] backs regions with heap buffers and
//! counts live mappings so tests can check that nothing leaks.

pub mod mock;

#[cfg(target_os = "linux")]
pub mod posix;
