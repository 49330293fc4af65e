//! Heap-backed shared memory for tests.
//!
//! Regions are plain zeroed buffers.  Every map call is recorded, failures
//! can be injected, and a live-mapping counter drops when a region is
//! dropped, which is how tests observe "unmapped".

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::application::framebuffer::{MappedRegion, SharedMemory};

#[derive(Debug, Default)]
pub struct HeapSharedMemory {
    /// `(name, len)` of every map call.
    pub opened: Mutex<Vec<(String, usize)>>,
    /// When set, `map` fails with `NotFound`.
    pub should_fail: AtomicBool,
    /// Regions come back this many bytes shorter than requested.
    pub short_by: AtomicUsize,
    live: Arc<AtomicUsize>,
}

impl HeapSharedMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Regions currently mapped.
    pub fn live_mappings(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn opened_names(&self) -> Vec<String> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl SharedMemory for HeapSharedMemory {
    fn map(&self, name: &str, len: usize) -> io::Result<Box<dyn MappedRegion>> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name.to_string(), len));
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no shared memory segment {name:?}"),
            ));
        }
        let size = len.saturating_sub(self.short_by.load(Ordering::SeqCst));
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(HeapRegion {
            bytes: vec![0; size],
            live: Arc::clone(&self.live),
        }))
    }
}

struct HeapRegion {
    bytes: Vec<u8>,
    live: Arc<AtomicUsize>,
}

impl MappedRegion for HeapRegion {
    fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl Drop for HeapRegion {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}
