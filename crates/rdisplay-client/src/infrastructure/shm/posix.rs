//! POSIX shared-memory framebuffer mapping.

use std::ffi::c_void;
use std::fs::File;
use std::io;
use std::num::NonZeroUsize;
use std::ptr::NonNull;

use nix::fcntl::OFlag;
use nix::sys::mman::{mmap, munmap, shm_open, shm_unlink, MapFlags, ProtFlags};
use nix::sys::stat::Mode;
use tracing::{debug, warn};

use crate::application::framebuffer::{MappedRegion, SharedMemory};

/// Maps named POSIX shared-memory segments read/write.
#[derive(Debug, Clone, Copy, Default)]
pub struct PosixSharedMemory;

impl SharedMemory for PosixSharedMemory {
    fn map(&self, name: &str, len: usize) -> io::Result<Box<dyn MappedRegion>> {
        let len = NonZeroUsize::new(len)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty framebuffer"))?;

        let fd = shm_open(name, OFlag::O_RDWR, Mode::empty())?;
        // Nobody else may open the segment once we hold it.
        if let Err(e) = shm_unlink(name) {
            warn!(name, error = %e, "could not unlink shared memory name");
        }

        // Touching pages past the end of the segment raises SIGBUS.
        let segment = File::from(fd);
        let size = segment.metadata()?.len();
        if size < len.get() as u64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "shared memory segment {name:?} holds {size} bytes, framebuffer needs {}",
                    len.get()
                ),
            ));
        }

        // SAFETY: a fresh shared mapping of a descriptor we own; no existing
        // Rust object aliases the returned range.
        let ptr = unsafe {
            mmap(
                None,
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
                &segment,
                0,
            )
        }?;
        drop(segment);

        debug!(name, len = len.get(), "shared memory mapped");
        Ok(Box::new(PosixRegion {
            ptr,
            len: len.get(),
        }))
    }
}

/// A live `mmap` range, unmapped on drop.
struct PosixRegion {
    ptr: NonNull<c_void>,
    len: usize,
}

// SAFETY: the region is exclusively owned; the only other writer is the
// display server in another process.
unsafe impl Send for PosixRegion {}

impl MappedRegion for PosixRegion {
    fn as_slice(&self) -> &[u8] {
        // SAFETY: `ptr` is valid for `len` bytes until drop.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr().cast::<u8>(), self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above, and `&mut self` guarantees unique access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr().cast::<u8>(), self.len) }
    }
}

impl Drop for PosixRegion {
    fn drop(&mut self) {
        // SAFETY: `ptr`/`len` came from a successful mmap and are unmapped once.
        if let Err(e) = unsafe { munmap(self.ptr, self.len) } {
            warn!(error = %e, "munmap failed");
        }
    }
}
