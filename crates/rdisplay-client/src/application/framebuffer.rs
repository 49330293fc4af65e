//! The shared-memory framebuffer and its surface views.
//!
//! The display server names a shared-memory segment in its mode-set reply.
//! The session maps it through a [`SharedMemory`] provider and carves one or
//! two views (front at offset 0, back one frame further) out of the single
//! mapping.  Dropping the [`MappedRegion`] unmaps the segment.

use std::io;

use rdisplay_core::{FramebufferGeometry, Rect};

/// A mapped shared-memory segment.  Unmapped on drop.
pub trait MappedRegion: Send {
    fn as_slice(&self) -> &[u8];
    fn as_mut_slice(&mut self) -> &mut [u8];

    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Opens named shared-memory segments advertised by the server.
pub trait SharedMemory: Send + Sync {
    /// Opens `name` read/write, removes the name so no other process can open
    /// it, and maps `len` bytes.  The descriptor is closed before returning,
    /// whether or not the mapping succeeded.
    ///
    /// # Errors
    ///
    /// Returns the I/O error of the open or map step.
    fn map(&self, name: &str, len: usize) -> io::Result<Box<dyn MappedRegion>>;
}

/// Identifies one view of the current framebuffer.
///
/// Handles from a previous mode are rejected after a new mode is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle {
    generation: u64,
    slot: usize,
}

impl SurfaceHandle {
    /// 0 for the front view, 1 for the back view.
    pub fn slot(&self) -> usize {
        self.slot
    }
}

/// A mapped framebuffer with its views.
pub(crate) struct MappedFramebuffer {
    geometry: FramebufferGeometry,
    region: Box<dyn MappedRegion>,
    generation: u64,
    /// Slot the application should draw into next.
    current: usize,
}

impl std::fmt::Debug for MappedFramebuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedFramebuffer")
            .field("geometry", &self.geometry)
            .field("mapped", &self.region.len())
            .field("generation", &self.generation)
            .field("current", &self.current)
            .finish()
    }
}

impl MappedFramebuffer {
    /// Builds the views over `region`.  On failure `region` is dropped, which
    /// unmaps it.
    ///
    /// # Errors
    ///
    /// Fails when the region is smaller than the geometry requires.
    pub(crate) fn new(
        geometry: FramebufferGeometry,
        region: Box<dyn MappedRegion>,
        generation: u64,
    ) -> io::Result<Self> {
        let needed = geometry.mapping_len();
        if region.len() < needed {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("mapped {} bytes, surfaces need {needed}", region.len()),
            ));
        }
        Ok(Self {
            geometry,
            region,
            generation,
            current: 0,
        })
    }

    pub(crate) fn geometry(&self) -> &FramebufferGeometry {
        &self.geometry
    }

    pub(crate) fn current(&self) -> SurfaceHandle {
        self.handle(self.current)
    }

    fn handle(&self, slot: usize) -> SurfaceHandle {
        SurfaceHandle {
            generation: self.generation,
            slot,
        }
    }

    /// Returns `true` if `surface` is one of this framebuffer's views.
    pub(crate) fn owns(&self, surface: SurfaceHandle) -> bool {
        surface.generation == self.generation && surface.slot < self.geometry.view_count()
    }

    /// After a flip of `shown`, the application draws into the other view.
    pub(crate) fn swap_after_flip(&mut self, shown: SurfaceHandle) -> SurfaceHandle {
        self.current = if shown.slot == 0 { 1 } else { 0 };
        self.current()
    }

    /// Pixels of one view.  `surface` must be owned by this framebuffer.
    pub(crate) fn view_mut(&mut self, surface: SurfaceHandle) -> Option<&mut [u8]> {
        let offset = self.geometry.view_offset(surface.slot)?;
        let len = self.geometry.frame_len();
        self.region.as_mut_slice().get_mut(offset..offset + len)
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.region.as_slice()[..self.geometry.mapping_len()]
    }

    /// Copies the dirty rectangles of the front view into the back view,
    /// row by row.  The all-zero rectangle copies the whole frame.
    pub(crate) fn copy_front_to_back(&mut self, rects: &[Rect]) {
        let Some(back) = self.geometry.view_offset(1) else {
            return;
        };
        let pixels = self.region.as_mut_slice();
        for rect in rects {
            for row in self.geometry.dirty_rows(*rect) {
                let dest = back + row.start;
                pixels.copy_within(row, dest);
            }
        }
    }
}
