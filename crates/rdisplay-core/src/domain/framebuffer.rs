//! Framebuffer geometry negotiated by a mode-set reply.
//!
//! The display server describes one shared-memory segment that holds either
//! one frame or, when double-buffered, two frames back to back.  Everything
//! here is arithmetic over that description: segment size, where each view
//! starts, and which byte ranges a dirty rectangle covers.

use std::ops::Range;

use thiserror::Error;

use crate::protocol::messages::VideoModeSetMessage;

/// Errors produced when a mode-set reply describes an unusable framebuffer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeometryError {
    #[error("invalid framebuffer dimensions {width}x{height}")]
    InvalidDimensions { width: i32, height: i32 },

    #[error("unsupported pixel depth: {0} bits")]
    InvalidDepth(i32),

    /// The pitch cannot hold one row of pixels.
    #[error("pitch {pitch} is smaller than one row ({min} bytes)")]
    PitchTooSmall { pitch: i32, min: usize },

    #[error("framebuffer size overflows the address space")]
    TooLarge,
}

/// Pixel layout of the shared framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    /// Bits per pixel.
    pub depth: u8,
    pub red_mask: u32,
    pub green_mask: u32,
    pub blue_mask: u32,
}

impl PixelFormat {
    /// Bytes occupied by one pixel, rounding partial bytes up.
    pub fn bytes_per_pixel(&self) -> usize {
        (usize::from(self.depth) + 7) / 8
    }
}

/// A rectangle in surface coordinates.
///
/// The all-zero rectangle is the "whole surface" marker used by present
/// requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    /// Returns `true` for the degenerate all-zero rectangle.
    pub fn is_whole_surface(&self) -> bool {
        *self == Rect::default()
    }
}

/// Size and layout of a negotiated framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferGeometry {
    pub width: u32,
    pub height: u32,
    /// Bytes between the starts of two consecutive rows.
    pub pitch: usize,
    pub format: PixelFormat,
    pub double_buffered: bool,
}

impl FramebufferGeometry {
    /// Validates the geometry carried by a successful mode-set reply.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError`] when dimensions are not positive, the depth is
    /// outside 1..=32, the pitch is narrower than a row, or the segment size
    /// overflows `usize`.
    pub fn from_reply(reply: &VideoModeSetMessage) -> Result<Self, GeometryError> {
        if reply.width <= 0 || reply.height <= 0 {
            return Err(GeometryError::InvalidDimensions {
                width: reply.width,
                height: reply.height,
            });
        }
        let depth = match u8::try_from(reply.depth) {
            Ok(d @ 1..=32) => d,
            _ => return Err(GeometryError::InvalidDepth(reply.depth)),
        };
        let format = PixelFormat {
            depth,
            red_mask: reply.red_mask,
            green_mask: reply.green_mask,
            blue_mask: reply.blue_mask,
        };

        let width = reply.width as u32;
        let height = reply.height as u32;
        let min_pitch = (width as usize)
            .checked_mul(format.bytes_per_pixel())
            .ok_or(GeometryError::TooLarge)?;
        let pitch = usize::try_from(reply.pitch).unwrap_or(0);
        if pitch < min_pitch {
            return Err(GeometryError::PitchTooSmall {
                pitch: reply.pitch,
                min: min_pitch,
            });
        }

        let geometry = Self {
            width,
            height,
            pitch,
            format,
            double_buffered: reply.double_buffered,
        };
        geometry
            .frame_len()
            .checked_mul(geometry.view_count())
            .ok_or(GeometryError::TooLarge)?;
        Ok(geometry)
    }

    /// Bytes in one frame: `pitch * height`.
    pub fn frame_len(&self) -> usize {
        self.pitch.saturating_mul(self.height as usize)
    }

    /// Number of views in the mapping (2 when double-buffered).
    pub fn view_count(&self) -> usize {
        if self.double_buffered {
            2
        } else {
            1
        }
    }

    /// Size of the shared-memory segment to map.
    pub fn mapping_len(&self) -> usize {
        self.frame_len().saturating_mul(self.view_count())
    }

    /// Byte offset of view `slot` inside the mapping, or `None` if the slot
    /// does not exist.
    pub fn view_offset(&self, slot: usize) -> Option<usize> {
        (slot < self.view_count()).then(|| slot * self.frame_len())
    }

    /// Clips `rect` to the surface.  The whole-surface marker expands to the
    /// full frame; a rectangle entirely outside yields `None`.
    pub fn clip(&self, rect: Rect) -> Option<Rect> {
        if rect.is_whole_surface() {
            return Some(Rect::new(0, 0, self.width, self.height));
        }
        let left = i64::from(rect.x).max(0);
        let top = i64::from(rect.y).max(0);
        let right = (i64::from(rect.x) + i64::from(rect.w)).min(i64::from(self.width));
        let bottom = (i64::from(rect.y) + i64::from(rect.h)).min(i64::from(self.height));
        if left >= right || top >= bottom {
            return None;
        }
        Some(Rect::new(
            left as i32,
            top as i32,
            (right - left) as u32,
            (bottom - top) as u32,
        ))
    }

    /// Byte ranges, relative to the start of a view, covered by `rect` after
    /// clipping.  One range per row.
    pub fn dirty_rows(&self, rect: Rect) -> impl Iterator<Item = Range<usize>> {
        let pitch = self.pitch;
        let bpp = self.format.bytes_per_pixel();
        self.clip(rect).into_iter().flat_map(move |r| {
            let x = r.x as usize * bpp;
            let len = r.w as usize * bpp;
            (r.y as usize..r.y as usize + r.h as usize).map(move |row| {
                let start = row * pitch + x;
                start..start + len
            })
        })
    }
}
