//! Provides the abstraction of a cached surface whose storage might be revoked.
//!
//! The cache doesn't store raw pixel buffers. Instead it stores anything implementing
//! [Surface](Surface), which is essentially a capability: whenever a consumer wants to use the
//! surface, it has to obtain a drawable reference. If the backing storage has been reclaimed by
//! the platform in the meantime, no reference can be obtained and the cache treats the entry as
//! a miss (and drops it).
//!
//! [Frame](Frame) is the canonical implementation. It keeps its pixels in a volatile buffer
//! which can be purged at any time - unless a [DrawableFrame](DrawableFrame) is currently alive,
//! which pins the pixels in memory.
//!
//! # Example
//!
//! ```
//! # use std::sync::Arc;
//! # use surface_cache::cost::IntSize;
//! # use surface_cache::surface::{Frame, Surface};
//! let frame = Arc::new(Frame::blank(IntSize::new(2, 2)));
//!
//! // While a drawable reference is held, the pixels cannot be purged...
//! let drawable = frame.drawable_ref().unwrap();
//! assert_eq!(frame.purge(), false);
//! assert_eq!(drawable.pixels().len(), 16);
//!
//! // ...but once it is gone, the platform may reclaim them.
//! drop(drawable);
//! assert_eq!(frame.purge(), true);
//! assert_eq!(frame.drawable_ref().is_none(), true);
//! ```
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::cost::{compute_cost, IntSize};

/// Describes a resource which can be stored in a [SurfaceCache](crate::cache::SurfaceCache).
pub trait Surface {
    /// The reference handed out to consumers on a cache hit.
    type Ref;

    /// Obtains a reference which can be used to draw the surface.
    ///
    /// Returns **None** if the backing storage of the surface has been reclaimed.
    fn drawable_ref(&self) -> Option<Self::Ref>;
}

/// A rendered bitmap stored in a purgeable (volatile) buffer.
pub struct Frame {
    size: IntSize,
    pixels: RwLock<Option<Arc<[u8]>>>,
}

impl Frame {
    /// Wraps the given 32bpp pixel data.
    ///
    /// # Errors
    /// Fails if the number of bytes doesn't match the given size.
    pub fn from_pixels(size: IntSize, pixels: Vec<u8>) -> anyhow::Result<Self> {
        let expected = compute_cost(size);
        if pixels.len() != expected {
            return Err(anyhow::anyhow!(
                "A frame of {} requires {} bytes but {} were given!",
                size,
                expected,
                pixels.len()
            ));
        }

        Ok(Frame {
            size,
            pixels: RwLock::new(Some(Arc::from(pixels))),
        })
    }

    /// Creates a fully transparent frame of the given size.
    pub fn blank(size: IntSize) -> Self {
        Frame {
            size,
            pixels: RwLock::new(Some(Arc::from(vec![0u8; compute_cost(size)]))),
        }
    }

    /// Returns the size of the frame in pixels.
    pub fn size(&self) -> IntSize {
        self.size
    }

    /// Determines if the pixels of this frame have been reclaimed.
    pub fn is_purged(&self) -> bool {
        self.pixels.read().unwrap().is_none()
    }

    /// Reclaims the pixel buffer, as the platform would do under memory pressure.
    ///
    /// Returns **true** if the buffer was released, **false** if it is currently pinned by a
    /// [DrawableFrame](DrawableFrame) or has already been purged.
    pub fn purge(&self) -> bool {
        let mut pixels = self.pixels.write().unwrap();
        match pixels.as_ref() {
            Some(buffer) if Arc::strong_count(buffer) == 1 => {
                *pixels = None;
                true
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("size", &self.size)
            .field("purged", &self.is_purged())
            .finish()
    }
}

impl Surface for Arc<Frame> {
    type Ref = DrawableFrame;

    fn drawable_ref(&self) -> Option<DrawableFrame> {
        let pixels = self.pixels.read().unwrap().clone()?;
        Some(DrawableFrame {
            frame: self.clone(),
            pixels,
        })
    }
}

/// Pins the pixels of a [Frame](Frame) so that they can be drawn.
pub struct DrawableFrame {
    frame: Arc<Frame>,
    pixels: Arc<[u8]>,
}

impl DrawableFrame {
    /// Returns the frame being referenced.
    pub fn frame(&self) -> &Arc<Frame> {
        &self.frame
    }

    /// Returns the size of the frame in pixels.
    pub fn size(&self) -> IntSize {
        self.frame.size
    }

    /// Provides access to the 32bpp pixel data.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

impl fmt::Debug for DrawableFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrawableFrame")
            .field("size", &self.frame.size)
            .finish()
    }
}
