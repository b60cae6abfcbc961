//! Provides the two keys which together identify a cached surface.
//!
//! An [ImageKey](ImageKey) identifies the logical owner (the image) of a family of surfaces. This
//! is merely an opaque token - the cache never holds on to the image itself and therefore never
//! influences its lifetime. Consequently, the owner has to call
//! [discard](crate::cache::SurfaceCache::discard) once it is destroyed or invalidated.
//!
//! A [SurfaceKey](SurfaceKey) describes the rendering parameters which distinguish the variants
//! of the same image. Callers should construct a key using the helper matching their image type:
//! [raster_surface_key](raster_surface_key) or [vector_surface_key](vector_surface_key).
//!
//! # Example
//!
//! ```
//! # use surface_cache::cost::IntSize;
//! # use surface_cache::keys::{raster_surface_key, vector_surface_key, ImageKey, SvgContext};
//! let image = ImageKey::allocate();
//! assert_ne!(image, ImageKey::allocate());
//!
//! // Raster images ignore the animation time...
//! let raster = raster_surface_key(IntSize::new(64, 64), 0);
//! assert_eq!(raster, raster_surface_key(IntSize::new(64, 64), 0));
//! assert_eq!(raster.size(), IntSize::new(64, 64));
//!
//! // ...whereas vector images ignore the flags but respect the context.
//! let context = SvgContext::new(IntSize::new(100, 50));
//! let vector = vector_surface_key(IntSize::new(64, 64), Some(context), 0.5);
//! assert_ne!(vector, vector_surface_key(IntSize::new(64, 64), None, 0.5));
//! ```
use std::fmt;
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::cost::IntSize;

/// Identifies the owner of a family of cached surfaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImageKey(u64);

impl ImageKey {
    /// Wraps an identity chosen by the caller.
    ///
    /// Note that the caller has to ensure that no two live images share the same identity.
    /// Using [allocate](ImageKey::allocate) is the simplest way to achieve this.
    pub const fn from_raw(id: u64) -> Self {
        ImageKey(id)
    }

    /// Allocates a new process-wide unique key.
    pub fn allocate() -> Self {
        static NEXT_IMAGE_ID: AtomicU64 = AtomicU64::new(1);
        ImageKey(NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw identity of this key.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "image#{}", self.0)
    }
}

/// Describes the context in which a vector image is rendered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SvgContext {
    viewport_size: IntSize,
    preserve_aspect_ratio: Option<u32>,
}

impl SvgContext {
    /// Creates a context for the given viewport.
    pub fn new(viewport_size: IntSize) -> Self {
        SvgContext {
            viewport_size,
            preserve_aspect_ratio: None,
        }
    }

    /// Specifies an (encoded) preserveAspectRatio override.
    pub fn with_preserve_aspect_ratio(mut self, preserve_aspect_ratio: u32) -> Self {
        self.preserve_aspect_ratio = Some(preserve_aspect_ratio);
        self
    }

    /// Returns the viewport size.
    pub fn viewport_size(&self) -> IntSize {
        self.viewport_size
    }

    /// Returns the preserveAspectRatio override if present.
    pub fn preserve_aspect_ratio(&self) -> Option<u32> {
        self.preserve_aspect_ratio
    }
}

/// Identifies a specific surface of an image.
///
/// Together with an [ImageKey](ImageKey) this uniquely identifies a cached surface. Note that
/// the animation time is compared bitwise so that the key can be hashed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceKey {
    size: IntSize,
    svg_context: Option<SvgContext>,
    animation_time: u32,
    flags: u32,
}

impl SurfaceKey {
    /// Returns the target size of the surface.
    pub fn size(&self) -> IntSize {
        self.size
    }

    /// Returns the SVG context (only present for vector images).
    pub fn svg_context(&self) -> Option<&SvgContext> {
        self.svg_context.as_ref()
    }

    /// Returns the animation time (always 0 for raster images).
    pub fn animation_time(&self) -> f32 {
        f32::from_bits(self.animation_time)
    }

    /// Returns the decode flags (always 0 for vector images).
    pub fn flags(&self) -> u32 {
        self.flags
    }
}

impl Display for SurfaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.size)?;
        if let Some(context) = &self.svg_context {
            write!(f, " in {}", context.viewport_size)?;
        }
        if self.animation_time != 0 {
            write!(f, " @{}", self.animation_time())?;
        }
        if self.flags != 0 {
            write!(f, " [{:#x}]", self.flags)?;
        }

        Ok(())
    }
}

/// Creates a key for a surface of a raster image.
///
/// Only the first frame of a raster image is ever cached, therefore the animation time isn't
/// part of the key.
pub fn raster_surface_key(size: IntSize, flags: u32) -> SurfaceKey {
    SurfaceKey {
        size,
        svg_context: None,
        animation_time: 0.0f32.to_bits(),
        flags,
    }
}

/// Creates a key for a surface of a vector image.
///
/// None of the decode flags influence how a vector image is rendered, therefore these aren't
/// part of the key.
pub fn vector_surface_key(
    size: IntSize,
    svg_context: Option<SvgContext>,
    animation_time: f32,
) -> SurfaceKey {
    SurfaceKey {
        size,
        svg_context,
        animation_time: normalize(animation_time).to_bits(),
        flags: 0,
    }
}

/// Maps -0.0 to 0.0 so that both yield the same key.
fn normalize(animation_time: f32) -> f32 {
    if animation_time == 0.0 {
        0.0
    } else {
        animation_time
    }
}

#[cfg(test)]
mod tests {
    use crate::cost::IntSize;
    use crate::keys::{raster_surface_key, vector_surface_key, ImageKey, SvgContext};
    use std::collections::HashSet;

    #[test]
    fn allocated_image_keys_are_unique() {
        let keys: HashSet<ImageKey> = (0..100).map(|_| ImageKey::allocate()).collect();
        assert_eq!(keys.len(), 100);
    }

    #[test]
    fn raw_image_keys_compare_by_identity() {
        assert_eq!(ImageKey::from_raw(42), ImageKey::from_raw(42));
        assert_ne!(ImageKey::from_raw(42), ImageKey::from_raw(43));
        assert_eq!(ImageKey::from_raw(42).raw(), 42);
    }

    #[test]
    fn raster_keys_respect_size_and_flags() {
        let size = IntSize::new(32, 16);
        assert_eq!(raster_surface_key(size, 1), raster_surface_key(size, 1));
        assert_ne!(raster_surface_key(size, 1), raster_surface_key(size, 2));
        assert_ne!(
            raster_surface_key(size, 1),
            raster_surface_key(IntSize::new(16, 32), 1)
        );
        assert_eq!(raster_surface_key(size, 1).animation_time(), 0.0);
    }

    #[test]
    fn vector_keys_respect_context_and_animation_time() {
        let size = IntSize::new(32, 32);
        let context = SvgContext::new(IntSize::new(100, 100));

        assert_eq!(
            vector_surface_key(size, Some(context), 1.5),
            vector_surface_key(size, Some(context), 1.5)
        );
        assert_ne!(
            vector_surface_key(size, Some(context), 1.5),
            vector_surface_key(size, Some(context), 2.5)
        );
        assert_ne!(
            vector_surface_key(size, Some(context), 1.5),
            vector_surface_key(size, Some(context.with_preserve_aspect_ratio(3)), 1.5)
        );
        assert_eq!(
            vector_surface_key(size, None, 0.0),
            vector_surface_key(size, None, -0.0)
        );
        assert_eq!(vector_surface_key(size, None, 0.0).flags(), 0);
    }

    #[test]
    fn keys_can_be_used_in_hash_sets() {
        let size = IntSize::new(8, 8);
        let mut keys = HashSet::new();
        assert!(keys.insert(raster_surface_key(size, 0)));
        assert!(keys.insert(vector_surface_key(size, None, 0.25)));
        assert!(!keys.insert(raster_surface_key(size, 0)));
    }

    #[test]
    fn keys_are_formatted_readably() {
        let context = SvgContext::new(IntSize::new(100, 50));
        assert_eq!(
            format!("{}", raster_surface_key(IntSize::new(8, 8), 0)),
            "8x8"
        );
        assert_eq!(
            format!("{}", raster_surface_key(IntSize::new(8, 8), 16)),
            "8x8 [0x10]"
        );
        assert_eq!(
            format!(
                "{}",
                vector_surface_key(IntSize::new(8, 8), Some(context), 0.5)
            ),
            "8x8 in 100x50 @0.5"
        );
        assert_eq!(format!("{}", ImageKey::from_raw(7)), "image#7");
    }
}
