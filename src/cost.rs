//! Provides the cost model of the surface cache.
//!
//! Right now, the cost of a surface is simply an estimate of its size in bytes. Each cached
//! surface is assumed to be stored with 32 bits per pixel, so that the cost of a surface can be
//! derived from its target dimensions alone - without ever looking at the surface itself. This
//! permits producers to ask the cache whether a surface could be stored at all, before spending
//! any time rendering it.
//!
//! # Example
//!
//! ```
//! # use surface_cache::cost::{compute_cost, IntSize};
//! assert_eq!(compute_cost(IntSize::new(500, 500)), 1_000_000);
//! assert_eq!(compute_cost(IntSize::new(0, 100)), 0);
//! ```
use std::fmt;
use std::fmt::Display;

/// Represents the estimated footprint of a cached surface in bytes.
pub type Cost = usize;

/// Each pixel is stored as 32bpp (RGBA / BGRA).
pub const BYTES_PER_PIXEL: usize = 4;

/// Describes the dimensions of a surface in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct IntSize {
    /// The width in pixels.
    pub width: u32,
    /// The height in pixels.
    pub height: u32,
}

impl IntSize {
    /// Creates a new size with the given dimensions.
    pub const fn new(width: u32, height: u32) -> Self {
        IntSize { width, height }
    }

    /// Determines if this size covers no pixels at all.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl Display for IntSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Computes the cost of storing a surface of the given size.
///
/// Note that this saturates instead of overflowing. A saturated cost is larger than any sane
/// budget and will therefore simply be rejected by the cache.
pub fn compute_cost(size: IntSize) -> Cost {
    (size.width as usize)
        .saturating_mul(size.height as usize)
        .saturating_mul(BYTES_PER_PIXEL)
}
