//! Stores the cached surfaces grouped by the image they belong to.
//!
//! For correctness, we must be able to remove all surfaces of an image once the image is
//! destroyed or invalidated. As this happens frequently, the surfaces of each image are kept in a
//! separate table, so that discarding an image doesn't require a scan of the whole cache.
//!
//! Note that an image without any surfaces is never present in [ImageCaches](ImageCaches).
use fnv::FnvHashMap;

use crate::cache::costs::{CostEntry, SurfaceId};
use crate::cache::expiration::ExpirationState;
use crate::cache::SurfaceLocator;
use crate::cost::{Cost, IntSize};
use crate::keys::{ImageKey, SurfaceKey};

/// Represents a surface along with all the bookkeeping the cache needs.
pub(crate) struct CachedSurface<S> {
    pub(crate) surface: S,
    pub(crate) target_size: IntSize,
    pub(crate) cost: Cost,
    pub(crate) id: SurfaceId,
    pub(crate) locator: SurfaceLocator,
    pub(crate) expiration: ExpirationState,
}

impl<S> CachedSurface<S> {
    pub(crate) fn cost_entry(&self) -> CostEntry {
        CostEntry {
            cost: self.cost,
            id: self.id,
            locator: self.locator,
        }
    }
}

/// Contains all surfaces of a single image.
pub(crate) struct ImageSurfaceCache<S> {
    surfaces: FnvHashMap<SurfaceKey, CachedSurface<S>>,
}

impl<S> ImageSurfaceCache<S> {
    fn new() -> Self {
        ImageSurfaceCache {
            surfaces: FnvHashMap::default(),
        }
    }

    pub(crate) fn insert(&mut self, key: SurfaceKey, surface: CachedSurface<S>) {
        let previous = self.surfaces.insert(key, surface);
        debug_assert!(previous.is_none(), "A surface has been replaced silently!");
    }

    pub(crate) fn remove(&mut self, key: &SurfaceKey) -> Option<CachedSurface<S>> {
        self.surfaces.remove(key)
    }

    pub(crate) fn lookup_mut(&mut self, key: &SurfaceKey) -> Option<&mut CachedSurface<S>> {
        self.surfaces.get_mut(key)
    }

    pub(crate) fn contains(&self, key: &SurfaceKey) -> bool {
        self.surfaces.contains_key(key)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.surfaces.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.surfaces.len()
    }

    /// Consumes this cache and yields all of its surfaces.
    pub(crate) fn into_surfaces(self) -> impl Iterator<Item = CachedSurface<S>> {
        self.surfaces.into_values()
    }
}

/// Maps each image to its per-image cache.
pub(crate) struct ImageCaches<S> {
    caches: FnvHashMap<ImageKey, ImageSurfaceCache<S>>,
}

impl<S> ImageCaches<S> {
    pub(crate) fn new() -> Self {
        ImageCaches {
            caches: FnvHashMap::default(),
        }
    }

    pub(crate) fn get_or_create(&mut self, image: ImageKey) -> &mut ImageSurfaceCache<S> {
        self.caches.entry(image).or_insert_with(ImageSurfaceCache::new)
    }

    pub(crate) fn get(&self, image: ImageKey) -> Option<&ImageSurfaceCache<S>> {
        self.caches.get(&image)
    }

    pub(crate) fn get_mut(&mut self, image: ImageKey) -> Option<&mut ImageSurfaceCache<S>> {
        self.caches.get_mut(&image)
    }

    /// Drops the cache of the given image if it no longer contains any surfaces.
    pub(crate) fn remove_if_empty(&mut self, image: ImageKey) {
        if self.caches.get(&image).map_or(false, |cache| cache.is_empty()) {
            let _ = self.caches.remove(&image);
        }
    }

    /// Removes and returns the whole cache of the given image.
    pub(crate) fn take(&mut self, image: ImageKey) -> Option<ImageSurfaceCache<S>> {
        self.caches.remove(&image)
    }

    /// Returns the number of images which have at least one cached surface.
    pub(crate) fn len(&self) -> usize {
        self.caches.len()
    }

    /// Returns the total number of cached surfaces.
    pub(crate) fn surface_count(&self) -> usize {
        self.caches.values().map(|cache| cache.len()).sum()
    }

    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&ImageKey, &ImageSurfaceCache<S>)> {
        self.caches.iter()
    }

    #[cfg(test)]
    pub(crate) fn surfaces(&self) -> impl Iterator<Item = &CachedSurface<S>> {
        self.caches
            .values()
            .flat_map(|cache| cache.surfaces.values())
    }
}
