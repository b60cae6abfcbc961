//! Provides the process wide surface cache.
//!
//! The image library uses a single cache for all of its surfaces, so that the budget is shared
//! among all images. This instance is created by [initialize](initialize) and destroyed by
//! [shutdown](shutdown). The thread which invokes **initialize** becomes the owning thread and
//! all other functions of this module must only be called from there - otherwise they panic.
//!
//! Before the cache has been initialized (and once it has been shut down), all functions behave
//! as if the cache were unavailable: lookups miss, insertions are ignored and
//! [can_hold](can_hold) reports **false**.
//!
//! Note that the cache can only be initialized once per process. Initializing it a second time,
//! even after a shutdown, is considered a programming error.
//!
//! # Example
//!
//! ```
//! # use std::sync::Arc;
//! # use std::time::Duration;
//! # use surface_cache::global;
//! # use surface_cache::cost::IntSize;
//! # use surface_cache::keys::{raster_surface_key, ImageKey};
//! # use surface_cache::surface::Frame;
//! global::initialize(16 * 1024 * 1024, Duration::from_secs(60));
//!
//! let image = ImageKey::allocate();
//! let key = raster_surface_key(IntSize::new(64, 64), 0);
//! if global::lookup(image, key).is_none() && global::can_hold(key.size()) {
//!     let frame = Arc::new(Frame::blank(key.size()));
//!     global::insert(frame, key.size(), image, key);
//! }
//! assert_eq!(global::lookup(image, key).is_some(), true);
//!
//! // Once the image is dropped...
//! global::discard(image);
//!
//! global::shutdown();
//! assert_eq!(global::is_available(), false);
//! ```
use std::cell::RefCell;
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::cache::{CacheReport, SurfaceCache};
use crate::config::Settings;
use crate::cost::{Cost, IntSize};
use crate::fmt::{format_duration, format_size};
use crate::keys::{ImageKey, SurfaceKey};
use crate::pressure::{self, PressureReceiver};
use crate::surface::{DrawableFrame, Frame};

static OWNER: OnceLock<ThreadId> = OnceLock::new();

thread_local! {
    static INSTANCE: RefCell<Option<Instance>> = RefCell::new(None);
}

struct Instance {
    cache: SurfaceCache<Arc<Frame>>,
    pressure: PressureReceiver,
}

/// Creates the process wide cache with the given budget and expiration window.
///
/// # Panics
/// Panics if the cache has already been initialized before.
pub fn initialize(max_cost: Cost, expiration: Duration) {
    assert!(
        OWNER.set(thread::current().id()).is_ok(),
        "The surface cache has already been initialized!"
    );

    INSTANCE.with(|instance| {
        *instance.borrow_mut() = Some(Instance {
            cache: SurfaceCache::new(max_cost, expiration),
            pressure: pressure::subscribe(),
        });
    });

    log::info!(
        "Surface cache initialized with a budget of {} and an expiration window of {}.",
        format_size(max_cost),
        format_duration(expiration)
    );
}

/// Creates the process wide cache as described by the given settings.
///
/// The budget is derived from the given amount of physical memory, see
/// [Settings::budget](Settings::budget).
pub fn initialize_with_settings(settings: &Settings, physical_memory: u64) {
    initialize(settings.budget(physical_memory), settings.expiration);
}

/// Destroys the process wide cache and releases all of its surfaces.
///
/// # Panics
/// Panics if the cache isn't running.
pub fn shutdown() {
    let instance = match OWNER.get() {
        Some(owner) => {
            assert_owning_thread(owner);
            INSTANCE.with(|instance| instance.borrow_mut().take())
        }
        None => None,
    };

    match instance {
        Some(instance) => log::info!(
            "Surface cache shut down. Released {} surface(s) occupying {}.",
            instance.cache.len(),
            format_size(instance.cache.size_of_surfaces_estimate())
        ),
        None => panic!("The surface cache isn't running!"),
    }
}

/// Determines if the cache is running and usable from the current thread.
///
/// In contrast to all other functions, this doesn't panic if invoked from a foreign thread.
pub fn is_available() -> bool {
    match OWNER.get() {
        Some(owner) if *owner == thread::current().id() => {
            INSTANCE.with(|instance| instance.borrow().is_some())
        }
        _ => false,
    }
}

/// Inserts the given frame, rendered for the given target size.
///
/// See [SurfaceCache::insert](SurfaceCache::insert).
pub fn insert(frame: Arc<Frame>, target_size: IntSize, image: ImageKey, key: SurfaceKey) {
    with_cache((), |cache| cache.insert(frame, target_size, image, key));
}

/// Looks up the surface for the given keys.
///
/// See [SurfaceCache::lookup](SurfaceCache::lookup).
pub fn lookup(image: ImageKey, key: SurfaceKey) -> Option<DrawableFrame> {
    with_cache(None, |cache| cache.lookup(image, key))
}

/// Determines if a surface of the given size could ever be cached.
///
/// See [SurfaceCache::can_hold](SurfaceCache::can_hold).
pub fn can_hold(size: IntSize) -> bool {
    with_cache(false, |cache| cache.can_hold(size))
}

/// Removes the surface for the given keys if it is present.
pub fn remove_if_present(image: ImageKey, key: SurfaceKey) {
    with_cache((), |cache| cache.remove_if_present(image, key));
}

/// Removes all surfaces of the given image.
pub fn discard(image: ImageKey) {
    with_cache((), |cache| cache.discard(image));
}

/// Removes all surfaces.
pub fn discard_all() {
    with_cache((), |cache| cache.discard_all());
}

/// Returns the (estimated) amount of memory occupied by cached surfaces.
pub fn size_of_surfaces_estimate() -> Cost {
    with_cache(0, |cache| cache.size_of_surfaces_estimate())
}

/// Creates a snapshot of the state and metrics of the cache.
pub fn report() -> Option<CacheReport> {
    with_cache(None, |cache| Some(cache.report()))
}

/// Performs all pending maintenance work.
///
/// This handles memory pressure signals received since the last tick and runs all expiration
/// sweeps which are due.
pub fn tick() {
    with_instance((), |instance| {
        if let Some(pressure) = pressure::pending(&mut instance.pressure) {
            log::info!(
                "Discarding all surfaces due to {} memory pressure...",
                pressure
            );
            instance.cache.discard_all();
        }

        let expired = instance.cache.run_due_sweeps();
        if expired > 0 {
            log::debug!("Expired {} surface(s).", expired);
        }
    });
}

/// Invokes [tick](tick) in the given interval until the cache is shut down.
///
/// This has to run on the owning thread, e.g. by using **tokio::task::spawn_local** within a
/// **LocalSet** or a current thread runtime.
pub async fn maintain(period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let _ = interval.tick().await;
        if !is_available() {
            log::debug!("Surface cache is no longer available. Stopping maintenance.");
            return;
        }

        tick();
    }
}

fn with_cache<R>(unavailable: R, callback: impl FnOnce(&mut SurfaceCache<Arc<Frame>>) -> R) -> R {
    with_instance(unavailable, |instance| callback(&mut instance.cache))
}

fn with_instance<R>(unavailable: R, callback: impl FnOnce(&mut Instance) -> R) -> R {
    match OWNER.get() {
        Some(owner) => {
            assert_owning_thread(owner);
            INSTANCE.with(|instance| match instance.borrow_mut().as_mut() {
                Some(instance) => callback(instance),
                None => unavailable,
            })
        }
        None => unavailable,
    }
}

fn assert_owning_thread(owner: &ThreadId) {
    assert!(
        *owner == thread::current().id(),
        "The surface cache must only be used by the thread which initialized it!"
    );
}
