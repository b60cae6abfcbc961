//! Surface Cache is a budget constrained cache for rendered image surfaces.
//!
//! Decoding or rasterizing an image is expensive, therefore the results (surfaces) are kept
//! around so that they can be drawn again and again. However, memory is limited and images come
//! and go. Therefore the cache enforces a fixed budget (evicting the most expensive surfaces if
//! required), drops surfaces which haven't been used for a while and permits to discard all
//! surfaces of an image at once.
//!
//! # Parts
//!
//! * [cost](cost): Sizes and the cost model (4 bytes per pixel).
//! * [keys](keys): Identifies images and the variants rendered for them.
//! * [surface](surface): The [Surface](surface::Surface) abstraction and the purgeable
//!   [Frame](surface::Frame).
//! * [cache](cache): The actual [SurfaceCache](cache::SurfaceCache). This can be embedded into
//!   any component which needs a private cache.
//! * [global](global): The process wide instance used by the image library along with its
//!   maintenance loop.
//! * [pressure](pressure): Permits the platform to signal memory pressure from any thread.
//! * [config](config): Determines the budget and expiration window.
//!
//! # Example
//!
//! ```no_run
//! # use surface_cache::config::Settings;
//! # use surface_cache::global;
//! # use std::time::Duration;
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     surface_cache::init_logging();
//!
//!     let settings = Settings::load("config/settings.yml").await.unwrap();
//!     global::initialize_with_settings(&settings, 8 * 1024 * 1024 * 1024);
//!
//!     // Run the expiration sweeps on this very thread...
//!     let local = tokio::task::LocalSet::new();
//!     local.run_until(async {
//!         let _ = tokio::task::spawn_local(global::maintain(Duration::from_secs(1)));
//!
//!         // Render, insert and lookup surfaces here...
//!     }).await;
//!
//!     global::shutdown();
//! }
//! ```
#![deny(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_results
)]
use simplelog::{format_description, ConfigBuilder, LevelFilter, SimpleLogger};
use std::sync::Once;

pub mod cache;
pub mod config;
pub mod cost;
pub mod fmt;
pub mod global;
pub mod keys;
pub mod pressure;
pub mod surface;

/// Contains the version of the surface cache.
pub const SURFACE_CACHE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initializes the logging system.
///
/// This can safely be called several times, only the first invocation has an effect.
pub fn init_logging() {
    static INIT_LOGGING: Once = Once::new();

    INIT_LOGGING.call_once(|| {
        if let Err(error) = SimpleLogger::init(
            LevelFilter::Debug,
            ConfigBuilder::new()
                .set_time_format_custom(format_description!(
                    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]"
                ))
                .set_thread_level(LevelFilter::Trace)
                .set_target_level(LevelFilter::Error)
                .build(),
        ) {
            panic!("Failed to initialize logging system: {}", error);
        }
    });
}

#[cfg(test)]
mod testing {
    use std::sync::Mutex;

    lazy_static::lazy_static! {
        /// Provides a global lock which has to be acquired if a test operates on shared
        /// resources. These are the mocked clock (which is advanced by expiration tests) and
        /// files in the working directory.
        pub static ref SHARED_TEST_RESOURCES: Mutex<()> = Mutex::new(());
    }

    /// Executes async code within a single threaded tokio runtime.
    pub fn test_async<F: std::future::Future>(future: F) {
        use tokio::runtime;

        let rt = runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let _ = rt.block_on(future);
    }
}
