//! Permits the platform to signal memory pressure.
//!
//! The process wide cache (see [global](crate::global)) can only be accessed from its owning
//! thread. However, low memory notifications usually arrive on some arbitrary thread. Therefore
//! [notify](notify) only broadcasts the signal and the cache picks it up (and discards all of its
//! surfaces) the next time its owning thread performs maintenance via
//! [tick](crate::global::tick).
//!
//! # Example
//!
//! ```
//! # use surface_cache::pressure::{self, MemoryPressure};
//! let mut receiver = pressure::subscribe();
//!
//! std::thread::spawn(|| pressure::notify(MemoryPressure::Critical)).join().unwrap();
//!
//! assert_eq!(pressure::pending(&mut receiver), Some(MemoryPressure::Critical));
//! assert_eq!(pressure::pending(&mut receiver), None);
//! ```
use std::fmt;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

/// Describes how severe a memory pressure signal is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum MemoryPressure {
    /// The system is running low on memory.
    Moderate,
    /// The system is about to run out of memory.
    Critical,
}

impl fmt::Display for MemoryPressure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryPressure::Moderate => write!(f, "moderate"),
            MemoryPressure::Critical => write!(f, "critical"),
        }
    }
}

/// Receives memory pressure signals.
pub type PressureReceiver = broadcast::Receiver<MemoryPressure>;

lazy_static::lazy_static! {
    static ref PRESSURE: broadcast::Sender<MemoryPressure> = broadcast::channel(16).0;
}

/// Signals memory pressure to all subscribers.
///
/// This can be invoked from any thread. If nobody is subscribed, the signal is dropped.
pub fn notify(pressure: MemoryPressure) {
    log::info!("Received a {} memory pressure signal.", pressure);
    let _ = PRESSURE.send(pressure);
}

/// Subscribes to memory pressure signals sent after this call.
pub fn subscribe() -> PressureReceiver {
    PRESSURE.subscribe()
}

/// Drains all pending signals of the given receiver and returns the most severe one.
///
/// If the receiver fell behind and missed some signals, these are treated as critical.
pub fn pending(receiver: &mut PressureReceiver) -> Option<MemoryPressure> {
    let mut result = None;
    loop {
        let pressure = match receiver.try_recv() {
            Ok(pressure) => pressure,
            Err(TryRecvError::Lagged(_)) => MemoryPressure::Critical,
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return result,
        };
        result = result.max(Some(pressure));
    }
}
