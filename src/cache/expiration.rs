//! Provides a generational tracker which detects surfaces which haven't been used for a while.
//!
//! Instead of keeping exact timestamps (or an exact LRU order), each surface is placed in one of
//! a small number of generations. Touching a surface moves it into the newest generation. Every
//! **window / GENERATIONS** a sweep runs, which expires all surfaces of the oldest generation and
//! then lets all other generations age by one step. Therefore a surface expires somewhere between
//! **window / GENERATIONS** and **window** after it was last used.
//!
//! Internally the generations form a ring, so that aging only needs to move the index of the
//! newest generation. Therefore, the generation stored in an [ExpirationState](ExpirationState)
//! remains valid while the tracker ages.
use std::time::Duration;

#[cfg(test)]
use mock_instant::thread_local::Instant;
#[cfg(not(test))]
use std::time::Instant;

use linked_hash_map::LinkedHashMap;

use crate::cache::costs::SurfaceId;
use crate::cache::SurfaceLocator;

/// Contains the number of generations being used.
///
/// Two generations are sufficient: one for surfaces which were recently used and one for
/// surfaces which are about to expire.
pub(crate) const GENERATIONS: usize = 2;

/// Records in which generation a surface currently lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ExpirationState {
    generation: usize,
}

pub(crate) struct ExpirationTracker {
    generations: [LinkedHashMap<SurfaceId, SurfaceLocator>; GENERATIONS],
    newest: usize,
    period: Duration,
    next_sweep: Option<Instant>,
}

impl ExpirationTracker {
    /// Creates a tracker which expires surfaces unused for roughly the given window.
    pub(crate) fn new(window: Duration) -> Self {
        ExpirationTracker {
            generations: Default::default(),
            newest: 0,
            period: window / GENERATIONS as u32,
            next_sweep: None,
        }
    }

    /// Returns the interval in which sweeps are performed.
    pub(crate) fn period(&self) -> Duration {
        self.period
    }

    /// Starts tracking the given surface as part of the newest generation.
    ///
    /// If the tracker was idle, this also schedules the next sweep.
    pub(crate) fn add(&mut self, id: SurfaceId, locator: SurfaceLocator) -> ExpirationState {
        let _ = self.generations[self.newest].insert(id, locator);
        if self.next_sweep.is_none() {
            self.next_sweep = Some(Instant::now() + self.period);
        }

        ExpirationState {
            generation: self.newest,
        }
    }

    /// Stops tracking the given surface and reports whether it was tracked.
    ///
    /// Once the last surface is gone, no further sweeps are scheduled.
    pub(crate) fn remove(&mut self, id: SurfaceId, state: ExpirationState) -> bool {
        let removed = self.generations[state.generation].remove(&id).is_some();
        if self.is_empty() {
            self.next_sweep = None;
        }

        removed
    }

    /// Moves the given surface into the newest generation.
    pub(crate) fn mark_used(&mut self, id: SurfaceId, state: &mut ExpirationState) {
        if state.generation == self.newest {
            return;
        }

        if let Some(locator) = self.generations[state.generation].remove(&id) {
            let _ = self.generations[self.newest].insert(id, locator);
            state.generation = self.newest;
        }
    }

    /// Determines if a sweep is due.
    pub(crate) fn is_sweep_due(&self) -> bool {
        match self.next_sweep {
            Some(due) => due <= Instant::now(),
            None => false,
        }
    }

    /// Lists all surfaces which will expire with the next sweep.
    pub(crate) fn expiring(&self) -> Vec<SurfaceLocator> {
        self.generations[self.oldest()].values().copied().collect()
    }

    /// Lets all generations age by one step.
    ///
    /// The caller has to remove all [expiring](ExpirationTracker::expiring) surfaces before
    /// invoking this, as the oldest generation is recycled as the new newest one.
    pub(crate) fn age_one_generation(&mut self) {
        let oldest = self.oldest();
        debug_assert!(
            self.generations[oldest].is_empty(),
            "Expiring surfaces have not been removed before aging!"
        );
        self.newest = oldest;

        // Sweeps are scheduled relative to the previous one. If we're lagging behind by more
        // than a period, we restart from now so that freshly used surfaces don't expire at once.
        self.next_sweep = if self.is_empty() {
            None
        } else {
            let now = Instant::now();
            let next = self
                .next_sweep
                .map_or(now + self.period, |due| due + self.period);
            Some(if next > now { next } else { now + self.period })
        };
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.generations.iter().map(|generation| generation.len()).sum()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.generations
            .iter()
            .all(|generation| generation.is_empty())
    }

    fn oldest(&self) -> usize {
        (self.newest + 1) % GENERATIONS
    }
}
