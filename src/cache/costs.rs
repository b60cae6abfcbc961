//! Keeps all cached surfaces ordered by their cost.
//!
//! Whenever the budget is exhausted, the cache sheds the most expensive surface first, as this
//! minimizes the number of evictions required to make room. Ties are broken by the identity of
//! the surface, which is handed out in ascending order - so among equally expensive surfaces, the
//! most recently inserted one is evicted first.
use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::cache::SurfaceLocator;
use crate::cost::Cost;

/// Uniquely identifies a cached surface for the lifetime of a cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct SurfaceId(pub(crate) u64);

/// Represents a surface within the cost index.
///
/// Note that only the cost and the id participate in comparisons. The locator is carried along
/// so that an eviction victim can be found in the per-image caches.
#[derive(Clone, Copy, Debug)]
pub(crate) struct CostEntry {
    pub(crate) cost: Cost,
    pub(crate) id: SurfaceId,
    pub(crate) locator: SurfaceLocator,
}

impl PartialEq for CostEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost && self.id == other.id
    }
}

impl Eq for CostEntry {}

impl PartialOrd for CostEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CostEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cost
            .cmp(&other.cost)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Orders all live surfaces by (cost, id).
#[derive(Default)]
pub(crate) struct CostIndex {
    entries: BTreeSet<CostEntry>,
}

impl CostIndex {
    pub(crate) fn insert(&mut self, entry: CostEntry) {
        let inserted = self.entries.insert(entry);
        debug_assert!(inserted, "A surface has been tracked twice!");
    }

    /// Removes the given entry and reports whether it was present.
    pub(crate) fn remove(&mut self, entry: &CostEntry) -> bool {
        self.entries.remove(entry)
    }

    /// Returns the most expensive surface.
    pub(crate) fn largest(&self) -> Option<&CostEntry> {
        self.entries.iter().next_back()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn total_cost(&self) -> Cost {
        self.entries.iter().map(|entry| entry.cost).sum()
    }
}
