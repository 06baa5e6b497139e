//! Per-view cache stores and cache metrics.
//!
//! Each keyed view owns one [`CacheStore`]. Entries are immutable once
//! written and never expire within the life of the owning source; there is
//! no deletion API. Writes are first-writer-wins so that commits from a
//! view's own dispatch and primes arriving from sibling dispatches commute
//! regardless of completion order.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// A committed cache record for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEntry<V> {
    /// A value was resolved for the key.
    Resolved(V),
    /// The source confirmed no value exists for the key.
    ///
    /// Distinct from "not yet queried": a negative entry means a dispatch
    /// asked for this key and the source returned nothing.
    Negative,
}

/// Cache store for one keyed view.
///
/// Uses `DashMap` so that lookups from load callers, commits from the
/// view's own dispatch task, and primes from sibling dispatch tasks are
/// each atomic per entry without a store-wide lock.
pub struct CacheStore<K, V> {
    entries: DashMap<K, CacheEntry<V>>,
}

impl<K, V> CacheStore<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Returns a clone of the committed entry for `key`, if any.
    pub fn get(&self, key: &K) -> Option<CacheEntry<V>> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Commits a resolved value for `key`.
    ///
    /// Returns `true` if the entry was written, `false` if the key already
    /// had an entry (first writer wins; the call is then a no-op).
    pub fn put(&self, key: K, value: V) -> bool {
        use dashmap::mapref::entry::Entry;
        match self.entries.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(CacheEntry::Resolved(value));
                true
            }
        }
    }

    /// Commits a negative entry for `key`.
    ///
    /// Returns `true` if the entry was written, `false` if the key already
    /// had an entry.
    pub fn put_negative(&self, key: K) -> bool {
        use dashmap::mapref::entry::Entry;
        match self.entries.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(CacheEntry::Negative);
                true
            }
        }
    }

    /// Number of committed entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store has no committed entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> Default for CacheStore<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Cache performance counters for one view.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    /// Loads answered from the cache without joining a batch window.
    pub hits: AtomicU64,
    /// Loads that missed the cache and joined a batch window.
    pub misses: AtomicU64,
    /// Entries committed by priming from sibling dispatches.
    pub primes: AtomicU64,
}

impl CacheMetrics {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_primes(&self, committed: u64) {
        self.primes.fetch_add(committed, Ordering::Relaxed);
    }

    /// Returns a snapshot of the current counters.
    pub fn snapshot(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            primes: self.primes.load(Ordering::Relaxed),
        }
    }

    /// Returns the cache hit ratio (hits / (hits + misses)).
    /// Returns 0.0 if no loads have been recorded.
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// A point-in-time snapshot of cache metrics.
#[derive(Debug, Clone, Copy)]
pub struct CacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub primes: u64,
}
