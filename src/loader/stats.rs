//! Per-loader counters, updated without taking the loader lock.

use serde::{Deserialize, Serialize};
use std::ops::AddAssign;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    loads: AtomicU64,
    cache_hits: AtomicU64,
    coalesced: AtomicU64,
    batches_dispatched: AtomicU64,
    early_flushes: AtomicU64,
    keys_fetched: AtomicU64,
    fetch_failures: AtomicU64,
    key_failures: AtomicU64,
}

impl StatsRecorder {
    pub(crate) fn record_load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_early_flush(&self) {
        self.early_flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dispatch(&self, keys: usize) {
        self.batches_dispatched.fetch_add(1, Ordering::Relaxed);
        self.keys_fetched.fetch_add(keys as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_key_failures(&self, count: usize) {
        self.key_failures.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> LoaderStats {
        LoaderStats {
            loads: self.loads.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            batches_dispatched: self.batches_dispatched.load(Ordering::Relaxed),
            early_flushes: self.early_flushes.load(Ordering::Relaxed),
            keys_fetched: self.keys_fetched.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            key_failures: self.key_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time counters for one loader
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderStats {
    /// Thunks handed out, cache hits included
    pub loads: u64,
    /// Loads answered from the cache without joining a batch
    pub cache_hits: u64,
    /// Loads that joined a slot already taken by an equal key
    pub coalesced: u64,
    /// Calls made to the fetcher
    pub batches_dispatched: u64,
    /// Batches flushed by `max_batch` before their timer fired
    pub early_flushes: u64,
    /// Keys passed to the fetcher across all batches
    pub keys_fetched: u64,
    /// Batches that failed as a whole
    pub fetch_failures: u64,
    /// Individual keys that failed inside otherwise successful batches
    pub key_failures: u64,
}

impl LoaderStats {
    /// Average keys per fetcher call
    pub fn average_batch_size(&self) -> f64 {
        if self.batches_dispatched == 0 {
            0.0
        } else {
            self.keys_fetched as f64 / self.batches_dispatched as f64
        }
    }

    /// Share of loads that avoided their own fetch slot
    pub fn savings_ratio(&self) -> f64 {
        if self.loads == 0 {
            0.0
        } else {
            (self.cache_hits + self.coalesced) as f64 / self.loads as f64
        }
    }
}

impl AddAssign for LoaderStats {
    fn add_assign(&mut self, other: Self) {
        self.loads += other.loads;
        self.cache_hits += other.cache_hits;
        self.coalesced += other.coalesced;
        self.batches_dispatched += other.batches_dispatched;
        self.early_flushes += other.early_flushes;
        self.keys_fetched += other.keys_fetched;
        self.fetch_failures += other.fetch_failures;
        self.key_failures += other.key_failures;
    }
}
