//! Allocation statistics counters.
//!
//! All counters use `Relaxed` ordering — they are observational only, not
//! synchronization primitives; the central store's spinlock already
//! provides the ordering guarantees allocation correctness needs. A
//! program built on this crate can run several independent
//! [`crate::SlabAllocator`]s at once (one per object size), so each
//! allocator owns its own `Stats` instance rather than sharing one
//! process-global `static`.

use core::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub(crate) struct Stats {
    slab_creates: AtomicU64,
    slab_retires: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    central_refills: AtomicU64,
    central_flushes: AtomicU64,
    os_alloc_count: AtomicU64,
    os_alloc_bytes: AtomicU64,
}

impl Stats {
    pub fn record_slab_create(&self, count: u64) {
        self.slab_creates.fetch_add(count, Ordering::Relaxed);
        self.os_alloc_count.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_slab_retire(&self) {
        self.slab_retires.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_os_alloc_bytes(&self, bytes: u64) {
        self.os_alloc_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_central_refill(&self) {
        self.central_refills.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_central_flush(&self) {
        self.central_flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            slab_creates: self.slab_creates.load(Ordering::Relaxed),
            slab_retires: self.slab_retires.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            central_refills: self.central_refills.load(Ordering::Relaxed),
            central_flushes: self.central_flushes.load(Ordering::Relaxed),
            os_alloc_count: self.os_alloc_count.load(Ordering::Relaxed),
            os_alloc_bytes: self.os_alloc_bytes.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of one allocator's statistics. Each field is
/// read atomically but the snapshot as a whole is not globally consistent
/// with concurrent activity — sufficient for monitoring, not for exact
/// accounting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub slab_creates: u64,
    pub slab_retires: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub central_refills: u64,
    pub central_flushes: u64,
    pub os_alloc_count: u64,
    pub os_alloc_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = Stats::default();
        stats.record_slab_create(2);
        stats.record_cache_hit();
        stats.record_cache_hit();
        stats.record_cache_miss();
        let snap = stats.snapshot();
        assert_eq!(snap.slab_creates, 2);
        assert_eq!(snap.cache_hits, 2);
        assert_eq!(snap.cache_misses, 1);
    }
}
