//! The mutex-guarded cold path (C6's central half): an order-statistic
//! tree of batches with spare capacity, and the slabs those batches were
//! carved from, shared across every thread's [`crate::cache::Cache`].

use std::collections::HashMap;

use crate::batch::Batch;
use crate::config::{Config, DerivedConfig};
use crate::error::{Error, empty};
use crate::rbtree::Tree;
use crate::slab::{Slab, SlabId, batch_from_node};
use crate::stats::Stats;
use crate::sync::SpinMutex;

struct Inner {
    derived: DerivedConfig,
    free_batches: Tree<u32>,
    slabs: HashMap<SlabId, Slab>,
    next_slab_id: SlabId,
}

impl Inner {
    fn create_slabs(&mut self, count: u32) -> Result<(), Error> {
        for _ in 0..count {
            let id = self.next_slab_id;
            self.next_slab_id += 1;
            let slab = unsafe { Slab::create(&self.derived, id) }?;
            for &batch in slab.batches() {
                unsafe { self.free_batches.insert(&mut (*batch).node) };
            }
            self.slabs.insert(id, slab);
            log::debug!("mapped new slab id={id}");
        }
        Ok(())
    }

    /// Tears a slab down once every batch carved from it is free again,
    /// unlinking its batches (already free, already marked `counted_full`)
    /// from the tree first.
    fn retire_if_drained(&mut self, slab_id: SlabId) -> bool {
        let drained = match self.slabs.get_mut(&slab_id) {
            Some(slab) => slab.note_batch_fully_freed(),
            None => return false,
        };
        if !drained {
            return false;
        }
        if let Some(slab) = self.slabs.remove(&slab_id) {
            for &batch in slab.batches() {
                unsafe { self.free_batches.remove_node(&mut (*batch).node) };
            }
            log::debug!("slab {slab_id} fully drained, releasing region");
            drop(slab);
            return true;
        }
        false
    }
}

/// Owns every slab and free batch for one object size. Threads never talk
/// to this directly — each holds a [`crate::cache::Cache`] that only
/// crosses into here on a local cache miss or overflow.
pub struct CentralStore {
    inner: SpinMutex<Inner>,
    stats: Stats,
}

impl CentralStore {
    pub fn new(config: &Config, derived: DerivedConfig) -> Self {
        let _ = config;
        Self {
            inner: SpinMutex::new(Inner {
                derived,
                free_batches: Tree::new(),
                slabs: HashMap::new(),
                next_slab_id: 0,
            }),
            stats: Stats::default(),
        }
    }

    pub fn derived(&self) -> DerivedConfig {
        self.inner.lock().derived
    }

    pub fn stats(&self) -> crate::stats::Snapshot {
        self.stats.snapshot()
    }

    pub(crate) fn record_cache_hit(&self) {
        self.stats.record_cache_hit();
    }

    pub(crate) fn record_cache_miss(&self) {
        self.stats.record_cache_miss();
    }

    /// Hands out the batch with the most free capacity, refilling from
    /// fresh slabs if none is available.
    pub fn acquire_batch(&self) -> Result<*mut Batch, Error> {
        let mut inner = self.inner.lock();
        if inner.free_batches.is_empty() {
            let slab_acquire_count = inner.derived.slab_acquire_count;
            let slab_size = inner.derived.slab_size;
            inner.create_slabs(slab_acquire_count)?;
            self.stats.record_slab_create(slab_acquire_count as u64);
            self.stats
                .record_os_alloc_bytes(slab_acquire_count as u64 * slab_size as u64);
        }
        let node = unsafe { inner.free_batches.take_max() };
        if node.is_null() {
            return Err(empty("central store has no free batches after refill"));
        }
        let batch = batch_from_node(node);
        let slab_id = unsafe { (*batch).slab_id };
        if unsafe { (*batch).counted_full } {
            unsafe { (*batch).counted_full = false };
            if let Some(slab) = inner.slabs.get_mut(&slab_id) {
                slab.note_batch_reused();
            }
        }
        self.stats.record_central_refill();
        Ok(batch)
    }

    /// Returns a batch to the central store, first reclaiming any objects
    /// other threads freed into it remotely while this cache held it
    /// exclusively.
    pub fn release_batch(&self, batch: *mut Batch) {
        let mut inner = self.inner.lock();
        let slab_id = unsafe { (*batch).slab_id };
        if let Some(slab) = inner.slabs.get(&slab_id) {
            if let Some(idx) = slab.batches().iter().position(|&b| b == batch) {
                unsafe { slab.reclaim_remote_frees(batch, idx) };
            }
        }
        unsafe { (*batch).sync_key() };
        let fully_free = unsafe { (*batch).is_full() };
        if fully_free {
            unsafe { (*batch).counted_full = true };
        }
        unsafe { inner.free_batches.insert(&mut (*batch).node) };
        self.stats.record_central_flush();
        if fully_free && inner.retire_if_drained(slab_id) {
            self.stats.record_slab_retire();
        }
    }

    pub fn slab_count(&self) -> usize {
        self.inner.lock().slabs.len()
    }
}

unsafe impl Send for CentralStore {}
unsafe impl Sync for CentralStore {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn store_with(obj_size: usize, tuning: crate::config::Tuning) -> CentralStore {
        let config = Config::new(obj_size, 8).with_tuning(tuning);
        let derived = DerivedConfig::derive(
            &config,
            crate::slab::SLAB_HEADER_SIZE,
            crate::slab::SLAB_HEADER_ALIGN,
            crate::platform::page_size(),
        )
        .unwrap();
        CentralStore::new(&config, derived)
    }

    fn store(obj_size: usize) -> CentralStore {
        store_with(obj_size, Default::default())
    }

    #[test]
    fn acquire_creates_slab_on_first_use() {
        let store = store(64);
        assert_eq!(store.slab_count(), 0);
        let batch = store.acquire_batch().unwrap();
        assert_eq!(store.slab_count(), 1);
        unsafe {
            assert!((*batch).is_full());
        }
        store.release_batch(batch);
    }

    #[test]
    fn fully_freed_slab_is_retired() {
        // Force a slab that holds exactly one batch, so a single release
        // drains it completely.
        let tuning = crate::config::Tuning {
            batch_capacity: 1,
            slab_acquire_count: 1,
            cache_acquire_amount: 1,
            ..Default::default()
        };
        let store = store_with(4096, tuning);
        let derived = store.derived();
        assert_eq!(derived.batch_per_slab, 1);
        let batch = store.acquire_batch().unwrap();
        assert_eq!(store.slab_count(), 1);
        store.release_batch(batch);
        assert_eq!(store.slab_count(), 0);
    }
}
