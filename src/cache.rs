//! A per-thread handle onto a [`crate::SlabAllocator`]: the lock-free hot
//! path for `alloc`/`free`.
//!
//! Two bounded local stores, mirroring the allocation/return split a
//! caller's tuning (`alloc_store_capacity`/`cache_store_capacity`)
//! describes:
//! - `alloc_store` (capacity `alloc_store_capacity`) holds batches this
//!   cache draws allocations from; the front (most-recently-used) entry is
//!   always the active one.
//! - `returns_cache` (capacity `cache_store_capacity`) holds batches this
//!   cache has exhausted but keeps around in case a free for one of their
//!   objects arrives soon, avoiding an immediate round trip through the
//!   central store followed by probably re-acquiring the same batch.
//!
//! A hit in either store never touches the central store's lock. On an
//! `alloc_store` miss, [`CentralStore::acquire_batch`] pulls
//! `cache_acquire_amount` fresh batches at once and `cache_release_amount`
//! are pushed back when the store overflows, so the lock is amortized over
//! several batches instead of paid per miss.
//!
//! Freeing an object whose batch neither local store holds falls back to
//! [`crate::slab::Slab::remote_free`] — lock-free, reclaimed into the
//! owning batch whenever that batch is next released to the central store.

use crate::allocator::SlabAllocator;
use crate::batch::Batch;
use crate::error::Error;
use crate::lru::Lru;
use crate::slab::{Slab, SlabId};

/// Identifies one exact batch: a `slab_id` alone is ambiguous since every
/// slab holds `batch_per_slab` distinct batches.
type BatchKey = (SlabId, usize);

pub struct Cache<'a> {
    allocator: &'a SlabAllocator,
    slab_obj_mask: usize,
    slab_offset: usize,
    batch_bytes: usize,
    alloc_store: Lru<BatchKey, *mut Batch>,
    returns_cache: Lru<BatchKey, *mut Batch>,
}

impl<'a> Cache<'a> {
    pub(crate) fn new(allocator: &'a SlabAllocator) -> Self {
        let derived = allocator.derived();
        Self {
            allocator,
            slab_obj_mask: derived.slab_obj_mask,
            slab_offset: derived.slab_offset,
            batch_bytes: derived.batch_capacity as usize * derived.obj_padded_size,
            alloc_store: Lru::new(derived.alloc_store_capacity as usize),
            returns_cache: Lru::new(derived.cache_store_capacity as usize),
        }
    }

    /// Recovers the exact `(slab_id, batch_index)` identity `obj` was
    /// carved from.
    ///
    /// # Safety
    /// `obj` must have been allocated from a slab built with this cache's
    /// `slab_obj_mask`/`slab_offset`/`batch_bytes`.
    unsafe fn batch_key_of(&self, obj: *const u8) -> BatchKey {
        unsafe {
            let slab_id = Slab::id_from_obj(obj, self.slab_obj_mask);
            let batch_index = Slab::batch_index_from_obj(obj, self.slab_obj_mask, self.slab_offset, self.batch_bytes);
            (slab_id, batch_index)
        }
    }

    /// Returns one object, or an error if the central store failed to map
    /// a fresh slab.
    pub fn alloc(&mut self) -> Result<*mut u8, Error> {
        loop {
            if let Some(&mut (_, batch)) = self.alloc_store.front_mut() {
                let obj = unsafe { (*batch).alloc_one() };
                if !obj.is_null() {
                    self.allocator.central().record_cache_hit();
                    return Ok(obj);
                }
                // Exhausted: move it to returns_cache instead of releasing
                // it outright — a free for one of its objects may still be
                // on its way back from another thread via the remote path,
                // or from this thread if an object escaped before freeing.
                let (key, exhausted) = self.alloc_store.pop_front().expect("front_mut just returned Some");
                if let Some((_, evicted)) = self.returns_cache.insert(key, exhausted) {
                    self.allocator.central().release_batch(evicted);
                }
                continue;
            }
            self.allocator.central().record_cache_miss();
            self.refill()?;
        }
    }

    /// Returns `obj` to whichever batch owns it — locally if either of
    /// this cache's stores holds the exact batch it was carved from,
    /// remotely (lock-free) otherwise.
    pub fn free(&mut self, obj: *mut u8) {
        let key = unsafe { self.batch_key_of(obj) };
        if let Some(&mut batch) = self.alloc_store.access(&key) {
            unsafe { (*batch).free_one(obj) };
            return;
        }
        if let Some(&mut batch) = self.returns_cache.access(&key) {
            unsafe { (*batch).free_one(obj) };
            return;
        }
        unsafe { Slab::remote_free(obj, self.slab_obj_mask) };
    }

    /// Pulls `cache_acquire_amount` batches from the central store into
    /// `alloc_store`, making room first by releasing `cache_release_amount`
    /// of its least-recently-used entries if it's already full.
    fn refill(&mut self) -> Result<(), Error> {
        let derived = self.allocator.derived();
        let acquire_amount = derived.cache_acquire_amount;
        let release_amount = derived.cache_release_amount;
        for _ in 0..acquire_amount {
            if self.alloc_store.is_full() {
                for _ in 0..release_amount {
                    match self.alloc_store.pop_lru() {
                        Some((_, evicted)) => self.allocator.central().release_batch(evicted),
                        None => break,
                    }
                }
            }
            let batch = self.allocator.central().acquire_batch()?;
            let key = unsafe { ((*batch).slab_id, (*batch).batch_index) };
            if let Some((_, evicted)) = self.alloc_store.insert(key, batch) {
                self.allocator.central().release_batch(evicted);
            }
        }
        Ok(())
    }
}

impl Drop for Cache<'_> {
    /// Flushes every batch held in either local store back to the central
    /// store, so a torn-down thread never leaks capacity other threads
    /// could have used.
    fn drop(&mut self) {
        while let Some((_, batch)) = self.alloc_store.pop_front() {
            self.allocator.central().release_batch(batch);
        }
        while let Some((_, batch)) = self.returns_cache.pop_front() {
            self.allocator.central().release_batch(batch);
        }
    }
}
