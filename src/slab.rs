//! A single OS-backed slab: a naturally size-aligned virtual memory region
//! carved into a fixed number of batches of objects.
//!
//! Natural alignment means `addr & slab_obj_mask` recovers the slab header
//! from any live object pointer with zero per-object metadata — the same
//! trick the original `sa_aligned_mmap` exists for, generalized in
//! [`crate::platform::page_alloc_aligned`]. The header additionally carries
//! a lock-free stack of "remote frees" — objects freed by a thread that
//! doesn't currently hold the batch they belong to — so the hot `free`
//! path never has to take the central store's lock.

use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

use crate::batch::Batch;
use crate::config::DerivedConfig;
use crate::error::{Error, system};
use crate::layout::MemoryBlock;
use crate::platform;
use crate::rbtree::Node;

/// Monotonically increasing identity for a slab, used as a tiebreaker key
/// and for log/stat correlation. Not derived from the slab's address so it
/// stays stable across any future compaction scheme.
pub type SlabId = u64;

/// Lives at the base of every slab's mmap'd region. Recovered from any
/// object pointer via `addr & slab_obj_mask`.
#[repr(C, align(8))]
pub(crate) struct SlabHeader {
    id: SlabId,
    /// Treiber stack of objects freed by a cache that wasn't their
    /// current owner, threaded through their own first pointer-sized
    /// bytes exactly like `crate::free_list::FreeList`.
    remote_frees: AtomicPtr<u8>,
}

pub(crate) const SLAB_HEADER_SIZE: usize = core::mem::size_of::<SlabHeader>();
pub(crate) const SLAB_HEADER_ALIGN: usize = core::mem::align_of::<SlabHeader>();

unsafe fn header_of(base: *mut u8) -> *mut SlabHeader {
    base as *mut SlabHeader
}

/// Recovers this object's slab header via address masking.
///
/// # Safety
/// `obj` must point inside a slab created by this module and `slab_obj_mask`
/// must be the mask that allocator was configured with.
pub(crate) unsafe fn header_from_obj(obj: *const u8, slab_obj_mask: usize) -> *mut SlabHeader {
    ((obj as usize) & slab_obj_mask) as *mut SlabHeader
}

/// Pushes `obj` onto its slab's remote-free stack. Lock-free; safe to call
/// from any thread regardless of who currently owns the batch `obj`
/// belongs to.
///
/// # Safety
/// `obj` must be a live object previously handed out by this slab, not
/// already linked into any free list.
pub(crate) unsafe fn push_remote_free(header: *mut SlabHeader, obj: *mut u8) {
    unsafe {
        loop {
            let old = (*header).remote_frees.load(Ordering::Relaxed);
            *(obj as *mut *mut u8) = old;
            if (*header)
                .remote_frees
                .compare_exchange_weak(old, obj, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }
}

/// Atomically takes every pointer currently on the remote-free stack.
///
/// # Safety
/// Caller must own the chain it gets back (e.g. eventually push back any
/// entries it doesn't consume via `splice_remote_frees_back`).
unsafe fn take_remote_frees(header: *mut SlabHeader) -> *mut u8 {
    unsafe { (*header).remote_frees.swap(ptr::null_mut(), Ordering::Acquire) }
}

/// Splices the chain `head..=tail` back onto the remote-free stack,
/// preserving whatever was pushed concurrently while we were elsewhere.
///
/// # Safety
/// `head..=tail` must be a valid singly-linked chain of live objects with
/// `tail`'s next-slot not yet overwritten.
unsafe fn splice_remote_frees_back(header: *mut SlabHeader, head: *mut u8, tail: *mut u8) {
    unsafe {
        loop {
            let old = (*header).remote_frees.load(Ordering::Relaxed);
            *(tail as *mut *mut u8) = old;
            if (*header)
                .remote_frees
                .compare_exchange_weak(old, head, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }
}

/// An OS-backed, naturally aligned region of memory holding this slab's
/// objects. Owns the mapping; dropping it unmaps the region.
pub struct Slab {
    base: *mut u8,
    region_size: usize,
    slab_offset: usize,
    batch_bytes: usize,
    batches: Vec<*mut Batch>,
    full_batches: u32,
}

impl Slab {
    /// Maps a fresh slab region and carves it into `derived.batch_per_slab`
    /// batches, each starting fully populated (every object free).
    ///
    /// # Safety
    /// `derived` must be the `DerivedConfig` this allocator was built with.
    pub unsafe fn create(derived: &DerivedConfig, id: SlabId) -> Result<Self, Error> {
        let base = unsafe { platform::page_alloc_aligned(derived.slab_size, derived.slab_size) };
        if base.is_null() {
            return Err(system("failed to map slab region"));
        }
        unsafe {
            header_of(base).write(SlabHeader {
                id,
                remote_frees: AtomicPtr::new(ptr::null_mut()),
            });
        }

        let batch_bytes = derived.batch_capacity as usize * derived.obj_padded_size;
        let mut batches = Vec::with_capacity(derived.batch_per_slab);
        for i in 0..derived.batch_per_slab {
            let offset = derived.slab_offset + i * batch_bytes;
            // SAFETY: offset + batch_bytes <= slab_size by construction of
            // batch_per_slab in `DerivedConfig::derive`.
            let obj_area = unsafe { base.add(offset) };
            let block =
                unsafe { MemoryBlock::new(obj_area, derived.obj_padded_size, derived.batch_capacity as usize) };
            let batch = Batch::new_boxed(id, i, block, derived.batch_capacity);
            batches.push(batch);
        }

        Ok(Self {
            base,
            region_size: derived.slab_size,
            slab_offset: derived.slab_offset,
            batch_bytes,
            batches,
            full_batches: 0,
        })
    }

    pub fn id(&self) -> SlabId {
        unsafe { (*header_of(self.base)).id }
    }

    pub fn batches(&self) -> &[*mut Batch] {
        &self.batches
    }

    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    fn batch_index_of(&self, obj: *const u8) -> usize {
        let rel = obj as usize - self.base as usize - self.slab_offset;
        rel / self.batch_bytes
    }

    /// Recovers which batch within its slab `obj` belongs to, from raw
    /// address arithmetic alone — usable without a `&Slab` reference, e.g.
    /// from a thread's [`crate::cache::Cache`], which only carries scalar
    /// geometry pulled from a `DerivedConfig` rather than a `Slab` handle.
    ///
    /// # Safety
    /// `obj` must point inside a slab region created by this module, and
    /// `slab_obj_mask`/`slab_offset`/`batch_bytes` must match the
    /// allocator's `DerivedConfig`.
    pub(crate) unsafe fn batch_index_from_obj(
        obj: *const u8,
        slab_obj_mask: usize,
        slab_offset: usize,
        batch_bytes: usize,
    ) -> usize {
        let base = (obj as usize) & slab_obj_mask;
        (obj as usize - base - slab_offset) / batch_bytes
    }

    /// Merges every pointer on this slab's remote-free stack that belongs
    /// to `batch` into `batch`'s own free list, leaving frees destined for
    /// this slab's other (still checked-out) batches on the stack.
    ///
    /// # Safety
    /// `batch` must be one of `self.batches()` and the caller must hold
    /// exclusive access to it (i.e. the central store's lock, with `batch`
    /// not concurrently reachable as anyone's active batch).
    pub unsafe fn reclaim_remote_frees(&self, batch: *mut Batch, batch_index: usize) {
        unsafe {
            let mut cur = take_remote_frees(header_of(self.base));
            let mut leftover_head: *mut u8 = ptr::null_mut();
            let mut leftover_tail: *mut u8 = ptr::null_mut();
            while !cur.is_null() {
                let next = *(cur as *mut *mut u8);
                if self.batch_index_of(cur) == batch_index {
                    (*batch).free_one(cur);
                } else {
                    *(cur as *mut *mut u8) = leftover_head;
                    leftover_head = cur;
                    if leftover_tail.is_null() {
                        leftover_tail = cur;
                    }
                }
                cur = next;
            }
            if !leftover_head.is_null() {
                splice_remote_frees_back(header_of(self.base), leftover_head, leftover_tail);
            }
        }
    }

    /// Records that one more of this slab's batches became completely
    /// free (every object returned). Returns `true` once every batch
    /// carved from this slab is free, meaning the slab is fully drained
    /// and ready to be unmapped.
    pub fn note_batch_fully_freed(&mut self) -> bool {
        self.full_batches += 1;
        debug_assert!(self.full_batches as usize <= self.batches.len());
        self.full_batches as usize == self.batches.len()
    }

    /// Undoes `note_batch_fully_freed` when a fully-free batch is handed
    /// back out for allocation before the slab could be retired.
    pub fn note_batch_reused(&mut self) {
        debug_assert!(self.full_batches > 0);
        self.full_batches -= 1;
    }

    /// Recovers the slab id embedded at the base of the slab containing
    /// `obj`, given the allocator's `slab_obj_mask`.
    ///
    /// # Safety
    /// `obj` must point inside a slab region created by this module with
    /// the same `slab_obj_mask`.
    pub unsafe fn id_from_obj(obj: *const u8, slab_obj_mask: usize) -> SlabId {
        unsafe { (*header_from_obj(obj, slab_obj_mask)).id }
    }

    /// Pushes `obj` onto the remote-free stack of the slab it belongs to.
    ///
    /// # Safety
    /// `obj` must be a live object previously allocated from a slab using
    /// this `slab_obj_mask`.
    pub unsafe fn remote_free(obj: *mut u8, slab_obj_mask: usize) {
        unsafe { push_remote_free(header_from_obj(obj, slab_obj_mask), obj) };
    }
}

impl Drop for Slab {
    fn drop(&mut self) {
        for &batch in &self.batches {
            // SAFETY: every pointer in `batches` was produced by
            // `Batch::new_boxed` and is reclaimed exactly once, here.
            unsafe { Batch::drop_boxed(batch) };
        }
        unsafe {
            platform::page_dealloc_aligned(self.base, self.region_size, self.region_size);
        }
    }
}

unsafe impl Send for Slab {}

/// Recovers a `*mut Batch` from the `*mut Node<u32>` an intrusive
/// [`crate::rbtree::Tree`] hands back. Valid because `Batch::node` is the
/// struct's first field.
pub(crate) fn batch_from_node(node: *mut Node<u32>) -> *mut Batch {
    node as *mut Batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn derived(obj_size: usize) -> DerivedConfig {
        DerivedConfig::derive(&Config::new(obj_size, 8), SLAB_HEADER_SIZE, SLAB_HEADER_ALIGN, platform::page_size())
            .unwrap()
    }

    #[test]
    fn create_carves_expected_batch_count() {
        let d = derived(64);
        let slab = unsafe { Slab::create(&d, 7).unwrap() };
        assert_eq!(slab.batch_count(), d.batch_per_slab);
        assert_eq!(slab.id(), 7);
    }

    #[test]
    fn obj_pointer_masks_back_to_slab_id() {
        let d = derived(64);
        let slab = unsafe { Slab::create(&d, 99).unwrap() };
        let batch = slab.batches()[0];
        let obj = unsafe { (*batch).alloc_one() };
        assert!(!obj.is_null());
        let recovered = unsafe { Slab::id_from_obj(obj, d.slab_obj_mask) };
        assert_eq!(recovered, 99);
    }

    #[test]
    fn drain_tracking_fires_once_all_batches_free() {
        let d = derived(64);
        let mut slab = unsafe { Slab::create(&d, 1).unwrap() };
        let n = slab.batch_count();
        for i in 0..n - 1 {
            let _ = i;
            assert!(!slab.note_batch_fully_freed());
        }
        assert!(slab.note_batch_fully_freed());
    }

    #[test]
    fn remote_free_is_reclaimed_into_owning_batch() {
        let d = derived(64);
        let slab = unsafe { Slab::create(&d, 5).unwrap() };
        let batch0 = slab.batches()[0];
        let obj = unsafe { (*batch0).alloc_one() };
        assert_eq!(unsafe { (*batch0).free_count() }, d.batch_capacity - 1);

        unsafe { Slab::remote_free(obj, d.slab_obj_mask) };
        // Not yet visible to the batch itself.
        assert_eq!(unsafe { (*batch0).free_count() }, d.batch_capacity - 1);

        unsafe { slab.reclaim_remote_frees(batch0, 0) };
        assert_eq!(unsafe { (*batch0).free_count() }, d.batch_capacity);
    }
}
