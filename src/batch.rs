//! A batch (C6 building block): up to `batch_capacity` free objects
//! carved from one slab, bundled with the intrusive tree node the central
//! store and thread caches use to find it.

use crate::free_list::FreeList;
use crate::layout::MemoryBlock;
use crate::rbtree::Node;
use crate::slab::SlabId;

/// One batch of objects. Heap-allocated independently of the slab's raw
/// object storage — only objects themselves need to be mask-recoverable
/// back to their slab; the bookkeeping struct for a batch is an ordinary
/// Rust allocation.
///
/// `node` must stay the first field: [`crate::slab::batch_from_node`]
/// recovers a `*mut Batch` from the `*mut Node<u32>` a [`crate::rbtree::Tree`]
/// hands back by pointer identity.
#[repr(C)]
pub struct Batch {
    pub(crate) node: Node<u32>,
    pub slab_id: SlabId,
    /// Which of its slab's `batch_per_slab` batches this is. A slab's
    /// batches otherwise look identical from `slab_id` alone, so callers
    /// that need to recover the exact batch an object was carved from
    /// (rather than just its slab) key on `(slab_id, batch_index)`.
    pub batch_index: usize,
    capacity: u32,
    free_list: FreeList,
    /// Whether this batch is currently counted toward its slab's
    /// fully-freed tally. Cleared when the batch is handed back out for
    /// allocation, set when it's released back while completely free.
    pub(crate) counted_full: bool,
}

impl Batch {
    /// Builds a batch already holding every object in `block` as free,
    /// and leaks it onto the heap as a stable `*mut Batch` for the
    /// intrusive structures to reference.
    ///
    /// # Safety
    /// `block` must describe memory this batch exclusively owns for its
    /// lifetime (i.e. a region carved out of one slab and not aliased by
    /// any other batch).
    pub(crate) fn new_boxed(slab_id: SlabId, batch_index: usize, block: MemoryBlock, capacity: u32) -> *mut Batch {
        let mut free_list = FreeList::new();
        let linked = unsafe { free_list.link_memory(&block) };
        debug_assert_eq!(linked, capacity as usize);
        let batch = Batch {
            node: Node::new(capacity),
            slab_id,
            batch_index,
            capacity,
            free_list,
            counted_full: false,
        };
        Box::into_raw(Box::new(batch))
    }

    /// Reclaims a batch produced by `new_boxed`.
    ///
    /// # Safety
    /// `ptr` must have come from `new_boxed` and not already be freed, and
    /// must not be referenced by any tree or cache afterward.
    pub(crate) unsafe fn drop_boxed(ptr: *mut Batch) {
        unsafe { drop(Box::from_raw(ptr)) };
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn free_count(&self) -> u32 {
        self.free_list.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.free_list.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.free_count() == self.capacity
    }

    /// Key this batch is currently ordered under in the central store's
    /// tree. Only meaningful while the batch is linked into a tree; kept
    /// in sync by `alloc_one`/`free_one` so re-inserting after a mutation
    /// always uses an up to date key.
    pub fn key(&self) -> u32 {
        self.node.key
    }

    pub fn sync_key(&mut self) {
        self.node.key = self.free_count();
    }

    /// Pops one free object, or returns null if the batch is exhausted.
    pub fn alloc_one(&mut self) -> *mut u8 {
        self.free_list.pop()
    }

    /// Returns an object to this batch's free list.
    ///
    /// # Safety
    /// `obj` must have been allocated from this exact batch.
    pub unsafe fn free_one(&mut self, obj: *mut u8) {
        unsafe { self.free_list.push(obj) };
    }
}

unsafe impl Send for Batch {}
