//! The owning handle for one object size's slabs: [`SlabAllocator`].
//!
//! An explicit, size-specific handle a caller constructs, shares across
//! threads behind a reference, and drops when done. Per-thread
//! [`crate::cache::Cache`] handles borrow it for their own lifetime, which
//! lets the borrow checker enforce "every cache is dropped before the
//! allocator is" instead of needing runtime bookkeeping for it.

use crate::cache::Cache;
use crate::central_store::CentralStore;
use crate::config::{Config, DerivedConfig};
use crate::error::Error;
use crate::slab::{SLAB_HEADER_ALIGN, SLAB_HEADER_SIZE};
use crate::stats::Snapshot;

/// A thread-safe slab allocator for one fixed object size.
///
/// Create one per distinct `(obj_size, obj_align)` pair your program
/// needs. Obtain a per-thread [`Cache`] with [`attach`](Self::attach) for
/// the actual hot-path `alloc`/`free` calls.
pub struct SlabAllocator {
    central: CentralStore,
    derived: DerivedConfig,
}

impl core::fmt::Debug for SlabAllocator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SlabAllocator").finish_non_exhaustive()
    }
}

impl SlabAllocator {
    /// Validates `config` and maps nothing yet — slabs are created lazily
    /// on first use, inside the central store.
    pub fn create(config: Config) -> Result<Self, Error> {
        let derived = DerivedConfig::derive(&config, SLAB_HEADER_SIZE, SLAB_HEADER_ALIGN, crate::platform::page_size())?;
        Ok(Self {
            central: CentralStore::new(&config, derived),
            derived,
        })
    }

    /// Object size after padding to `obj_align`, i.e. the exact number of
    /// bytes every allocation from this allocator returns.
    pub fn obj_size(&self) -> usize {
        self.derived.obj_padded_size
    }

    pub fn obj_align(&self) -> usize {
        self.derived.obj_align
    }

    pub fn stats(&self) -> Snapshot {
        self.central.stats()
    }

    /// Live (unretired) slab count, for tests and diagnostics.
    pub fn slab_count(&self) -> usize {
        self.central.slab_count()
    }

    /// Opens a per-thread cache borrowing this allocator. Threads that
    /// allocate frequently should keep one `Cache` per thread rather than
    /// attaching per-call, to actually exercise the lock-free hot path.
    pub fn attach(&self) -> Cache<'_> {
        Cache::new(self)
    }

    pub(crate) fn central(&self) -> &CentralStore {
        &self.central
    }

    pub(crate) fn derived(&self) -> &DerivedConfig {
        &self.derived
    }
}
