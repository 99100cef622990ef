//! Runtime configuration and the derived constants described in the slab
//! allocator's layout formulas.
//!
//! This allocator's object size is a *runtime* parameter — there is exactly
//! one size class, chosen by the caller of [`crate::SlabAllocator::create`]
//! — so derivation happens once, at allocator construction, as an ordinary
//! fallible function rather than build-time codegen.

use crate::error::{Error, bad_config};

const DEFAULT_BATCH_CAPACITY: u32 = 64;
const DEFAULT_ALLOC_STORE_CAPACITY: u32 = 16;
const DEFAULT_CACHE_STORE_CAPACITY: u32 = 2;
const DEFAULT_CACHE_ACQUIRE_AMOUNT: u32 = 1;
const DEFAULT_CACHE_RELEASE_AMOUNT: u32 = 1;
const DEFAULT_SLAB_ACQUIRE_COUNT: u32 = 1;

/// Tuning knobs for a [`Config`]. `0` means "use the default" for every
/// field, matching §6's configuration-field table.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tuning {
    pub batch_capacity: u32,
    pub alloc_store_capacity: u32,
    pub cache_store_capacity: u32,
    pub cache_acquire_amount: u32,
    pub cache_release_amount: u32,
    pub slab_acquire_count: u32,
}

/// User-supplied configuration for a [`crate::SlabAllocator`].
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Size in bytes of each object this allocator hands out.
    pub obj_size: usize,
    /// Required alignment of each object; must be a power of two.
    pub obj_align: usize,
    pub tuning: Tuning,
}

impl Config {
    pub fn new(obj_size: usize, obj_align: usize) -> Self {
        Self {
            obj_size,
            obj_align,
            tuning: Tuning::default(),
        }
    }

    pub fn with_tuning(mut self, tuning: Tuning) -> Self {
        self.tuning = tuning;
        self
    }
}

/// Every constant derived from a [`Config`] by §4.6.1's formulas.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DerivedConfig {
    pub obj_align: usize,
    pub obj_padded_size: usize,
    pub slab_offset: usize,
    pub slab_size: usize,
    pub slab_obj_mask: usize,
    pub batch_capacity: u32,
    pub batch_per_slab: usize,
    pub alloc_store_capacity: u32,
    pub cache_store_capacity: u32,
    pub cache_acquire_amount: u32,
    pub cache_release_amount: u32,
    pub slab_acquire_count: u32,
}

fn valid_align(align: usize) -> bool {
    align != 0 && (align & (align - 1)) == 0
}

fn align_up(size: usize, align: usize) -> usize {
    (size + align - 1) & !(align - 1)
}

impl DerivedConfig {
    /// `slab_header_size`/`slab_header_align` describe the caller's slab
    /// header type (kept as parameters rather than importing
    /// `crate::slab::SlabHeader` directly, so this module stays a leaf that
    /// `slab.rs` depends on rather than the reverse).
    pub(crate) fn derive(
        config: &Config,
        slab_header_size: usize,
        slab_header_align: usize,
        page_size: usize,
    ) -> Result<Self, Error> {
        if !valid_align(config.obj_align) {
            return Err(bad_config("obj_align must be a nonzero power of two"));
        }

        let ptr_size = core::mem::size_of::<usize>();
        let obj_size = config.obj_size.max(ptr_size);
        let obj_padded_size = align_up(obj_size, config.obj_align);

        let header_align = slab_header_align.max(config.obj_align);
        let slab_offset = align_up(slab_header_size, header_align);

        let t = &config.tuning;
        let batch_capacity = if t.batch_capacity == 0 {
            DEFAULT_BATCH_CAPACITY
        } else {
            t.batch_capacity
        };
        let cache_acquire_amount = if t.cache_acquire_amount == 0 {
            DEFAULT_CACHE_ACQUIRE_AMOUNT
        } else {
            t.cache_acquire_amount
        };
        let cache_release_amount = if t.cache_release_amount == 0 {
            DEFAULT_CACHE_RELEASE_AMOUNT
        } else {
            t.cache_release_amount
        };
        let cache_store_capacity = if t.cache_store_capacity == 0 {
            DEFAULT_CACHE_STORE_CAPACITY
        } else {
            t.cache_store_capacity
        };
        let alloc_store_capacity = if t.alloc_store_capacity == 0 {
            DEFAULT_ALLOC_STORE_CAPACITY
        } else {
            t.alloc_store_capacity
        };
        let slab_acquire_count = if t.slab_acquire_count == 0 {
            DEFAULT_SLAB_ACQUIRE_COUNT
        } else {
            t.slab_acquire_count
        };

        if cache_acquire_amount > cache_store_capacity {
            return Err(bad_config("cache_acquire_amount exceeds cache_store_capacity"));
        }
        if cache_release_amount > cache_store_capacity {
            return Err(bad_config("cache_release_amount exceeds cache_store_capacity"));
        }
        if cache_acquire_amount > alloc_store_capacity {
            return Err(bad_config("cache_acquire_amount exceeds alloc_store_capacity"));
        }
        if cache_release_amount > alloc_store_capacity {
            return Err(bad_config("cache_release_amount exceeds alloc_store_capacity"));
        }

        let acquire_per_slab = slab_acquire_count as usize;
        let batch_total_bytes = batch_capacity as usize * obj_padded_size;
        let slab_size_needed =
            acquire_per_slab * cache_acquire_amount as usize * batch_total_bytes + slab_offset;
        let min_pages_needed = slab_size_needed.div_ceil(page_size);

        let mut pages_per_slab: usize = 1;
        while pages_per_slab < min_pages_needed {
            pages_per_slab = pages_per_slab
                .checked_mul(2)
                .ok_or_else(|| bad_config("slab size overflowed while rounding to a power of two"))?;
        }
        let slab_size = pages_per_slab
            .checked_mul(page_size)
            .ok_or_else(|| bad_config("slab size overflowed"))?;

        let slab_obj_mask = !(slab_size - 1);
        let batch_per_slab = (slab_size - slab_offset) / batch_total_bytes;

        if batch_per_slab > alloc_store_capacity as usize {
            return Err(bad_config("batch_per_slab exceeds alloc_store_capacity"));
        }
        if batch_per_slab == 0 {
            return Err(bad_config("slab too small to hold a single batch"));
        }

        Ok(Self {
            obj_align: config.obj_align,
            obj_padded_size,
            slab_offset,
            slab_size,
            slab_obj_mask,
            batch_capacity,
            batch_per_slab,
            alloc_store_capacity,
            cache_store_capacity,
            cache_acquire_amount,
            cache_release_amount,
            slab_acquire_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(align(8))]
    struct FakeHeader(u64, u64);

    #[test]
    fn derives_power_of_two_slab_size() {
        let cfg = Config::new(48, 8);
        let derived = DerivedConfig::derive(
            &cfg,
            core::mem::size_of::<FakeHeader>(),
            core::mem::align_of::<FakeHeader>(),
            4096,
        )
        .unwrap();
        assert!(derived.slab_size.is_power_of_two());
        assert_eq!(derived.slab_obj_mask, !(derived.slab_size - 1));
        assert!(derived.batch_per_slab >= 1);
    }

    #[test]
    fn rejects_bad_align() {
        let cfg = Config::new(48, 3);
        let err = DerivedConfig::derive(&cfg, 16, 8, 4096).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::BadConfig);
    }

    #[test]
    fn rejects_inconsistent_tuning() {
        let cfg = Config::new(48, 8).with_tuning(Tuning {
            cache_acquire_amount: 5,
            cache_store_capacity: 2,
            ..Default::default()
        });
        let err = DerivedConfig::derive(&cfg, 16, 8, 4096).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::BadConfig);
    }

    #[test]
    fn padded_size_at_least_pointer_sized() {
        let cfg = Config::new(1, 1);
        let derived = DerivedConfig::derive(&cfg, 16, 8, 4096).unwrap();
        assert!(derived.obj_padded_size >= core::mem::size_of::<usize>());
    }
}
