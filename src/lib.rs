//! rtslab: a thread-aware, fixed-object-size slab allocator.
//!
//! Each [`SlabAllocator`] serves exactly one `(obj_size, obj_align)` pair.
//! Threads that allocate frequently should open one [`Cache`] via
//! [`SlabAllocator::attach`] and keep it for the thread's lifetime — that's
//! what makes `alloc`/`free` lock-free on the common path. A free for an
//! object whose batch the calling thread's cache doesn't hold falls back to
//! a lock-free remote-free stack rather than the central store's lock.
//!
//! # Usage
//!
//! ```
//! use rtslab::{Config, SlabAllocator};
//!
//! let allocator = SlabAllocator::create(Config::new(64, 8)).unwrap();
//! let mut cache = allocator.attach();
//! let obj = cache.alloc().unwrap();
//! cache.free(obj);
//! ```

mod allocator;
mod batch;
mod cache;
mod central_store;
mod config;
mod error;
mod free_list;
mod layout;
mod lru;
pub mod platform;
mod rbtree;
mod slab;
mod stats;
pub mod sync;

pub use allocator::SlabAllocator;
pub use cache::Cache;
pub use config::{Config, Tuning};
pub use error::{Error, ErrorKind};
pub use stats::Snapshot;
