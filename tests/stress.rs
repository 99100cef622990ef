//! Stress tests with fill-pattern corruption detection.
//!
//! Inspired by mimalloc's test-stress: allocate memory, fill with a known
//! pattern, pass between threads, and verify the pattern before freeing.
//! Any corruption (use-after-free, double-free, buffer overflow) will
//! cause a pattern mismatch and assertion failure.

use rtslab::{Config, SlabAllocator};

const OBJ_SIZE: usize = 64;

/// Fill a buffer with a deterministic pattern derived from its address.
fn fill_pattern(ptr: *mut u8, size: usize) {
    let seed = ptr as usize;
    for i in 0..size {
        unsafe {
            *ptr.add(i) = ((seed.wrapping_add(i).wrapping_mul(0x9E37_79B9)) & 0xFF) as u8;
        }
    }
}

fn check_pattern(ptr: *mut u8, size: usize) -> bool {
    let seed = ptr as usize;
    for i in 0..size {
        let expected = ((seed.wrapping_add(i).wrapping_mul(0x9E37_79B9)) & 0xFF) as u8;
        if unsafe { *ptr.add(i) } != expected {
            return false;
        }
    }
    true
}

#[test]
fn stress_fill_pattern_single_thread() {
    let allocator = SlabAllocator::create(Config::new(OBJ_SIZE, 8)).unwrap();
    let mut cache = allocator.attach();
    let rounds = 200;
    let batch = 64;

    let mut live: Vec<*mut u8> = Vec::new();

    for round in 0..rounds {
        for _ in 0..batch {
            let obj = cache.alloc().unwrap();
            fill_pattern(obj, OBJ_SIZE);
            live.push(obj);
        }

        for &obj in &live {
            assert!(check_pattern(obj, OBJ_SIZE), "corruption detected at round {round}");
        }

        let drain_count = live.len() / 2;
        for _ in 0..drain_count {
            let idx = (round * 7 + 3) % live.len();
            let obj = live.swap_remove(idx);
            assert!(check_pattern(obj, OBJ_SIZE), "corruption before free at round {round}");
            cache.free(obj);
        }
    }

    for obj in live {
        assert!(check_pattern(obj, OBJ_SIZE));
        cache.free(obj);
    }
}

/// Objects allocated on one thread's cache, freed on another: exercises the
/// lock-free remote-free path end to end, not just its unit-level reclaim.
#[test]
fn stress_cross_cache_free_no_corruption() {
    use std::sync::mpsc;

    let allocator = SlabAllocator::create(Config::new(OBJ_SIZE, 8)).unwrap();
    let npairs = 4;
    let ops = 200;

    std::thread::scope(|scope| {
        let mut consumers = Vec::new();
        for pair_id in 0..npairs {
            let (tx, rx) = mpsc::channel::<usize>();
            let allocator = &allocator;

            scope.spawn(move || {
                let mut cache = allocator.attach();
                for i in 0..ops {
                    let obj = cache.alloc().unwrap();
                    let _ = i;
                    fill_pattern(obj, OBJ_SIZE);
                    tx.send(obj as usize).unwrap();
                }
            });

            consumers.push(scope.spawn(move || {
                let mut cache = allocator.attach();
                let mut count = 0usize;
                for addr in rx {
                    let obj = addr as *mut u8;
                    assert!(
                        check_pattern(obj, OBJ_SIZE),
                        "cross-cache corruption at pair {pair_id}, item {count}"
                    );
                    cache.free(obj);
                    count += 1;
                }
                count
            }));
        }

        let total: usize = consumers.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, npairs * ops);
    });
}

#[test]
fn stress_many_caches_concurrent() {
    let allocator = SlabAllocator::create(Config::new(OBJ_SIZE, 8)).unwrap();
    let nthreads = 8;
    let ops_per_thread = 400;

    std::thread::scope(|scope| {
        for tid in 0..nthreads {
            let allocator = &allocator;
            scope.spawn(move || {
                let mut cache = allocator.attach();
                let mut live: Vec<*mut u8> = Vec::with_capacity(64);

                for i in 0..ops_per_thread {
                    let obj = cache.alloc().unwrap();
                    fill_pattern(obj, OBJ_SIZE);
                    live.push(obj);

                    if live.len() > 32 {
                        for _ in 0..16 {
                            let obj = live.pop().unwrap();
                            assert!(check_pattern(obj, OBJ_SIZE), "thread {tid} corruption at op {i}");
                            cache.free(obj);
                        }
                    }
                }

                for obj in live {
                    assert!(check_pattern(obj, OBJ_SIZE));
                    cache.free(obj);
                }
            });
        }
    });

    // Every slab mapped during the run should have drained back down once
    // every cache was torn down.
    assert_eq!(allocator.slab_count(), 0);
}

#[test]
fn stress_all_slabs_eventually_retire() {
    let allocator = SlabAllocator::create(Config::new(OBJ_SIZE, 8)).unwrap();
    {
        let mut cache = allocator.attach();
        let mut live = Vec::new();
        for _ in 0..2000 {
            live.push(cache.alloc().unwrap());
        }
        assert!(allocator.slab_count() > 0);
        for obj in live {
            cache.free(obj);
        }
    }
    assert_eq!(allocator.slab_count(), 0);
    let snap = allocator.stats();
    assert!(snap.slab_retires > 0);
}
