//! Model-checked interleavings of the global pools and the cache paths.
//!
//! Run with `RUSTFLAGS="--cfg loom" cargo test -p block-alloc --lib --release`.
//!
//! The state space grows exponentially with threads and steps, so every
//! model uses two or three threads, pools of two or three blocks, and one or
//! two operations per thread.

use alloc::vec::Vec;

use loom::{sync::Arc, thread};

use crate::{
    AllocatorConfig, BlockAllocator, GlobalFreePool, LockFreePool, LockedPool,
    block::{Chain, LinkTable},
};

fn bounded(preemption: usize) -> loom::model::Builder {
    let mut builder = loom::model::Builder::new();
    builder.preemption_bound = Some(preemption);
    builder
}

fn drain<P: GlobalFreePool>(pool: &P, links: &LinkTable) -> Vec<usize> {
    let mut out = Vec::new();
    while let Some(chain) = pool.try_pop_batch(links, usize::MAX) {
        let mut current = chain.head;
        for _ in 0..chain.len {
            out.push(current.get());
            current = links.next(current);
        }
    }
    out.sort_unstable();
    out
}

fn new_pool<P: GlobalFreePool>(len: usize) -> Arc<(P, LinkTable)> {
    let (links, chain) = LinkTable::chained(len);
    Arc::new((P::new(chain), links))
}

fn check_concurrent_pops_are_disjoint<P: GlobalFreePool + 'static>() {
    loom::model(|| {
        let shared = new_pool::<P>(2);

        let handles = (0..2)
            .map(|_| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || {
                    let (pool, links) = &*shared;
                    pool.try_pop_batch(links, 1)
                })
            })
            .collect::<Vec<_>>();
        let chains = handles
            .into_iter()
            .map(|handle| handle.join().unwrap().unwrap())
            .collect::<Vec<Chain>>();

        assert_ne!(chains[0].head, chains[1].head);
        let (pool, links) = &*shared;
        assert!(pool.try_pop_batch(links, 1).is_none());
        for chain in chains {
            pool.push_batch(links, chain);
        }
        assert_eq!(drain(pool, links), [0, 1]);
    });
}

fn check_pop_races_with_recycle<P: GlobalFreePool + 'static>() {
    bounded(3).check(|| {
        let shared = new_pool::<P>(3);

        // Pops the head and pushes it straight back, twice, so the other
        // thread may observe the same head index with a different successor.
        let recycler = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                let (pool, links) = &*shared;
                for _ in 0..2 {
                    if let Some(chain) = pool.try_pop_batch(links, 1) {
                        pool.push_batch(links, chain);
                    }
                }
            })
        };
        let taker = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                let (pool, links) = &*shared;
                pool.try_pop_batch(links, 2)
            })
        };

        recycler.join().unwrap();
        let taken = taker.join().unwrap();

        let (pool, links) = &*shared;
        if let Some(chain) = taken {
            pool.push_batch(links, chain);
        }
        assert_eq!(pool.approximate_len(), 3);
        assert_eq!(drain(pool, links), [0, 1, 2]);
    });
}

fn check_caches_on_two_threads<P: GlobalFreePool + 'static>() {
    bounded(2).check(|| {
        let config = AllocatorConfig::default()
            .with_thread_local_fill(1)
            .with_flush_ratio(1.5);
        let allocator = Arc::new(BlockAllocator::<P>::new(8, 2, config).unwrap());

        let handles = (0..2_u8)
            .map(|pattern| {
                let allocator = Arc::clone(&allocator);
                thread::spawn(move || {
                    let mut cache = allocator.thread_cache();
                    let ptr = cache.allocate().unwrap();
                    unsafe {
                        ptr.write_bytes(pattern, 8);
                        assert_eq!(ptr.add(7).read(), pattern);
                        cache.deallocate(ptr);
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(allocator.global_free_len(), 2);
    });
}

#[test]
fn test_lock_free_concurrent_pops_are_disjoint() {
    check_concurrent_pops_are_disjoint::<LockFreePool>();
}

#[test]
fn test_locked_concurrent_pops_are_disjoint() {
    check_concurrent_pops_are_disjoint::<LockedPool>();
}

#[test]
fn test_lock_free_pop_races_with_recycle() {
    check_pop_races_with_recycle::<LockFreePool>();
}

#[test]
fn test_locked_pop_races_with_recycle() {
    check_pop_races_with_recycle::<LockedPool>();
}

#[test]
fn test_lock_free_caches_on_two_threads() {
    check_caches_on_two_threads::<LockFreePool>();
}

#[test]
fn test_locked_caches_on_two_threads() {
    check_caches_on_two_threads::<LockedPool>();
}
