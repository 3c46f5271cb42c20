//! Shared pool of free blocks not held by any worker cache.
//!
//! Two strategies implement [`GlobalFreePool`]:
//!
//! - [`LockedPool`] guards a FIFO list with a spin lock. Popping a batch
//!   walks the list under the lock; pushing a batch appends it in O(1).
//! - [`LockFreePool`] is a Treiber stack whose head packs a block index
//!   with a version tag in one 64-bit atomic. Pops take one block per CAS;
//!   pushes prepend a whole batch with a single CAS.
//!
//! The strategy is a type parameter of
//! [`BlockAllocator`](crate::BlockAllocator), so calls are statically
//! dispatched.

// Opaque handles in the signatures of `GlobalFreePool`. Only this crate can
// build or inspect them.
#[doc(hidden)]
pub use crate::block::{Chain, LinkTable};

pub use self::{lock_free::LockFreePool, locked::LockedPool};

mod lock_free;
mod locked;

mod sealed {
    pub trait Sealed {}

    impl Sealed for super::LockedPool {}
    impl Sealed for super::LockFreePool {}
}

/// Synchronization strategy for the global free pool.
///
/// This trait is sealed; the crate provides the only implementations.
pub trait GlobalFreePool: sealed::Sealed + Send + Sync + Sized {
    /// Short name of the strategy, used in diagnostics.
    const NAME: &'static str;

    /// Creates a pool holding every block of `initial`.
    ///
    /// The tail of `initial` must already terminate the chain.
    fn new(initial: Chain) -> Self;

    /// Detaches up to `max` blocks.
    ///
    /// Returns `None` if the pool is empty. A shorter chain than requested
    /// is not an error; it means the pool ran dry.
    fn try_pop_batch(&self, links: &LinkTable, max: usize) -> Option<Chain>;

    /// Returns every block of `chain` to the pool.
    fn push_batch(&self, links: &LinkTable, chain: Chain);

    /// Number of blocks in the pool.
    ///
    /// Exact while no push or pop is in flight; concurrent callers may
    /// observe a value that is momentarily too large.
    fn approximate_len(&self) -> usize;
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(all(test, not(loom)))]
mod tests {
    use alloc::vec::Vec;
    use std::{collections::HashSet, thread};

    use super::*;
    use crate::block::BlockIndex;

    fn collect(links: &LinkTable, chain: Chain) -> Vec<usize> {
        let mut out = Vec::new();
        let mut current = chain.head;
        for _ in 0..chain.len {
            out.push(current.get());
            current = links.next(current);
        }
        assert_eq!(out.last().copied(), Some(chain.tail.get()));
        out
    }

    fn with_pool<P, F>(len: usize, f: F)
    where
        P: GlobalFreePool,
        F: FnOnce(&P, &LinkTable),
    {
        let (links, chain) = LinkTable::chained(len);
        let pool = P::new(chain);
        assert_eq!(pool.approximate_len(), len);
        f(&pool, &links);
    }

    fn drain<P: GlobalFreePool>(pool: &P, links: &LinkTable) -> Vec<usize> {
        let mut out = Vec::new();
        while let Some(chain) = pool.try_pop_batch(links, 7) {
            out.extend(collect(links, chain));
        }
        out
    }

    fn check_batches<P: GlobalFreePool>() {
        with_pool::<P, _>(10, |pool, links| {
            let first = pool.try_pop_batch(links, 4).unwrap();
            assert_eq!(first.len, 4);
            assert!(links.next(first.tail).is_nil());
            assert_eq!(pool.approximate_len(), 6);

            let second = pool.try_pop_batch(links, 100).unwrap();
            assert_eq!(second.len, 6);
            assert_eq!(pool.approximate_len(), 0);
            assert!(pool.try_pop_batch(links, 1).is_none());

            pool.push_batch(links, second);
            pool.push_batch(links, first);
            assert_eq!(pool.approximate_len(), 10);

            let mut all = drain(pool, links);
            all.sort_unstable();
            assert_eq!(all, (0..10).collect::<Vec<_>>());
        });
    }

    fn check_concurrent_exchange<P: GlobalFreePool>() {
        const THREADS: usize = 8;
        const ROUNDS: usize = 2_000;
        const BLOCKS: usize = 256;

        with_pool::<P, _>(BLOCKS, |pool, links| {
            thread::scope(|s| {
                for t in 0..THREADS {
                    s.spawn(move || {
                        for round in 0..ROUNDS {
                            let want = 1 + (t + round) % 9;
                            if let Some(chain) = pool.try_pop_batch(links, want) {
                                assert!(chain.len <= want);
                                pool.push_batch(links, chain);
                            }
                        }
                    });
                }
            });

            assert_eq!(pool.approximate_len(), BLOCKS);
            let all = drain(pool, links);
            assert_eq!(all.len(), BLOCKS);
            let unique = all.iter().copied().collect::<HashSet<_>>();
            assert_eq!(unique.len(), BLOCKS);
        });
    }

    #[test]
    fn test_locked_batches() {
        check_batches::<LockedPool>();
    }

    #[test]
    fn test_lock_free_batches() {
        check_batches::<LockFreePool>();
    }

    #[test]
    fn test_locked_pool_is_fifo() {
        with_pool::<LockedPool, _>(4, |pool, links| {
            let front = pool.try_pop_batch(links, 2).unwrap();
            assert_eq!(collect(links, front), [0, 1]);
            pool.push_batch(links, front);
            assert_eq!(drain(pool, links), [2, 3, 0, 1]);
        });
    }

    #[test]
    fn test_lock_free_pool_is_lifo() {
        with_pool::<LockFreePool, _>(4, |pool, links| {
            let front = pool.try_pop_batch(links, 2).unwrap();
            assert_eq!(collect(links, front), [0, 1]);
            pool.push_batch(links, front);
            assert_eq!(drain(pool, links), [0, 1, 2, 3]);
        });
    }

    #[test]
    fn test_single_block_pool() {
        with_pool::<LockFreePool, _>(1, |pool, links| {
            let chain = pool.try_pop_batch(links, 5).unwrap();
            assert_eq!(chain.head, BlockIndex::new(0));
            assert!(pool.try_pop_batch(links, 5).is_none());
            pool.push_batch(links, chain);
            assert_eq!(pool.approximate_len(), 1);
        });
        with_pool::<LockedPool, _>(1, |pool, links| {
            let chain = pool.try_pop_batch(links, 5).unwrap();
            assert!(pool.try_pop_batch(links, 5).is_none());
            pool.push_batch(links, chain);
            assert_eq!(drain(pool, links), [0]);
        });
    }

    #[test]
    fn test_locked_concurrent_exchange() {
        check_concurrent_exchange::<LockedPool>();
    }

    #[test]
    fn test_lock_free_concurrent_exchange() {
        check_concurrent_exchange::<LockFreePool>();
    }
}
