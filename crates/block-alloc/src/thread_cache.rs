//! Per-worker free list in front of the global pool.

use core::{fmt, ptr::NonNull};

use snafu::OptionExt as _;
#[cfg(feature = "hardened")]
use snafu::ensure;

#[cfg(feature = "hardened")]
use crate::error::DoubleFreeSnafu;
use crate::{
    allocator::BlockAllocator,
    block::{BlockIndex, Chain},
    error::{ContractViolation, ForeignPointerSnafu, OutOfMemoryError, OutOfMemorySnafu},
    global_pool::{GlobalFreePool, LockFreePool},
};

/// A worker's private cache of free blocks.
///
/// Obtained from [`BlockAllocator::thread_cache`]. Each worker thread keeps
/// its own cache and serves most allocations and deallocations from it
/// without any synchronization. The cache talks to the shared global pool
/// only to refill when it runs empty and to flush when it grows past the
/// allocator's high-water mark.
///
/// A block may be returned through any cache of the allocator it came from,
/// not only the one that handed it out.
///
/// Dropping the cache returns every block it still holds to the global pool.
pub struct ThreadCache<'a, P: GlobalFreePool = LockFreePool> {
    allocator: &'a BlockAllocator<P>,
    head: BlockIndex,
    tail: BlockIndex,
    len: usize,
}

impl<'a, P: GlobalFreePool> ThreadCache<'a, P> {
    pub(crate) fn new(allocator: &'a BlockAllocator<P>) -> Self {
        Self {
            allocator,
            head: BlockIndex::NIL,
            tail: BlockIndex::NIL,
            len: 0,
        }
    }

    /// Allocator this cache belongs to.
    #[must_use]
    pub fn allocator(&self) -> &'a BlockAllocator<P> {
        self.allocator
    }

    /// Number of free blocks held by this cache.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the next allocation has to refill from the global
    /// pool.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Allocates one block of [`BlockAllocator::block_size`] bytes.
    ///
    /// The block's contents are unspecified. If the cache is empty it first
    /// moves up to `thread_local_fill` blocks from the global pool.
    ///
    /// # Errors
    ///
    /// Returns [`OutOfMemoryError`] if this cache and the global pool are both
    /// empty. Blocks held by other workers' caches are not reclaimed, so this
    /// can happen before `max_blocks` blocks are allocated.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_alloc::{AllocatorConfig, LockedAllocator};
    ///
    /// let allocator = LockedAllocator::new(64, 16, AllocatorConfig::default()).unwrap();
    /// let mut cache = allocator.thread_cache();
    ///
    /// let block = cache.allocate().unwrap();
    /// unsafe {
    ///     block.write_bytes(0, 64);
    ///     cache.deallocate(block);
    /// }
    /// ```
    pub fn allocate(&mut self) -> Result<NonNull<u8>, OutOfMemoryError> {
        if self.len == 0 {
            self.refill()?;
        }

        let pool = self.allocator.memory_pool();
        let index = self.head;
        self.head = pool.links().next(index);
        self.len -= 1;
        if self.len == 0 {
            self.tail = BlockIndex::NIL;
        }

        #[cfg(feature = "hardened")]
        pool.states().acquire(index);

        Ok(pool.block_ptr(index))
    }

    /// Returns a block to this cache.
    ///
    /// If the cache grows past the high-water mark, every block beyond
    /// `thread_local_fill` goes back to the global pool in one batch.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    ///
    /// - `ptr` was returned by [`allocate`](Self::allocate) on a cache of the
    ///   same allocator
    /// - `ptr` has not been deallocated since it was allocated
    /// - the block is not accessed after this call
    ///
    /// # Panics
    ///
    /// Panics if `ptr` is not the start of a block of this allocator. With the
    /// `hardened` feature, also panics if the block is not currently
    /// allocated.
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>) {
        match self.resolve(ptr) {
            Ok(index) => self.give(index),
            Err(err) => panic!("invalid deallocation: {err}"),
        }
    }

    /// Returns a block to this cache, reporting contract violations instead
    /// of panicking.
    ///
    /// Both foreign pointers and double frees are detected, so a rejected
    /// pointer leaves the allocator untouched.
    ///
    /// # Safety
    ///
    /// The block must not be accessed after this call returns `Ok`.
    #[cfg(feature = "hardened")]
    pub unsafe fn try_deallocate(&mut self, ptr: NonNull<u8>) -> Result<(), ContractViolation> {
        let index = self.resolve(ptr)?;
        self.give(index);
        Ok(())
    }

    /// Returns every cached block to the global pool.
    pub fn flush_all(&mut self) {
        self.flush_to(0);
    }

    fn resolve(&self, ptr: NonNull<u8>) -> Result<BlockIndex, ContractViolation> {
        let pool = self.allocator.memory_pool();
        let addr = ptr.addr().get();
        let index = pool.index_of(ptr).context(ForeignPointerSnafu { addr })?;

        #[cfg(feature = "hardened")]
        ensure!(
            pool.states().release(index),
            DoubleFreeSnafu {
                index: index.get(),
                addr,
            }
        );

        Ok(index)
    }

    fn give(&mut self, index: BlockIndex) {
        let links = self.allocator.links();
        links.set_next(index, self.head);
        if self.len == 0 {
            self.tail = index;
        }
        self.head = index;
        self.len += 1;

        if self.len > self.allocator.high_water_mark() {
            self.flush_to(self.allocator.config().thread_local_fill);
        }
    }

    fn refill(&mut self) -> Result<(), OutOfMemoryError> {
        debug_assert_eq!(self.len, 0);
        let allocator = self.allocator;
        let fill = allocator.config().thread_local_fill;

        let Some(chain) = allocator.global_pool().try_pop_batch(allocator.links(), fill) else {
            allocator.stats_counters().record_exhausted();
            tracing::debug!(
                strategy = P::NAME,
                max_blocks = allocator.max_blocks(),
                "global free pool exhausted"
            );
            return OutOfMemorySnafu {
                max_blocks: allocator.max_blocks(),
            }
            .fail();
        };

        self.head = chain.head;
        self.tail = chain.tail;
        self.len = chain.len;
        allocator.stats_counters().record_refill(chain.len);
        tracing::trace!(strategy = P::NAME, blocks = chain.len, "refilled thread cache");
        Ok(())
    }

    /// Moves every block past the first `keep` to the global pool.
    ///
    /// The most recently returned blocks sit at the front and stay cached.
    fn flush_to(&mut self, keep: usize) {
        if self.len <= keep {
            return;
        }
        let allocator = self.allocator;
        let links = allocator.links();

        let count = self.len - keep;
        let chain = if keep == 0 {
            let chain = Chain::new(self.head, self.tail, count);
            self.head = BlockIndex::NIL;
            self.tail = BlockIndex::NIL;
            chain
        } else {
            let kept_tail = links.advance(self.head, keep - 1);
            let chain = Chain::new(links.next(kept_tail), self.tail, count);
            links.set_next(kept_tail, BlockIndex::NIL);
            self.tail = kept_tail;
            chain
        };
        self.len = keep;

        allocator.global_pool().push_batch(links, chain);
        allocator.stats_counters().record_flush(count);
        tracing::trace!(strategy = P::NAME, blocks = count, "flushed thread cache");
    }
}

impl<P: GlobalFreePool> Drop for ThreadCache<'_, P> {
    fn drop(&mut self) {
        self.flush_all();
    }
}

impl<P: GlobalFreePool> fmt::Debug for ThreadCache<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadCache")
            .field("strategy", &P::NAME)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}
