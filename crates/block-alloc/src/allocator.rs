//! The allocator facade tying the memory pool, the global free pool and the
//! worker caches together.

use core::{fmt, ptr::NonNull};

use crate::{
    block::{self, LinkTable},
    config::AllocatorConfig,
    error::CreateError,
    global_pool::{GlobalFreePool, LockFreePool, LockedPool},
    memory_pool::MemoryPool,
    stats::{AllocatorStats, StatsCounters},
    thread_cache::ThreadCache,
};

/// Allocator whose global pool is guarded by a spin lock.
pub type LockedAllocator = BlockAllocator<LockedPool>;

/// Allocator whose global pool is a lock-free stack.
pub type LockFreeAllocator = BlockAllocator<LockFreePool>;

/// A fixed-size block allocator shared by many worker threads.
///
/// The allocator owns one contiguous memory pool split into `max_blocks`
/// blocks of `block_size` bytes each. All blocks start in the global free
/// pool; workers allocate and deallocate through [`ThreadCache`]s obtained
/// with [`thread_cache`](Self::thread_cache), which move blocks to and from
/// the global pool in batches.
///
/// The strategy `P` decides how the global pool is synchronized. See
/// [`LockedPool`] and [`LockFreePool`].
///
/// # Memory Layout
///
/// The pool base is aligned to [`POOL_ALIGN`](crate::POOL_ALIGN) bytes and
/// block `i` starts at `base + i * block_size`, so every block is aligned to
/// the largest power of two dividing `block_size` (up to `POOL_ALIGN`).
///
/// # Teardown
///
/// Caches borrow the allocator, so all of them have flushed by the time the
/// allocator is dropped. Dropping the allocator releases the memory pool as a
/// whole; blocks still allocated at that point become dangling.
pub struct BlockAllocator<P: GlobalFreePool = LockFreePool> {
    pool: MemoryPool,
    global: P,
    config: AllocatorConfig,
    high_water_mark: usize,
    stats: StatsCounters,
}

impl<P: GlobalFreePool> BlockAllocator<P> {
    /// Largest `max_blocks` an allocator accepts.
    ///
    /// `u32::MAX` itself is reserved as the list terminator.
    ///
    /// ```
    /// use block_alloc::LockFreeAllocator;
    ///
    /// assert_eq!(LockFreeAllocator::MAX_BLOCKS, u32::MAX as usize);
    /// ```
    pub const MAX_BLOCKS: usize = block::MAX_BLOCKS;

    /// Creates an allocator managing `max_blocks` blocks of `block_size`
    /// bytes.
    ///
    /// The whole pool is obtained up front and every block is placed in the
    /// global free pool.
    ///
    /// # Errors
    ///
    /// Returns [`CreateError`] if `block_size` is zero, `max_blocks` is zero
    /// or above [`MAX_BLOCKS`](Self::MAX_BLOCKS), `config` is invalid, or
    /// the backing storage cannot be obtained.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_alloc::{AllocatorConfig, LockFreeAllocator};
    ///
    /// let config = AllocatorConfig::default().with_thread_local_fill(32);
    /// let allocator = LockFreeAllocator::new(256, 1024, config).unwrap();
    /// assert_eq!(allocator.global_free_len(), 1024);
    /// ```
    pub fn new(
        block_size: usize,
        max_blocks: usize,
        config: AllocatorConfig,
    ) -> Result<Self, CreateError> {
        config.validate()?;
        let (pool, initial) = MemoryPool::new(block_size, max_blocks)?;
        let global = P::new(initial);

        tracing::debug!(
            strategy = P::NAME,
            block_size,
            max_blocks,
            thread_local_fill = config.thread_local_fill,
            flush_ratio = config.flush_ratio,
            "created block allocator"
        );

        Ok(Self {
            pool,
            global,
            high_water_mark: config.high_water_mark(),
            config,
            stats: StatsCounters::new(),
        })
    }

    /// Creates an empty cache for the calling worker.
    ///
    /// Each worker thread should keep one cache for as long as it allocates;
    /// creating a cache per allocation defeats batching.
    #[must_use]
    pub fn thread_cache(&self) -> ThreadCache<'_, P> {
        ThreadCache::new(self)
    }

    #[must_use]
    pub fn block_size(&self) -> usize {
        self.pool.block_size()
    }

    #[must_use]
    pub fn max_blocks(&self) -> usize {
        self.pool.block_count()
    }

    #[must_use]
    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Cache size above which a cache flushes.
    #[must_use]
    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    /// Number of blocks in the global free pool.
    ///
    /// Blocks held by worker caches are not included. The value is only
    /// advisory while other threads are using the allocator.
    #[must_use]
    pub fn global_free_len(&self) -> usize {
        self.global.approximate_len()
    }

    /// Snapshot of the refill and flush counters.
    #[must_use]
    pub fn stats(&self) -> AllocatorStats {
        self.stats.snapshot()
    }

    /// Returns `true` if `ptr` is the start of one of this allocator's blocks.
    ///
    /// This says nothing about whether the block is currently allocated.
    #[must_use]
    pub fn contains(&self, ptr: NonNull<u8>) -> bool {
        self.pool.contains(ptr)
    }

    pub(crate) fn memory_pool(&self) -> &MemoryPool {
        &self.pool
    }

    pub(crate) fn links(&self) -> &LinkTable {
        self.pool.links()
    }

    pub(crate) fn global_pool(&self) -> &P {
        &self.global
    }

    pub(crate) fn stats_counters(&self) -> &StatsCounters {
        &self.stats
    }
}

impl<P: GlobalFreePool> Drop for BlockAllocator<P> {
    fn drop(&mut self) {
        let outstanding = self.max_blocks().saturating_sub(self.global_free_len());
        if outstanding > 0 {
            tracing::debug!(
                strategy = P::NAME,
                outstanding,
                "block allocator dropped with blocks still allocated"
            );
        }
    }
}

impl<P: GlobalFreePool> fmt::Debug for BlockAllocator<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockAllocator")
            .field("strategy", &P::NAME)
            .field("block_size", &self.block_size())
            .field("max_blocks", &self.max_blocks())
            .field("config", &self.config)
            .field("global_free_len", &self.global_free_len())
            .finish_non_exhaustive()
    }
}
