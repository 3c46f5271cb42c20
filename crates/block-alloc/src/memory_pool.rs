//! Contiguous backing storage for every block of one allocator.
//!
//! The pool is a single heap allocation of `block_size * block_count` bytes,
//! obtained once and released once. Block `i` starts at
//! `base + i * block_size`; the structure never changes after construction,
//! so block addresses can be computed without synchronization.
//!
//! ```text
//! base                                                  base + len
//! ┌────────────┬────────────┬────────────┬─────┬────────────┐
//! │  block 0   │  block 1   │  block 2   │ ... │ block n-1  │
//! └────────────┴────────────┴────────────┴─────┴────────────┘
//!  <-block_size->
//! ```

use core::{alloc::Layout, ptr::NonNull};

use snafu::{OptionExt as _, ensure};

use crate::{
    block::{BlockIndex, Chain, LinkTable, MAX_BLOCKS},
    error::{
        CreateError, InvalidBlockCountSnafu, PoolAllocationSnafu, PoolTooLargeSnafu,
        ZeroBlockSizeSnafu,
    },
};

/// Alignment of the pool base; one cache line on common targets.
pub const POOL_ALIGN: usize = 64;

pub(crate) struct MemoryPool {
    base: NonNull<u8>,
    layout: Layout,
    block_size: usize,
    links: LinkTable,
    #[cfg(feature = "hardened")]
    states: crate::block::BlockStates,
}

// The pool hands out disjoint blocks; the raw base pointer is only used to
// compute addresses and to release the region on drop.
unsafe impl Send for MemoryPool {}
unsafe impl Sync for MemoryPool {}

impl MemoryPool {
    /// Obtains storage for `block_count` blocks and links them into one
    /// chain, ready to seed the global free pool.
    pub(crate) fn new(block_size: usize, block_count: usize) -> Result<(Self, Chain), CreateError> {
        ensure!(block_size > 0, ZeroBlockSizeSnafu);
        ensure!(
            block_count > 0 && block_count <= MAX_BLOCKS,
            InvalidBlockCountSnafu {
                max_blocks: block_count,
                max: MAX_BLOCKS,
            }
        );

        let layout = block_size
            .checked_mul(block_count)
            .and_then(|size| Layout::from_size_align(size, POOL_ALIGN).ok())
            .context(PoolTooLargeSnafu {
                block_size,
                max_blocks: block_count,
            })?;

        let base = unsafe { alloc::alloc::alloc(layout) };
        let base = NonNull::new(base).context(PoolAllocationSnafu { layout })?;

        let (links, chain) = LinkTable::chained(block_count);
        let pool = Self {
            base,
            layout,
            block_size,
            links,
            #[cfg(feature = "hardened")]
            states: crate::block::BlockStates::new(block_count),
        };
        Ok((pool, chain))
    }

    pub(crate) fn block_size(&self) -> usize {
        self.block_size
    }

    pub(crate) fn block_count(&self) -> usize {
        self.links.len()
    }

    pub(crate) fn links(&self) -> &LinkTable {
        &self.links
    }

    #[cfg(feature = "hardened")]
    pub(crate) fn states(&self) -> &crate::block::BlockStates {
        &self.states
    }

    /// Address of the first byte of block `index`.
    pub(crate) fn block_ptr(&self, index: BlockIndex) -> NonNull<u8> {
        assert!(index.get() < self.block_count());
        unsafe { self.base.add(index.get() * self.block_size) }
    }

    /// Maps a block address back to its index.
    ///
    /// Returns `None` for addresses outside the pool or not on a block
    /// boundary.
    pub(crate) fn index_of(&self, ptr: NonNull<u8>) -> Option<BlockIndex> {
        let offset = ptr.addr().get().checked_sub(self.base.addr().get())?;
        if offset >= self.layout.size() || offset % self.block_size != 0 {
            return None;
        }
        Some(BlockIndex::new(offset / self.block_size))
    }

    /// Returns `true` if `ptr` is the start of one of this pool's blocks.
    pub(crate) fn contains(&self, ptr: NonNull<u8>) -> bool {
        self.index_of(ptr).is_some()
    }
}

impl Drop for MemoryPool {
    fn drop(&mut self) {
        unsafe { alloc::alloc::dealloc(self.base.as_ptr(), self.layout) }
    }
}
