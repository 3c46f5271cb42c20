//! Block indices and the free-list link table.
//!
//! Free lists never store links inside the blocks themselves. Each block `i`
//! owns slot `i` of a [`LinkTable`], an array of atomic `u32` indices, so a
//! block's payload bytes belong to the caller alone while it is allocated
//! and a stale reader racing a lock-free pop only ever observes an index,
//! never caller data.
//!
//! ```text
//! pool:   [ block 0 ][ block 1 ][ block 2 ][ block 3 ]
//! links:  [    2    ][   NIL   ][    1    ][    0    ]
//!
//! chain { head: 3, tail: 1, len: 4 }  =  3 -> 0 -> 2 -> 1
//! ```

use core::fmt;

use alloc::boxed::Box;

use crate::sync::atomic::{AtomicU32, Ordering};

/// Largest number of blocks a single pool can manage.
///
/// `u32::MAX` itself is reserved as the list terminator.
pub(crate) const MAX_BLOCKS: usize = u32::MAX as usize;

/// Index of a block inside its memory pool.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockIndex(u32);

impl BlockIndex {
    /// Terminator of every chain; never a valid block.
    pub(crate) const NIL: Self = Self(u32::MAX);

    #[expect(clippy::cast_possible_truncation)]
    pub(crate) const fn new(index: usize) -> Self {
        assert!(index < MAX_BLOCKS);
        Self(index as u32)
    }

    pub(crate) const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub(crate) const fn raw(self) -> u32 {
        self.0
    }

    pub(crate) const fn get(self) -> usize {
        self.0 as usize
    }

    pub(crate) const fn is_nil(self) -> bool {
        self.0 == Self::NIL.0
    }
}

impl fmt::Debug for BlockIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nil() {
            f.write_str("NIL")
        } else {
            write!(f, "#{}", self.0)
        }
    }
}

/// A non-empty, privately owned run of linked free blocks.
///
/// Whoever holds a `Chain` is the only party allowed to rewrite the links of
/// its blocks. `tail`'s link is not guaranteed to be [`BlockIndex::NIL`]
/// until the chain is adopted by a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chain {
    pub(crate) head: BlockIndex,
    pub(crate) tail: BlockIndex,
    pub(crate) len: usize,
}

impl Chain {
    pub(crate) fn new(head: BlockIndex, tail: BlockIndex, len: usize) -> Self {
        assert!(!head.is_nil() && !tail.is_nil());
        assert!(len > 0);
        Self { head, tail, len }
    }
}

/// `next` links of every block in a pool.
///
/// Links are atomics so that a lock-free pop may read the successor of a
/// node another thread has just privatized; such a read only yields a stale
/// index, which the tagged head CAS then rejects. All accesses are `Relaxed`:
/// ordering is provided by the lock or by the head CAS of the free pool.
pub struct LinkTable {
    next: Box<[AtomicU32]>,
}

impl LinkTable {
    /// Creates a table for `len` blocks where block `i` links to `i + 1`
    /// and the last block terminates the chain.
    pub(crate) fn chained(len: usize) -> (Self, Chain) {
        assert!(len > 0 && len <= MAX_BLOCKS);
        let next = (0..len)
            .map(|i| {
                let succ = if i + 1 < len {
                    BlockIndex::new(i + 1)
                } else {
                    BlockIndex::NIL
                };
                AtomicU32::new(succ.raw())
            })
            .collect();
        let chain = Chain::new(BlockIndex::new(0), BlockIndex::new(len - 1), len);
        (Self { next }, chain)
    }

    pub(crate) fn len(&self) -> usize {
        self.next.len()
    }

    #[inline]
    pub(crate) fn next(&self, index: BlockIndex) -> BlockIndex {
        BlockIndex::from_raw(self.next[index.get()].load(Ordering::Relaxed))
    }

    #[inline]
    pub(crate) fn set_next(&self, index: BlockIndex, next: BlockIndex) {
        self.next[index.get()].store(next.raw(), Ordering::Relaxed);
    }

    /// Follows `steps` links starting at `from`.
    ///
    /// # Panics
    ///
    /// Panics if the chain ends before `steps` links were followed.
    pub(crate) fn advance(&self, from: BlockIndex, steps: usize) -> BlockIndex {
        let mut current = from;
        for _ in 0..steps {
            current = self.next(current);
            assert!(!current.is_nil(), "free list shorter than its count");
        }
        current
    }

    /// Splits the first `count` blocks off the list starting at `head`.
    ///
    /// Returns the detached chain (terminated) and the new list head.
    pub(crate) fn split_front(&self, head: BlockIndex, count: usize) -> (Chain, BlockIndex) {
        assert!(count > 0);
        let tail = self.advance(head, count - 1);
        let rest = self.next(tail);
        self.set_next(tail, BlockIndex::NIL);
        (Chain::new(head, tail, count), rest)
    }
}

/// Per-block ownership tags used to detect double frees.
#[cfg(feature = "hardened")]
pub(crate) struct BlockStates {
    states: Box<[crate::sync::atomic::AtomicU8]>,
}

#[cfg(feature = "hardened")]
impl BlockStates {
    const FREE: u8 = 0;
    const ALLOCATED: u8 = 1;

    pub(crate) fn new(len: usize) -> Self {
        let states = (0..len)
            .map(|_| crate::sync::atomic::AtomicU8::new(Self::FREE))
            .collect();
        Self { states }
    }

    /// Marks a block handed out to a caller.
    pub(crate) fn acquire(&self, index: BlockIndex) {
        let prev = self.states[index.get()].swap(Self::ALLOCATED, Ordering::Relaxed);
        assert_eq!(prev, Self::FREE, "free list yielded allocated block {index:?}");
    }

    /// Marks a block returned by a caller; `false` if it was not allocated.
    pub(crate) fn release(&self, index: BlockIndex) -> bool {
        self.states[index.get()]
            .compare_exchange(
                Self::ALLOCATED,
                Self::FREE,
                Ordering::Relaxed,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    #[cfg(test)]
    pub(crate) fn is_allocated(&self, index: BlockIndex) -> bool {
        self.states[index.get()].load(Ordering::Relaxed) == Self::ALLOCATED
    }
}
