//! Treiber stack over block indices.
//!
//! The head word is `(tag << 32) | index`. Every successful CAS bumps the
//! tag, so a head that was popped and pushed back between a reader's load
//! and its CAS no longer compares equal. The tag is 32 bits wide and wraps;
//! an ABA failure would need one thread to stall across exactly 2^32 head
//! updates that end on the same index.
//!
//! A pop only reads the link of a block it does not own yet. Links live in
//! the atomic [`LinkTable`], so a stale read yields an outdated index that
//! the failing CAS discards.
//!
//! There is no fairness: a thread can lose the head CAS indefinitely under
//! sustained contention.

use crate::{
    block::{BlockIndex, Chain, LinkTable},
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        spin_loop,
    },
};

use super::GlobalFreePool;

/// Lock-free global free pool.
///
/// Batches are pushed with one CAS and become the new top of the stack, so
/// recently flushed blocks are reused first.
pub struct LockFreePool {
    head: AtomicU64,
    len: AtomicUsize,
}

fn pack(index: BlockIndex, tag: u32) -> u64 {
    (u64::from(tag) << 32) | u64::from(index.raw())
}

#[expect(clippy::cast_possible_truncation)]
fn unpack(word: u64) -> (BlockIndex, u32) {
    (BlockIndex::from_raw(word as u32), (word >> 32) as u32)
}

impl LockFreePool {
    fn pop_one(&self, links: &LinkTable) -> Option<BlockIndex> {
        let mut current = self.head.load(Ordering::Acquire);
        loop {
            let (index, tag) = unpack(current);
            if index.is_nil() {
                return None;
            }
            let next = pack(links.next(index), tag.wrapping_add(1));
            match self.head.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(index),
                Err(actual) => {
                    current = actual;
                    spin_loop();
                }
            }
        }
    }
}

impl GlobalFreePool for LockFreePool {
    const NAME: &'static str = "lock-free";

    fn new(initial: Chain) -> Self {
        Self {
            head: AtomicU64::new(pack(initial.head, 0)),
            len: AtomicUsize::new(initial.len),
        }
    }

    fn try_pop_batch(&self, links: &LinkTable, max: usize) -> Option<Chain> {
        let mut head = BlockIndex::NIL;
        let mut tail = BlockIndex::NIL;
        let mut count = 0;
        while count < max {
            let Some(index) = self.pop_one(links) else {
                break;
            };
            if count == 0 {
                head = index;
            } else {
                links.set_next(tail, index);
            }
            tail = index;
            count += 1;
        }
        if count == 0 {
            return None;
        }

        links.set_next(tail, BlockIndex::NIL);
        self.len.fetch_sub(count, Ordering::Relaxed);
        Some(Chain::new(head, tail, count))
    }

    fn push_batch(&self, links: &LinkTable, chain: Chain) {
        // Counted before publishing so the counter never drops below the
        // number of blocks actually reachable from the head.
        self.len.fetch_add(chain.len, Ordering::Relaxed);

        let mut current = self.head.load(Ordering::Relaxed);
        loop {
            let (top, tag) = unpack(current);
            links.set_next(chain.tail, top);
            let next = pack(chain.head, tag.wrapping_add(1));
            match self.head.compare_exchange_weak(
                current,
                next,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => {
                    current = actual;
                    spin_loop();
                }
            }
        }
    }

    fn approximate_len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }
}
