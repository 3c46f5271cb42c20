use crate::{
    block::{BlockIndex, Chain, LinkTable},
    sync::Mutex,
};

use super::GlobalFreePool;

/// Global free pool guarded by a single spin lock.
///
/// Blocks leave from the head and are returned at the tail, so the pool
/// behaves as a FIFO queue of blocks. Workers only contend on the lock while
/// refilling or flushing their caches.
pub struct LockedPool {
    list: Mutex<FreeList>,
}

struct FreeList {
    head: BlockIndex,
    tail: BlockIndex,
    len: usize,
}

impl GlobalFreePool for LockedPool {
    const NAME: &'static str = "locked";

    fn new(initial: Chain) -> Self {
        Self {
            list: Mutex::new(FreeList {
                head: initial.head,
                tail: initial.tail,
                len: initial.len,
            }),
        }
    }

    fn try_pop_batch(&self, links: &LinkTable, max: usize) -> Option<Chain> {
        let mut list = self.list.lock();
        if list.len == 0 || max == 0 {
            return None;
        }

        let count = usize::min(max, list.len);
        let (chain, rest) = links.split_front(list.head, count);
        list.head = rest;
        list.len -= count;
        if list.len == 0 {
            list.tail = BlockIndex::NIL;
        }
        Some(chain)
    }

    fn push_batch(&self, links: &LinkTable, chain: Chain) {
        links.set_next(chain.tail, BlockIndex::NIL);

        let mut list = self.list.lock();
        if list.len == 0 {
            list.head = chain.head;
        } else {
            links.set_next(list.tail, chain.head);
        }
        list.tail = chain.tail;
        list.len += chain.len;
    }

    fn approximate_len(&self) -> usize {
        self.list.lock().len
    }
}
