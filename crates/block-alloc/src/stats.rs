//! Diagnostic counters of the refill and flush paths.
//!
//! All counters use `Relaxed` ordering and are only eventually consistent;
//! a snapshot taken while workers run may mix counts from different
//! moments. The allocator never reads them to make decisions.

use crate::sync::atomic::{AtomicUsize, Ordering};

struct Counter(AtomicUsize);

impl Counter {
    fn new() -> Self {
        Self(AtomicUsize::new(0))
    }

    #[inline]
    fn add(&self, val: usize) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    #[inline]
    fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }
}

pub(crate) struct StatsCounters {
    refills: Counter,
    refilled_blocks: Counter,
    flushes: Counter,
    flushed_blocks: Counter,
    exhausted: Counter,
}

impl StatsCounters {
    pub(crate) fn new() -> Self {
        Self {
            refills: Counter::new(),
            refilled_blocks: Counter::new(),
            flushes: Counter::new(),
            flushed_blocks: Counter::new(),
            exhausted: Counter::new(),
        }
    }

    pub(crate) fn record_refill(&self, blocks: usize) {
        self.refills.add(1);
        self.refilled_blocks.add(blocks);
    }

    pub(crate) fn record_flush(&self, blocks: usize) {
        self.flushes.add(1);
        self.flushed_blocks.add(blocks);
    }

    pub(crate) fn record_exhausted(&self) {
        self.exhausted.add(1);
    }

    pub(crate) fn snapshot(&self) -> AllocatorStats {
        AllocatorStats {
            refills: self.refills.get(),
            refilled_blocks: self.refilled_blocks.get(),
            flushes: self.flushes.get(),
            flushed_blocks: self.flushed_blocks.get(),
            exhausted: self.exhausted.get(),
        }
    }
}

/// Point-in-time copy of an allocator's diagnostic counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Number of times a worker cache pulled a batch from the global pool.
    pub refills: usize,
    /// Total blocks moved from the global pool into worker caches.
    pub refilled_blocks: usize,
    /// Number of batches returned to the global pool.
    pub flushes: usize,
    /// Total blocks moved from worker caches back to the global pool.
    pub flushed_blocks: usize,
    /// Number of allocations that failed with
    /// [`OutOfMemoryError`](crate::OutOfMemoryError).
    pub exhausted: usize,
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_accumulates() {
        let counters = StatsCounters::new();
        assert_eq!(counters.snapshot(), AllocatorStats::default());

        counters.record_refill(8);
        counters.record_refill(3);
        counters.record_flush(5);
        counters.record_exhausted();

        assert_eq!(
            counters.snapshot(),
            AllocatorStats {
                refills: 2,
                refilled_blocks: 11,
                flushes: 1,
                flushed_blocks: 5,
                exhausted: 1,
            }
        );
    }
}
