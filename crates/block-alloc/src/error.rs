use core::alloc::Layout;

use snafu::Snafu;
use snafu_utils::Location;

/// Errors that prevent an allocator from being constructed.
///
/// No partially built allocator survives any of these.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum CreateError {
    #[snafu(display("block size must be at least one byte"))]
    ZeroBlockSize {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("block count must be in 1..={max}, got {max_blocks}"))]
    InvalidBlockCount {
        max_blocks: usize,
        max: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("thread-local fill must be at least one block"))]
    ZeroThreadLocalFill {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("flush ratio must be a finite number greater than 1.0, got {flush_ratio}"))]
    InvalidFlushRatio {
        flush_ratio: f64,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display(
        "memory pool of {max_blocks} blocks of {block_size} bytes exceeds the address space"
    ))]
    PoolTooLarge {
        block_size: usize,
        max_blocks: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("failed to obtain backing storage for the memory pool, layout: {layout:?}"))]
    PoolAllocation {
        layout: Layout,
        #[snafu(implicit)]
        location: Location,
    },
}

/// Both the calling worker's cache and the global free pool are exhausted.
///
/// The allocator does not retry; the caller decides whether to wait, fall
/// back to another allocator, or give up.
#[derive(Debug, Snafu)]
#[snafu(
    display("all {max_blocks} blocks are allocated or held by other workers' caches"),
    visibility(pub(crate))
)]
pub struct OutOfMemoryError {
    max_blocks: usize,
    #[snafu(implicit)]
    location: Location,
}

impl OutOfMemoryError {
    /// Capacity of the exhausted allocator.
    #[must_use]
    pub fn max_blocks(&self) -> usize {
        self.max_blocks
    }
}

/// A deallocation that breaks the allocator's contract.
///
/// Foreign pointers are always detected. Double frees are only detected
/// when the crate is built with the `hardened` feature.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum ContractViolation {
    #[snafu(display("pointer {addr:#x} was not handed out by this allocator"))]
    ForeignPointer {
        addr: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("block {index} at {addr:#x} was freed while not allocated"))]
    DoubleFree {
        index: usize,
        addr: usize,
        #[snafu(implicit)]
        location: Location,
    },
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(all(test, not(loom)))]
mod tests {
    use alloc::string::ToString as _;

    use super::*;

    #[test]
    fn test_display_messages() {
        let err = InvalidBlockCountSnafu {
            max_blocks: 0_usize,
            max: 10_usize,
        }
        .build();
        assert_eq!(err.to_string(), "block count must be in 1..=10, got 0");

        let err = OutOfMemorySnafu { max_blocks: 4_usize }.build();
        assert_eq!(err.max_blocks(), 4);
        assert_eq!(
            err.to_string(),
            "all 4 blocks are allocated or held by other workers' caches"
        );

        let err = ForeignPointerSnafu { addr: 0x40_usize }.build();
        assert_eq!(
            err.to_string(),
            "pointer 0x40 was not handed out by this allocator"
        );
    }
}
