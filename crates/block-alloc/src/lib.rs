//! Fixed-size block allocator for highly parallel workloads.
//!
//! This crate provides an allocator that hands out blocks of one fixed size
//! from a single pre-allocated memory pool. It targets hot paths where many
//! worker threads allocate and free objects of the same size (message
//! buffers, connection state) at very high rates and a general-purpose
//! allocator's contention dominates the cost.
//!
//! # Architecture
//!
//! ```text
//!   worker 0           worker 1                worker N
//! ┌────────────┐    ┌────────────┐          ┌────────────┐
//! │ThreadCache │    │ThreadCache │   ...    │ThreadCache │   no locking
//! └─────┬──────┘    └─────┬──────┘          └─────┬──────┘
//!       │ refill / flush (batches of `thread_local_fill` blocks)
//! ┌─────┴─────────────────┴───────────────────────┴──────┐
//! │            global free pool (LockedPool or           │   synchronized
//! │            LockFreePool)                             │
//! └──────────────────────────┬───────────────────────────┘
//! ┌──────────────────────────┴───────────────────────────┐
//! │  memory pool: max_blocks * block_size bytes          │   immutable
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! - The **memory pool** is obtained once when the allocator is created and
//!   released once when it is dropped.
//! - The **global free pool** holds blocks no worker currently caches. Its
//!   synchronization strategy is a type parameter: [`LockedPool`] guards a
//!   FIFO list with a spin lock, [`LockFreePool`] is a tagged Treiber stack.
//! - Each worker owns a [`ThreadCache`]. Most allocations and deallocations
//!   touch only the cache. An empty cache refills `thread_local_fill` blocks
//!   from the global pool; a cache that grows past the high-water mark
//!   flushes back down to `thread_local_fill` blocks.
//!
//! # Usage Examples
//!
//! ## One Worker
//!
//! ```rust
//! use block_alloc::{AllocatorConfig, LockFreeAllocator};
//!
//! let allocator = LockFreeAllocator::new(128, 1024, AllocatorConfig::default()).unwrap();
//! let mut cache = allocator.thread_cache();
//!
//! let block = cache.allocate().unwrap();
//! unsafe {
//!     block.write_bytes(0xff, allocator.block_size());
//!     cache.deallocate(block);
//! }
//! ```
//!
//! ## Many Workers
//!
//! ```rust
//! use std::thread;
//!
//! use block_alloc::{AllocatorConfig, LockedAllocator};
//!
//! let config = AllocatorConfig::default().with_thread_local_fill(64);
//! let allocator = LockedAllocator::new(64, 4096, config).unwrap();
//!
//! thread::scope(|s| {
//!     for _ in 0..4 {
//!         s.spawn(|| {
//!             let mut cache = allocator.thread_cache();
//!             for _ in 0..1000 {
//!                 let block = cache.allocate().unwrap();
//!                 unsafe { cache.deallocate(block) };
//!             }
//!         });
//!     }
//! });
//!
//! // Every cache flushed when its worker finished.
//! assert_eq!(allocator.global_free_len(), 4096);
//! ```
//!
//! # Design Considerations
//!
//! ## Memory Safety
//!
//! Free lists never store links inside blocks. Links live in a side table
//! indexed by block number, so an allocated block's bytes belong entirely to
//! the caller. Deallocation is `unsafe`: callers must ensure that
//!
//! - the pointer came from a cache of the same allocator
//! - the block is not freed twice
//! - the block is not used after it is freed
//!
//! Pointers that do not address a block of the allocator are always
//! rejected with a panic. With the `hardened` feature each block also
//! carries an allocation tag, double frees are rejected as well, and
//! `ThreadCache::try_deallocate` reports violations as errors.
//!
//! ## Out of Memory
//!
//! An allocation fails with [`OutOfMemoryError`] when the calling worker's
//! cache and the global pool are both empty. Blocks parked in other workers'
//! caches are not stolen, so a pool can report exhaustion with fewer than
//! `max_blocks` blocks allocated.
//!
//! ## Strategy Trade-offs
//!
//! | Strategy | Refill | Flush | Order | Progress |
//! |----------|--------|-------|-------|----------|
//! | [`LockedPool`] | O(n) under lock | O(1) under lock | FIFO | blocking |
//! | [`LockFreePool`] | one CAS per block | one CAS per batch | LIFO | lock-free, not starvation-free |
//!
//! # Features
//!
//! - `std` (default): lock waiters yield to the OS scheduler and `tracing`
//!   uses its standard library support.
//! - `hardened`: per-block state tags for double-free detection.

#![no_std]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

extern crate alloc;
#[cfg(any(test, loom))]
extern crate std;

#[cfg(not(target_has_atomic = "64"))]
compile_error!("block-alloc requires 64-bit atomics for the lock-free pool head");

pub use self::{
    allocator::{BlockAllocator, LockFreeAllocator, LockedAllocator},
    config::AllocatorConfig,
    error::{ContractViolation, CreateError, OutOfMemoryError},
    global_pool::{GlobalFreePool, LockFreePool, LockedPool},
    memory_pool::POOL_ALIGN,
    stats::AllocatorStats,
    thread_cache::ThreadCache,
};

mod allocator;
mod block;
mod config;
mod error;
pub mod global_pool;
#[cfg(all(test, loom))]
mod loom_tests;
mod memory_pool;
mod stats;
mod sync;
mod thread_cache;
