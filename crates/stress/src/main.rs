use std::{
    collections::{HashSet, VecDeque},
    process,
    ptr::NonNull,
    slice,
    str::FromStr,
    thread,
    time::Instant,
};

use argh::FromArgs;
use block_alloc::{
    AllocatorConfig, BlockAllocator, GlobalFreePool, LockFreePool, LockedPool, ThreadCache,
};
use snafu::{ResultExt as _, ensure_whatever, whatever};
use snafu_utils::{GenericError, Report};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Hammer a fixed-size block allocator from many threads, then check that
/// every block is back in the global pool exactly once.
#[derive(Debug, FromArgs)]
struct Args {
    /// global free pool strategy, `locked` or `lock-free`
    #[argh(option, default = "Strategy::LockFree")]
    strategy: Strategy,
    /// number of worker threads
    #[argh(option, default = "64")]
    threads: usize,
    /// allocations per worker
    #[argh(option, default = "20_000")]
    iterations: usize,
    /// size of each block in bytes
    #[argh(option, default = "64")]
    block_size: usize,
    /// number of blocks in the pool
    #[argh(option, default = "1_000_000")]
    max_blocks: usize,
    /// blocks moved per refill and kept after a flush
    #[argh(option, default = "AllocatorConfig::DEFAULT_THREAD_LOCAL_FILL")]
    fill: usize,
    /// cache size, as a multiple of the fill, that triggers a flush
    #[argh(option, default = "AllocatorConfig::DEFAULT_FLUSH_RATIO")]
    flush_ratio: f64,
    /// blocks each worker keeps live before freeing the oldest one
    #[argh(option, default = "0")]
    hold: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
enum Strategy {
    #[display("locked")]
    Locked,
    #[display("lock-free")]
    LockFree,
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "locked" => Ok(Self::Locked),
            "lock-free" => Ok(Self::LockFree),
            _ => Err(format!(
                "unknown strategy `{s}`, expected `locked` or `lock-free`"
            )),
        }
    }
}

fn main() {
    let args: Args = argh::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run(&args) {
        let report = Report::new(err);
        eprintln!("{report}");
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), GenericError> {
    let config = AllocatorConfig::default()
        .with_thread_local_fill(args.fill)
        .with_flush_ratio(args.flush_ratio);
    match args.strategy {
        Strategy::Locked => stress::<LockedPool>(args, config),
        Strategy::LockFree => stress::<LockFreePool>(args, config),
    }
}

fn stress<P: GlobalFreePool>(args: &Args, config: AllocatorConfig) -> Result<(), GenericError> {
    let allocator = BlockAllocator::<P>::new(args.block_size, args.max_blocks, config)
        .whatever_context("failed to create block allocator")?;
    info!(
        strategy = %args.strategy,
        threads = args.threads,
        iterations = args.iterations,
        block_size = args.block_size,
        max_blocks = args.max_blocks,
        high_water_mark = allocator.high_water_mark(),
        "starting stress run"
    );

    let start = Instant::now();
    let results = thread::scope(|s| {
        let allocator = &allocator;
        let handles = (0..args.threads)
            .map(|worker| s.spawn(move || run_worker(allocator, worker, args)))
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|handle| handle.join())
            .collect::<Vec<_>>()
    });
    let elapsed = start.elapsed();

    for (worker, result) in results.into_iter().enumerate() {
        let Ok(result) = result else {
            whatever!("worker {worker} panicked");
        };
        result.with_whatever_context(|_| format!("worker {worker} failed"))?;
    }

    verify(&allocator)?;

    let stats = allocator.stats();
    info!(
        ?elapsed,
        refills = stats.refills,
        refilled_blocks = stats.refilled_blocks,
        flushes = stats.flushes,
        flushed_blocks = stats.flushed_blocks,
        exhausted = stats.exhausted,
        "stress run passed"
    );
    Ok(())
}

fn run_worker<P: GlobalFreePool>(
    allocator: &BlockAllocator<P>,
    worker: usize,
    args: &Args,
) -> Result<(), GenericError> {
    #[expect(clippy::cast_possible_truncation)]
    let pattern = worker as u8;
    let mut cache = allocator.thread_cache();
    let mut held = VecDeque::with_capacity(args.hold + 1);

    for iteration in 0..args.iterations {
        let block = cache
            .allocate()
            .with_whatever_context(|_| format!("allocation {iteration} failed"))?;
        unsafe { block.write_bytes(pattern, allocator.block_size()) };
        held.push_back(block);

        while held.len() > args.hold {
            let Some(block) = held.pop_front() else {
                break;
            };
            release(&mut cache, block, pattern)?;
        }
    }
    for block in held {
        release(&mut cache, block, pattern)?;
    }

    debug!(worker, cached = cache.len(), "worker finished");
    Ok(())
}

fn release<P: GlobalFreePool>(
    cache: &mut ThreadCache<'_, P>,
    block: NonNull<u8>,
    pattern: u8,
) -> Result<(), GenericError> {
    let block_size = cache.allocator().block_size();
    let bytes = unsafe { slice::from_raw_parts(block.as_ptr(), block_size) };
    ensure_whatever!(
        bytes.iter().all(|&b| b == pattern),
        "block {block:p} was overwritten while held"
    );
    unsafe { cache.deallocate(block) };
    Ok(())
}

/// Drains the pool through a fresh cache and checks every block comes out
/// exactly once.
fn verify<P: GlobalFreePool>(allocator: &BlockAllocator<P>) -> Result<(), GenericError> {
    let max_blocks = allocator.max_blocks();
    let free = allocator.global_free_len();
    ensure_whatever!(
        free == max_blocks,
        "global pool holds {free} of {max_blocks} blocks after all workers finished"
    );

    let mut cache = allocator.thread_cache();
    let mut seen = HashSet::with_capacity(max_blocks);
    let mut blocks = Vec::with_capacity(max_blocks);
    while let Ok(block) = cache.allocate() {
        ensure_whatever!(seen.insert(block), "block {block:p} handed out twice");
        blocks.push(block);
    }
    ensure_whatever!(
        blocks.len() == max_blocks,
        "drained {} of {max_blocks} blocks",
        blocks.len()
    );

    for block in blocks {
        unsafe { cache.deallocate(block) };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_args(strategy: Strategy) -> Args {
        Args {
            strategy,
            threads: 8,
            iterations: 2_000,
            block_size: 24,
            max_blocks: 4_096,
            fill: 16,
            flush_ratio: 1.5,
            hold: 3,
        }
    }

    #[test]
    fn test_strategy_parses_its_display() {
        for strategy in [Strategy::Locked, Strategy::LockFree] {
            assert_eq!(strategy.to_string().parse::<Strategy>(), Ok(strategy));
        }
        assert!("mutex".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_small_runs_pass() {
        run(&small_args(Strategy::Locked)).unwrap();
        run(&small_args(Strategy::LockFree)).unwrap();
    }

    #[test]
    fn test_bad_config_is_reported() {
        let args = Args {
            flush_ratio: 0.5,
            ..small_args(Strategy::Locked)
        };
        let err = run(&args).unwrap_err();
        let rendered = Report::new(err).to_string();
        assert!(rendered.starts_with("Error: failed to create block allocator\n"));
        assert!(rendered.contains("flush ratio must be"));
    }

    #[test]
    fn test_exhaustion_fails_the_run() {
        let args = Args {
            max_blocks: 8,
            fill: 4,
            hold: 16,
            ..small_args(Strategy::LockFree)
        };
        let err = run(&args).unwrap_err();
        assert!(Report::new(err).to_string().contains("failed"));
    }
}
