//! Tuning knobs shared by every worker cache of one allocator.

use snafu::ensure;

use crate::error::{CreateError, InvalidFlushRatioSnafu, ZeroThreadLocalFillSnafu};

/// Configuration of the per-worker caching layer.
///
/// # Examples
///
/// ```
/// use block_alloc::AllocatorConfig;
///
/// let config = AllocatorConfig::default()
///     .with_thread_local_fill(100)
///     .with_flush_ratio(1.5);
/// assert_eq!(config.high_water_mark(), 150);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AllocatorConfig {
    /// Number of blocks moved from the global pool into an empty cache, and
    /// the number a cache keeps after flushing.
    pub thread_local_fill: usize,
    /// Multiplier on `thread_local_fill` giving the cache size above which a
    /// cache flushes back to the global pool. Must be greater than `1.0`.
    pub flush_ratio: f64,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            thread_local_fill: Self::DEFAULT_THREAD_LOCAL_FILL,
            flush_ratio: Self::DEFAULT_FLUSH_RATIO,
        }
    }
}

impl AllocatorConfig {
    pub const DEFAULT_THREAD_LOCAL_FILL: usize = 1024;
    pub const DEFAULT_FLUSH_RATIO: f64 = 1.5;

    #[must_use]
    pub fn with_thread_local_fill(mut self, thread_local_fill: usize) -> Self {
        self.thread_local_fill = thread_local_fill;
        self
    }

    #[must_use]
    pub fn with_flush_ratio(mut self, flush_ratio: f64) -> Self {
        self.flush_ratio = flush_ratio;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), CreateError> {
        ensure!(self.thread_local_fill > 0, ZeroThreadLocalFillSnafu);
        ensure!(
            self.flush_ratio.is_finite() && self.flush_ratio > 1.0,
            InvalidFlushRatioSnafu {
                flush_ratio: self.flush_ratio
            }
        );
        Ok(())
    }

    /// Cache size above which a cache flushes, `⌊thread_local_fill × flush_ratio⌋`.
    ///
    /// Never below `thread_local_fill`, so a cache that crosses the mark
    /// always has blocks to give back.
    #[must_use]
    #[expect(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn high_water_mark(&self) -> usize {
        let scaled = (self.thread_local_fill as f64 * self.flush_ratio) as usize;
        // Only fills past f64 precision can round below the fill.
        usize::max(scaled, self.thread_local_fill)
    }
}
