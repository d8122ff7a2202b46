//! Engine and configuration error definitions.
//!
//! Recoverable failures surface as [`EngineError`] through request completion
//! callbacks or latched request state; configuration problems surface as
//! [`ConfigError`] before a cache is built. Invariant violations are
//! programmer errors and crash via assertions rather than appearing here.

use thiserror::Error;

/// Errors a request can complete with or latch during preparation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Cache line mapping failed; the request must fall back to pass-through.
    ///
    /// Raised when the promotion policy declines the insertion, the target
    /// partition is disabled, the partition is full and eviction could not
    /// reclaim enough lines, or the free list was exhausted mid-mapping.
    #[error("cache line mapping failed; request falls back to pass-through")]
    Mapping,

    /// The mapping diverged while the request was parked on a deferred lock.
    ///
    /// Detected by the refresh pass after a cache line lock grant; the
    /// request completes with this error and its locks are released.
    #[error("cache line mapping diverged while the request was parked")]
    InconsistentRequest,

    /// The background cleaner reported a failure for this request.
    ///
    /// The associated value is the cleaner's error code.
    #[error("cleaner failed with code {0}")]
    Clean(i32),
}

/// Errors detected while validating a [`CacheConfig`](crate::config::CacheConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The cache must have at least one cache line slot.
    #[error("cache must have at least one cache line")]
    NoCacheLines,

    /// The hash index must have at least one bucket.
    #[error("cache must have at least one hash bucket")]
    NoHashBuckets,

    /// Sectors per line outside `1..=64`.
    #[error("sectors per line must be in 1..=64, got {0}")]
    BadLineSectors(u8),

    /// The partition table may not be empty.
    #[error("at least one partition must be configured")]
    NoPartitions,

    /// More partitions than a `PartitionId` can address.
    #[error("too many partitions: {0} (max 256)")]
    TooManyPartitions(usize),

    /// The configuration JSON failed to parse.
    #[error("invalid cache configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
