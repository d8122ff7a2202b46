//! The assembled cache object.
//!
//! [`Cache`] wires the metadata graph, free list, eviction policy, lock
//! managers and collaborator policies together, and carries the handful of
//! cache-global atomics: the running flag, the fallback pass-through error
//! counter, and the last-access clock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

use tracing::info;

use crate::cleaner::Cleaner;
use crate::common::ConfigError;
use crate::concurrency::CacheLineLocks;
use crate::config::CacheConfig;
use crate::eviction::{self, EvictionPolicy};
use crate::freelist::FreeList;
use crate::metadata::Metadata;
use crate::promotion::PromotionPolicy;
use crate::stats::CacheStats;

/// A block-level cache engine instance.
pub struct Cache {
    /// Validated configuration this cache was built from.
    pub config: CacheConfig,
    /// Line arena, collision index, partitions, and their locks.
    pub metadata: Metadata,
    /// Free slot allocator.
    pub freelist: FreeList,
    /// Recency bookkeeping and victim selection.
    pub eviction: Box<dyn EvictionPolicy>,
    /// Per-cache-line lock manager.
    pub cl_locks: CacheLineLocks,
    /// External promotion decider.
    pub promotion: Arc<dyn PromotionPolicy>,
    /// External dirty-line writeback subsystem.
    pub cleaner: Arc<dyn Cleaner>,
    /// Cache-scope statistic counters.
    pub stats: CacheStats,
    running: AtomicBool,
    fallback_pt_errors: AtomicU32,
    last_access_ms: AtomicU64,
    started: Instant,
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("config", &self.config)
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Cache {
    /// Builds a cache from a validated configuration and its collaborators.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the configuration fails validation.
    pub fn new(
        config: CacheConfig,
        promotion: Arc<dyn PromotionPolicy>,
        cleaner: Arc<dyn Cleaner>,
    ) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;
        let metadata = Metadata::new(&config);
        let freelist = FreeList::new(config.cache_lines);
        let policy = eviction::build(config.eviction, config.cache_lines, config.partitions.len());
        let cl_locks = CacheLineLocks::new(config.cache_lines);
        Ok(Arc::new(Self {
            config,
            metadata,
            freelist,
            eviction: policy,
            cl_locks,
            promotion,
            cleaner,
            stats: CacheStats::new(),
            running: AtomicBool::new(true),
            fallback_pt_errors: AtomicU32::new(0),
            last_access_ms: AtomicU64::new(0),
            started: Instant::now(),
        }))
    }

    /// Whether the cache is running (not stopped by a fatal error report).
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Sets the running flag.
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    /// Counts one pass-through fallback error.
    ///
    /// Crossing the configured threshold is reported exactly once; with no
    /// threshold configured the counter still counts but never reports.
    pub fn note_fallback_pt_error(&self) {
        let count = self.fallback_pt_errors.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(threshold) = self.config.fallback_pt_threshold {
            if count == threshold {
                info!(threshold, "error threshold reached, fallback pass-through activated");
            }
        }
    }

    /// Pass-through fallback errors counted so far.
    pub fn fallback_pt_errors(&self) -> u32 {
        self.fallback_pt_errors.load(Ordering::Acquire)
    }

    /// Refreshes the last-access clock (non-internal request enqueued).
    pub fn touch_last_access(&self) {
        self.last_access_ms
            .store(self.started.elapsed().as_millis() as u64, Ordering::Release);
    }

    /// Milliseconds from cache creation to the most recent enqueue.
    pub fn last_access_ms(&self) -> u64 {
        self.last_access_ms.load(Ordering::Acquire)
    }
}
