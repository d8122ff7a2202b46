//! Test harness: a small deterministic cache plus request builders.

use std::sync::Arc;

use blkcache_core::Cache;
use blkcache_core::common::{CacheLineIdx, CoreId, CoreLine, PartitionId};
use blkcache_core::config::CacheConfig;
use blkcache_core::engine::{DefaultCallbacks, LockType};
use blkcache_core::promotion::{AlwaysPromote, PromotionPolicy};
use blkcache_core::request::{Direction, NopKicker, Request, RequestDesc, RequestQueue};

use super::mocks::MockCleaner;

/// The geometry every scenario test assumes: 16 slots, 8 buckets,
/// 4-sector (2 KiB) lines, one open partition.
pub fn small_config() -> CacheConfig {
    CacheConfig {
        cache_lines: 16,
        hash_buckets: 8,
        line_sectors: 4,
        ..CacheConfig::default()
    }
}

/// A cache wired to mocks, with request builders and residency fixtures.
pub struct TestContext {
    pub cache: Arc<Cache>,
    pub queue: Arc<RequestQueue>,
    pub cleaner: Arc<MockCleaner>,
}

impl TestContext {
    /// Small cache, always-approving promotion.
    pub fn new() -> Self {
        Self::build(small_config(), Arc::new(AlwaysPromote))
    }

    /// Small cache with a custom promotion policy.
    pub fn with_promotion(promotion: Arc<dyn PromotionPolicy>) -> Self {
        Self::build(small_config(), promotion)
    }

    /// Custom geometry, always-approving promotion.
    pub fn with_config(config: CacheConfig) -> Self {
        Self::build(config, Arc::new(AlwaysPromote))
    }

    pub fn build(config: CacheConfig, promotion: Arc<dyn PromotionPolicy>) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let cleaner = Arc::new(MockCleaner::default());
        let cache =
            Cache::new(config, promotion, cleaner.clone()).expect("valid test configuration");
        let queue = Arc::new(RequestQueue::new(Box::new(NopKicker)));
        Self {
            cache,
            queue,
            cleaner,
        }
    }

    /// Descriptor covering core lines `[first, first + count)` end to end.
    pub fn full_line_desc(
        &self,
        core: u16,
        first: u64,
        count: u32,
        direction: Direction,
    ) -> RequestDesc {
        let line_bytes = self.cache.config.line_bytes();
        RequestDesc {
            core_id: CoreId::new(core),
            byte_position: first * line_bytes,
            byte_length: (u64::from(count) * line_bytes) as u32,
            direction,
            part_id: PartitionId::new(0),
            internal: false,
        }
    }

    /// Builds a request with the given descriptor and lock mode.
    pub fn request_with(&self, desc: RequestDesc, lock: LockType) -> Box<Request> {
        Request::new(
            &self.cache.config,
            desc,
            Arc::clone(&self.queue),
            Arc::new(DefaultCallbacks { lock }),
        )
    }

    /// Read request over full core lines `[first, first + count)` on core 0.
    pub fn read_request(&self, first: u64, count: u32) -> Box<Request> {
        self.request_with(
            self.full_line_desc(0, first, count, Direction::Read),
            LockType::Read,
        )
    }

    /// Write request over full core lines `[first, first + count)` on core 0.
    pub fn write_request(&self, first: u64, count: u32) -> Box<Request> {
        self.request_with(
            self.full_line_desc(0, first, count, Direction::Write),
            LockType::Write,
        )
    }

    /// Makes `(core, core_line)` resident in `part`, all sectors valid.
    ///
    /// Slots come off the free list in ascending order, so residency lands
    /// deterministically: the n-th insertion occupies slot n.
    pub fn insert_resident_in(&self, part: u8, core: u16, core_line: u64) -> CacheLineIdx {
        let cache = &self.cache;
        let line = cache.freelist.take().expect("a free line for the fixture");
        let part = PartitionId::new(part);
        cache.metadata.partitions.add_line(part);
        cache.metadata.table.set_partition_id(line, part);
        let bucket = cache
            .metadata
            .hash
            .bucket_of(CoreLine::new(core_line), CoreId::new(core));
        cache
            .metadata
            .add_to_collision(bucket, line, CoreId::new(core), CoreLine::new(core_line));
        cache.eviction.init_line(part, line);
        cache.eviction.touch_hot(line);
        cache
            .metadata
            .table
            .set_valid_sec(line, 0, cache.config.line_end_sector());
        line
    }

    /// Makes `(core 0, core_line)` resident in partition 0, fully valid.
    pub fn insert_resident(&self, core: u16, core_line: u64) -> CacheLineIdx {
        self.insert_resident_in(0, core, core_line)
    }

    /// Makes `(core, core_line)` resident with no valid sectors.
    pub fn insert_resident_stale(&self, core: u16, core_line: u64) -> CacheLineIdx {
        let line = self.insert_resident_in(0, core, core_line);
        self.cache.metadata.table.invalidate_all(line);
        line
    }

    /// Marks every sector of `line` dirty.
    pub fn set_dirty_all(&self, line: CacheLineIdx) {
        self.cache
            .metadata
            .table
            .set_dirty_sec(line, 0, self.cache.config.line_end_sector());
    }
}
