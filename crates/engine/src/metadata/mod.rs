//! Cache metadata: the line arena, collision index, partitions, and their locks.
//!
//! This module owns the shared-mutable metadata graph. It provides:
//! 1. **Line arena:** per-slot identity, sector state, chain pointer, token.
//! 2. **Collision index:** hash buckets over singly-linked chains.
//! 3. **Partitions:** budget accounting per line group.
//! 4. **Locks:** the global/bucket lock hierarchy gating all of the above.
//!
//! Chain operations follow one discipline: walking requires the bucket held
//! at least shared; splicing requires the bucket held exclusively (or the
//! global lock exclusively) and internally takes the victim line's collision
//! access token shared, so concurrent walkers of *other* buckets touching the
//! same line arena words stay coherent.

/// Collision hash index (bucket heads + hash function).
pub mod hash;

/// Per-cache-line metadata arena.
pub mod line;

/// Partition occupancy table.
pub mod partition;

pub use hash::HashIndex;
pub use line::LineTable;
pub use partition::PartitionTable;

use crate::common::{CacheLineIdx, CoreId, CoreLine};
use crate::concurrency::MetadataLock;
use crate::config::CacheConfig;

/// The assembled metadata graph.
#[derive(Debug)]
pub struct Metadata {
    /// Per-line metadata arena.
    pub table: LineTable,
    /// Collision hash index.
    pub hash: HashIndex,
    /// Partition budgets and occupancy.
    pub partitions: PartitionTable,
    /// Global + per-bucket lock hierarchy.
    pub lock: MetadataLock,
}

impl Metadata {
    /// Builds empty metadata for a validated configuration.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            table: LineTable::new(config.cache_lines, config.line_sectors),
            hash: HashIndex::new(config.hash_buckets),
            partitions: PartitionTable::new(&config.partitions),
            lock: MetadataLock::new(config.hash_buckets),
        }
    }

    /// Walks `bucket`'s chain for a line bound to `(core_id, core_line)`.
    ///
    /// First match wins; chains are unordered. The caller must hold the
    /// bucket at least shared.
    pub fn lookup(&self, bucket: u32, core_id: CoreId, core_line: CoreLine) -> Option<CacheLineIdx> {
        let mut cursor = self.hash.head(bucket);
        while let Some(line) = cursor {
            let (curr_id, curr_line) = self.table.core_info(line);
            if curr_id == core_id && curr_line == core_line {
                return Some(line);
            }
            cursor = self.table.collision_next(line);
        }
        None
    }

    /// Binds `line` to `(core_id, core_line)` and prepends it to `bucket`.
    ///
    /// The caller must hold the bucket exclusively (or the global lock
    /// exclusively); the line's collision token is taken here.
    pub fn add_to_collision(
        &self,
        bucket: u32,
        line: CacheLineIdx,
        core_id: CoreId,
        core_line: CoreLine,
    ) {
        self.table.start_collision_shared_access(line);
        self.table.set_core_info(line, core_id, core_line);
        self.table.set_collision_next(line, self.hash.head(bucket));
        self.hash.set_head(bucket, Some(line));
        self.table.end_collision_shared_access(line);
    }

    /// Unlinks `line` from its collision chain.
    ///
    /// The bucket is derived from the line's bound identity. Same locking
    /// requirements as [`Metadata::add_to_collision`]. The identity remains
    /// bound; callers unbind it explicitly when recycling the slot.
    pub fn remove_from_collision(&self, line: CacheLineIdx) {
        let (core_id, core_line) = self.table.core_info(line);
        let bucket = self.hash.bucket_of(core_line, core_id);

        self.table.start_collision_shared_access(line);
        let next = self.table.collision_next(line);
        match self.hash.head(bucket) {
            Some(head) if head == line => self.hash.set_head(bucket, next),
            Some(head) => {
                let mut prev = head;
                while let Some(curr) = self.table.collision_next(prev) {
                    if curr == line {
                        self.table.set_collision_next(prev, next);
                        break;
                    }
                    prev = curr;
                }
            }
            None => debug_assert!(false, "removing a line from an empty chain"),
        }
        self.table.set_collision_next(line, None);
        self.table.end_collision_shared_access(line);
    }

    /// Core identity bound to `line` (diagnostic / refresh check).
    pub fn info_of(&self, line: CacheLineIdx) -> (CoreId, CoreLine) {
        self.table.core_info(line)
    }
}
