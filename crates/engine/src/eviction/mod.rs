//! Eviction policies.
//!
//! Implements the recency bookkeeping used to pick victim lines when the
//! cache or a partition is out of space.
//!
//! # Policies
//!
//! - `Lru`: Least Recently Used (reference policy).
//!
//! The policy tracks recency and selects victims; the engine performs the
//! chain surgery (unlinking, invalidating, rebinding victims onto the
//! requesting core lines). Victim selection runs only under the global
//! metadata lock, while `touch_hot` runs on the traversal hot path under
//! shared bucket locks — the implementation must keep concurrent touches
//! from corrupting its structures.

/// Least Recently Used eviction policy.
pub mod lru;

pub use lru::LruPolicy;

use crate::common::{CacheLineIdx, PartitionId};
use crate::config::EvictionPolicyKind;

/// Which lines an eviction request may draw victims from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvictScope {
    /// Only lines of this partition (the partition is over budget).
    Partition(PartitionId),
    /// Lines of any partition (the cache itself is out of free slots).
    Any,
}

/// Trait for eviction policies.
///
/// Lines enter the policy when they become resident, are touched on every
/// hit, and leave when unmapped or evicted.
pub trait EvictionPolicy: Send + Sync {
    /// Registers a newly resident `line` under partition `part`.
    fn init_line(&self, part: PartitionId, line: CacheLineIdx);

    /// Promotes `line` to most-recently-used.
    ///
    /// Called on every lookup hit, possibly concurrently from several
    /// traversals.
    fn touch_hot(&self, line: CacheLineIdx);

    /// Removes `line` from recency tracking (unmapped or evicted).
    fn remove_line(&self, line: CacheLineIdx);

    /// Selects up to `count` victims within `scope`, coldest first.
    ///
    /// Only lines for which `eligible` returns `true` are supplied; the
    /// policy may return fewer than `count`. Victims stay linked until the
    /// caller removes them.
    fn victims(
        &self,
        scope: EvictScope,
        count: u32,
        eligible: &dyn Fn(CacheLineIdx) -> bool,
    ) -> Vec<CacheLineIdx>;
}

/// Builds the configured eviction policy.
pub fn build(
    kind: EvictionPolicyKind,
    cache_lines: u32,
    partitions: usize,
) -> Box<dyn EvictionPolicy> {
    match kind {
        EvictionPolicyKind::Lru => Box::new(LruPolicy::new(cache_lines, partitions)),
    }
}
