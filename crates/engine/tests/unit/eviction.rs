//! Eviction Policy Tests.
//!
//! Verifies LRU recency order, victim selection (coldest first, eligibility
//! filtering, partition vs. global scope), and that concurrent hot touches
//! cannot corrupt the intrusive list.

use std::sync::Arc;

use blkcache_core::common::{CacheLineIdx, PartitionId};
use blkcache_core::eviction::{EvictScope, EvictionPolicy, LruPolicy};
use pretty_assertions::assert_eq;

fn line(idx: u32) -> CacheLineIdx {
    CacheLineIdx::new(idx)
}

fn vals(lines: &[CacheLineIdx]) -> Vec<u32> {
    lines.iter().map(|l| l.val()).collect()
}

fn touch(policy: &LruPolicy, part: u8, idx: u32) {
    policy.init_line(PartitionId::new(part), line(idx));
    policy.touch_hot(line(idx));
}

// ══════════════════════════════════════════════════════════
// 1. Recency order
// ══════════════════════════════════════════════════════════

/// Lines are listed hottest first; untouched insertion order decides ties.
#[test]
fn touch_order_defines_recency() {
    let policy = LruPolicy::new(8, 1);
    touch(&policy, 0, 0);
    touch(&policy, 0, 1);
    touch(&policy, 0, 2);
    assert_eq!(vals(&policy.list_of(PartitionId::new(0))), vec![2, 1, 0]);
}

/// Re-touching promotes a line back to the head.
#[test]
fn touch_hot_moves_to_head() {
    let policy = LruPolicy::new(8, 1);
    touch(&policy, 0, 0);
    touch(&policy, 0, 1);
    touch(&policy, 0, 2);
    policy.touch_hot(line(0));
    assert_eq!(vals(&policy.list_of(PartitionId::new(0))), vec![0, 2, 1]);
}

/// Removed lines disappear from the list.
#[test]
fn remove_line_unlinks() {
    let policy = LruPolicy::new(8, 1);
    touch(&policy, 0, 0);
    touch(&policy, 0, 1);
    policy.remove_line(line(0));
    assert_eq!(vals(&policy.list_of(PartitionId::new(0))), vec![1]);
    // Removing twice is harmless.
    policy.remove_line(line(0));
    assert_eq!(vals(&policy.list_of(PartitionId::new(0))), vec![1]);
}

// ══════════════════════════════════════════════════════════
// 2. Victim selection
// ══════════════════════════════════════════════════════════

/// Victims come coldest first.
#[test]
fn victims_are_coldest_first() {
    let policy = LruPolicy::new(8, 1);
    touch(&policy, 0, 0);
    touch(&policy, 0, 1);
    touch(&policy, 0, 2);
    let victims = policy.victims(EvictScope::Partition(PartitionId::new(0)), 2, &|_| true);
    assert_eq!(vals(&victims), vec![0, 1]);
}

/// Ineligible lines are skipped, not counted.
#[test]
fn victims_respect_eligibility() {
    let policy = LruPolicy::new(8, 1);
    touch(&policy, 0, 0);
    touch(&policy, 0, 1);
    touch(&policy, 0, 2);
    let victims = policy.victims(EvictScope::Partition(PartitionId::new(0)), 2, &|l| {
        l.val() != 0
    });
    assert_eq!(vals(&victims), vec![1, 2]);
}

/// Fewer eligible lines than requested yields a short supply.
#[test]
fn victims_may_under_supply() {
    let policy = LruPolicy::new(8, 1);
    touch(&policy, 0, 0);
    let victims = policy.victims(EvictScope::Partition(PartitionId::new(0)), 3, &|_| true);
    assert_eq!(vals(&victims), vec![0]);
}

/// Global scope drains partitions in ascending id order.
#[test]
fn any_scope_walks_partitions_in_order() {
    let policy = LruPolicy::new(8, 2);
    touch(&policy, 0, 0);
    touch(&policy, 0, 1);
    touch(&policy, 1, 4);
    touch(&policy, 1, 5);
    let victims = policy.victims(EvictScope::Any, 3, &|_| true);
    assert_eq!(vals(&victims), vec![0, 1, 4]);
}

/// Partition scope never crosses into other partitions.
#[test]
fn partition_scope_stays_inside() {
    let policy = LruPolicy::new(8, 2);
    touch(&policy, 0, 0);
    touch(&policy, 1, 4);
    let victims = policy.victims(EvictScope::Partition(PartitionId::new(1)), 4, &|_| true);
    assert_eq!(vals(&victims), vec![4]);
}

// ══════════════════════════════════════════════════════════
// 3. Concurrency
// ══════════════════════════════════════════════════════════

/// Hammering `touch_hot` from several threads must leave a coherent list:
/// every line exactly once, no loops, no losses.
#[test]
fn concurrent_touches_keep_list_coherent() {
    let policy = Arc::new(LruPolicy::new(8, 1));
    for idx in 0..8 {
        policy.init_line(PartitionId::new(0), line(idx));
        policy.touch_hot(line(idx));
    }

    let mut handles = Vec::new();
    for t in 0..4u32 {
        let policy = Arc::clone(&policy);
        handles.push(std::thread::spawn(move || {
            for i in 0..1000u32 {
                policy.touch_hot(line((t + i) % 8));
            }
        }));
    }
    for handle in handles {
        handle.join().expect("toucher thread");
    }

    let mut listed = vals(&policy.list_of(PartitionId::new(0)));
    listed.sort_unstable();
    assert_eq!(listed, (0..8).collect::<Vec<u32>>());
}
