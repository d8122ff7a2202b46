//! Lock Hierarchy Tests.
//!
//! Verifies the spin RW lock, the bucket/global metadata locks, and the
//! cache line lock manager's all-or-nothing acquisition and waiter granting.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use blkcache_core::common::CacheLineIdx;
use blkcache_core::concurrency::{ClMode, LockAttempt, MetadataLock, RwSpin};
use pretty_assertions::assert_eq;

use crate::common::harness::TestContext;

// ══════════════════════════════════════════════════════════
// 1. RwSpin
// ══════════════════════════════════════════════════════════

#[test]
fn shared_holds_coexist() {
    let lock = RwSpin::new();
    lock.lock_shared();
    assert!(lock.try_lock_shared());
    assert!(!lock.try_lock_exclusive());
    lock.unlock_shared();
    lock.unlock_shared();
    assert!(lock.try_lock_exclusive());
    lock.unlock_exclusive();
}

#[test]
fn exclusive_hold_blocks_readers() {
    let lock = RwSpin::new();
    lock.lock_exclusive();
    assert!(!lock.try_lock_shared());
    assert!(!lock.try_lock_exclusive());
    lock.unlock_exclusive();
    assert!(lock.try_lock_shared());
    lock.unlock_shared();
}

/// Four threads doing non-atomic read-modify-write under the exclusive lock
/// must not lose a single increment.
#[test]
fn exclusive_lock_is_mutual() {
    let lock = Arc::new(RwSpin::new());
    let counter = Arc::new(AtomicU64::new(0));
    let mut handles = Vec::new();
    for _ in 0..4 {
        let lock = Arc::clone(&lock);
        let counter = Arc::clone(&counter);
        handles.push(std::thread::spawn(move || {
            for _ in 0..1000 {
                lock.lock_exclusive();
                // Split load/store: only mutual exclusion keeps this exact.
                let value = counter.load(Ordering::Relaxed);
                counter.store(value + 1, Ordering::Relaxed);
                lock.unlock_exclusive();
            }
        }));
    }
    for handle in handles {
        handle.join().expect("writer thread");
    }
    assert_eq!(counter.load(Ordering::Relaxed), 4000);
}

// ══════════════════════════════════════════════════════════
// 2. MetadataLock
// ══════════════════════════════════════════════════════════

#[test]
fn bucket_set_round_trips_in_both_modes() {
    let lock = MetadataLock::new(8);
    let set = [1u32, 3, 5];

    lock.req_lock_rd(&set);
    assert!(!lock.try_start_exclusive(), "readers block the global lock");
    lock.req_unlock_rd(&set);

    lock.req_lock_wr(&set);
    assert!(!lock.try_start_exclusive());
    lock.req_unlock_wr(&set);

    assert!(lock.try_start_exclusive());
    lock.end_exclusive();
}

#[test]
fn upgrade_switches_set_to_exclusive() {
    let lock = MetadataLock::new(8);
    let set = [2u32, 4];
    lock.req_lock_rd(&set);
    lock.upgrade(&set);
    assert!(
        !lock.try_start_exclusive(),
        "global hold stays shared across the upgrade"
    );
    lock.req_unlock_wr(&set);
    assert!(lock.try_start_exclusive());
    lock.end_exclusive();
}

/// While the global lock is held exclusively, bucket lockers wait.
#[test]
fn global_exclusive_excludes_bucket_lockers() {
    let lock = Arc::new(MetadataLock::new(8));
    lock.start_exclusive();

    let entered = Arc::new(AtomicBool::new(false));
    let handle = {
        let lock = Arc::clone(&lock);
        let entered = Arc::clone(&entered);
        std::thread::spawn(move || {
            lock.req_lock_rd(&[0]);
            entered.store(true, Ordering::Release);
            lock.req_unlock_rd(&[0]);
        })
    };

    std::thread::sleep(Duration::from_millis(50));
    assert!(
        !entered.load(Ordering::Acquire),
        "bucket reader must wait for the global hold"
    );

    lock.end_exclusive();
    handle.join().expect("reader thread");
    assert!(entered.load(Ordering::Acquire));
}

// ══════════════════════════════════════════════════════════
// 3. Cache line locks
// ══════════════════════════════════════════════════════════

/// Maps a fresh request onto the given slots (lookup state only).
fn mapped_request(ctx: &TestContext, first: u64, slots: &[u32]) -> Box<blkcache_core::Request> {
    let mut req = ctx.read_request(first, slots.len() as u32);
    for (entry, slot) in req.map.iter_mut().zip(slots) {
        entry.coll_idx = Some(CacheLineIdx::new(*slot));
    }
    req
}

#[test]
fn readers_share_writers_exclude() {
    let ctx = TestContext::new();
    let locks = &ctx.cache.cl_locks;

    let req_a = mapped_request(&ctx, 0, &[0, 1]);
    let LockAttempt::Acquired(mut req_a) = locks.lock_or_park(req_a, ClMode::Read) else {
        panic!("uncontended read lock must acquire");
    };

    // A second reader on the same lines shares.
    let req_b = mapped_request(&ctx, 0, &[0, 1]);
    let LockAttempt::Acquired(mut req_b) = locks.lock_or_park(req_b, ClMode::Read) else {
        panic!("read locks share");
    };

    // A writer on an overlapping line parks.
    let req_c = mapped_request(&ctx, 0, &[1, 2]);
    assert!(matches!(
        locks.lock_or_park(req_c, ClMode::Write),
        LockAttempt::Parked
    ));
    assert_eq!(locks.waiter_count(), 1);
    assert!(!locks.is_unlocked(CacheLineIdx::new(0)));
    assert!(locks.is_unlocked(CacheLineIdx::new(3)));

    // Releasing one reader is not enough; releasing both grants the writer.
    assert!(locks.unlock(&mut req_a).is_empty());
    let granted = locks.unlock(&mut req_b);
    assert_eq!(granted.len(), 1);
    assert_eq!(granted[0].cl_mode, Some(ClMode::Write));
    assert_eq!(locks.waiter_count(), 0);
}

/// All-or-nothing: a partial failure leaves nothing held.
#[test]
fn failed_acquisition_holds_nothing() {
    let ctx = TestContext::new();
    let locks = &ctx.cache.cl_locks;

    let req_a = mapped_request(&ctx, 0, &[5]);
    let LockAttempt::Acquired(mut req_a) = locks.lock_or_park(req_a, ClMode::Write) else {
        panic!("uncontended write lock must acquire");
    };

    // Wants 4 and 5; 5 is write-held, so 4 must stay free.
    let req_b = mapped_request(&ctx, 0, &[4, 5]);
    assert!(matches!(
        locks.lock_or_park(req_b, ClMode::Read),
        LockAttempt::Parked
    ));
    assert!(locks.is_unlocked(CacheLineIdx::new(4)));

    let granted = locks.unlock(&mut req_a);
    assert_eq!(granted.len(), 1);
    assert!(!locks.is_unlocked(CacheLineIdx::new(4)));
    assert!(!locks.is_unlocked(CacheLineIdx::new(5)));
}

/// Waiters that become eligible together are granted in arrival order.
#[test]
fn grants_scan_waiters_in_arrival_order() {
    let ctx = TestContext::new();
    let locks = &ctx.cache.cl_locks;

    let req_a = mapped_request(&ctx, 0, &[7]);
    let LockAttempt::Acquired(mut req_a) = locks.lock_or_park(req_a, ClMode::Write) else {
        panic!("uncontended write lock must acquire");
    };

    let first = mapped_request(&ctx, 10, &[7]);
    let second = mapped_request(&ctx, 20, &[7]);
    assert!(matches!(
        locks.lock_or_park(first, ClMode::Read),
        LockAttempt::Parked
    ));
    assert!(matches!(
        locks.lock_or_park(second, ClMode::Read),
        LockAttempt::Parked
    ));

    let granted = locks.unlock(&mut req_a);
    // Both readers share line 7, so both are granted, oldest first.
    assert_eq!(granted.len(), 2);
    assert_eq!(granted[0].core_line_first.val(), 10);
    assert_eq!(granted[1].core_line_first.val(), 20);
}
