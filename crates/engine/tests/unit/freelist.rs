//! Free List Tests.
//!
//! Verifies the allocation order, exhaustion behavior, and the advisory
//! counter.

use blkcache_core::common::CacheLineIdx;
use blkcache_core::freelist::FreeList;
use pretty_assertions::assert_eq;

/// A fresh list hands out ascending slot indices.
#[test]
fn take_yields_ascending_indices() {
    let list = FreeList::new(4);
    let taken: Vec<u32> = (0..4).map(|_| list.take().expect("free slot").val()).collect();
    assert_eq!(taken, vec![0, 1, 2, 3]);
}

/// `take` on an empty list reports exhaustion instead of blocking.
#[test]
fn take_on_empty_returns_none() {
    let list = FreeList::new(1);
    let _ = list.take();
    assert!(list.take().is_none());
    assert_eq!(list.num_free(), 0);
}

/// Returned slots are reused LIFO.
#[test]
fn put_makes_slot_available_again() {
    let list = FreeList::new(3);
    for _ in 0..3 {
        let _ = list.take();
    }
    list.put(CacheLineIdx::new(1));
    assert_eq!(list.num_free(), 1);
    assert_eq!(list.take(), Some(CacheLineIdx::new(1)));
}

/// The advisory counter tracks takes and puts.
#[test]
fn num_free_tracks_operations() {
    let list = FreeList::new(8);
    assert_eq!(list.num_free(), 8);
    let a = list.take().expect("free slot");
    let _ = list.take().expect("free slot");
    assert_eq!(list.num_free(), 6);
    list.put(a);
    assert_eq!(list.num_free(), 7);
}

/// Concurrent takers never receive the same slot twice.
#[test]
fn concurrent_takes_are_disjoint() {
    use std::sync::Arc;

    let list = Arc::new(FreeList::new(64));
    let mut handles = Vec::new();
    for _ in 0..4 {
        let list = Arc::clone(&list);
        handles.push(std::thread::spawn(move || {
            let mut mine = Vec::new();
            while let Some(line) = list.take() {
                mine.push(line.val());
            }
            mine
        }));
    }

    let mut all: Vec<u32> = handles
        .into_iter()
        .flat_map(|handle| handle.join().expect("taker thread"))
        .collect();
    all.sort_unstable();
    assert_eq!(all, (0..64).collect::<Vec<u32>>());
    assert_eq!(list.num_free(), 0);
}
