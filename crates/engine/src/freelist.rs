//! Free cache line allocator.
//!
//! A lock-free LIFO stack threaded through a pre-linked index array: `head`
//! packs the top slot index with a version tag in one 64-bit word, and each
//! slot's successor lives in `next`. `take` and `put` are CAS loops that
//! never block — a taker racing a concurrent pop simply retries, and an empty
//! list reports exhaustion immediately. The version tag makes a pop-push-pop
//! of the same slot (ABA) fail its CAS and retry.
//!
//! `num_free` is an advisory snapshot — the prepare pipeline reads it (under
//! the global metadata lock) to decide whether eviction is needed, and a
//! stale read only causes a spurious eviction attempt, never corruption.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::common::CacheLineIdx;

const IDX_MASK: u64 = u32::MAX as u64;
const TAG_UNIT: u64 = 1 << 32;

fn pack(tag: u64, idx: u32) -> u64 {
    (tag & !IDX_MASK) | u64::from(idx)
}

fn idx_of(head: u64) -> u32 {
    (head & IDX_MASK) as u32
}

/// Allocator over the cache's free slots.
#[derive(Debug)]
pub struct FreeList {
    head: AtomicU64,
    next: Box<[AtomicU32]>,
    free: AtomicU64,
}

impl FreeList {
    /// Creates a free list holding all `count` slots.
    ///
    /// Slots are pre-linked in ascending order so that `take` yields
    /// ascending indices from a fresh cache, which keeps allocation order
    /// deterministic.
    pub fn new(count: u32) -> Self {
        let next = (0..count)
            .map(|idx| {
                AtomicU32::new(if idx + 1 < count {
                    idx + 1
                } else {
                    CacheLineIdx::RAW_NONE
                })
            })
            .collect();
        let top = if count == 0 { CacheLineIdx::RAW_NONE } else { 0 };
        Self {
            head: AtomicU64::new(pack(0, top)),
            next,
            free: AtomicU64::new(u64::from(count)),
        }
    }

    /// Pops a free slot, or `None` when the list is empty. Never blocks.
    pub fn take(&self) -> Option<CacheLineIdx> {
        let mut head = self.head.load(Ordering::Acquire);
        loop {
            let top = idx_of(head);
            if top == CacheLineIdx::RAW_NONE {
                return None;
            }
            let next = self.next[top as usize].load(Ordering::Acquire);
            let new_head = pack(head.wrapping_add(TAG_UNIT), next);
            match self
                .head
                .compare_exchange_weak(head, new_head, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    let _ = self.free.fetch_sub(1, Ordering::AcqRel);
                    return Some(CacheLineIdx::new(top));
                }
                Err(current) => head = current,
            }
        }
    }

    /// Returns a slot to the list. Never blocks.
    pub fn put(&self, line: CacheLineIdx) {
        let mut head = self.head.load(Ordering::Acquire);
        loop {
            self.next[line.val() as usize].store(idx_of(head), Ordering::Release);
            let new_head = pack(head.wrapping_add(TAG_UNIT), line.val());
            match self
                .head
                .compare_exchange_weak(head, new_head, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    let _ = self.free.fetch_add(1, Ordering::AcqRel);
                    return;
                }
                Err(current) => head = current,
            }
        }
    }

    /// Advisory count of free slots.
    pub fn num_free(&self) -> u64 {
        self.free.load(Ordering::Acquire)
    }
}
