//! Collision hash index.
//!
//! Maps `(core_line, core_id)` to a bucket, and each bucket to the head of a
//! singly-linked collision chain threaded through the line metadata arena.
//! Chain walking and splicing live on [`Metadata`](super::Metadata), which
//! owns both the head array and the line table.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::common::{CacheLineIdx, CoreId, CoreLine};

/// Multiplier spreading core ids across buckets so neighboring cores with
/// identical line numbers do not share chains.
const CORE_SPREAD: u64 = 0x9E37_79B9;

/// Bucket head array plus the hash function.
#[derive(Debug)]
pub struct HashIndex {
    heads: Box<[AtomicU32]>,
}

impl HashIndex {
    /// Creates an index with `buckets` empty chains.
    pub fn new(buckets: u32) -> Self {
        let heads = (0..buckets)
            .map(|_| AtomicU32::new(CacheLineIdx::RAW_NONE))
            .collect();
        Self { heads }
    }

    /// Number of buckets.
    pub fn bucket_count(&self) -> u32 {
        self.heads.len() as u32
    }

    /// Bucket a core line hashes to.
    pub fn bucket_of(&self, core_line: CoreLine, core_id: CoreId) -> u32 {
        let spread = u64::from(core_id.val()).wrapping_mul(CORE_SPREAD);
        (core_line.val().wrapping_add(spread) % self.heads.len() as u64) as u32
    }

    /// Head of `bucket`'s collision chain.
    pub fn head(&self, bucket: u32) -> Option<CacheLineIdx> {
        CacheLineIdx::from_raw(self.heads[bucket as usize].load(Ordering::Acquire))
    }

    /// Replaces the head of `bucket`'s collision chain.
    pub fn set_head(&self, bucket: u32, line: Option<CacheLineIdx>) {
        self.heads[bucket as usize].store(CacheLineIdx::to_raw(line), Ordering::Release);
    }
}
