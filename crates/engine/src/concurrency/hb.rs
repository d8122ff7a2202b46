//! Hash-bucket lock hierarchy.
//!
//! Two levels gate the metadata graph:
//! 1. **Global lock:** held shared by every bucket locker; held exclusively
//!    ([`MetadataLock::start_exclusive`]) only by the eviction slow path,
//!    which thereby excludes all bucket access at once.
//! 2. **Per-bucket locks:** a request locks the sorted, deduplicated set of
//!    buckets covering its core line range — shared for traversal, exclusive
//!    for mapping.
//!
//! Deadlock freedom: bucket sets are always acquired in ascending order, and
//! the global exclusive lock is only taken while holding no bucket locks.
//! [`MetadataLock::upgrade`] releases the shared set before taking the
//! exclusive set; callers must re-traverse afterwards, which the mapping path
//! does.

use super::rw_spin::RwSpin;

/// Mode a request currently holds its hash-bucket set in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HbMode {
    /// Shared (traversal) mode.
    Read,
    /// Exclusive (mapping) mode.
    Write,
}

/// The global + per-bucket metadata lock hierarchy.
#[derive(Debug)]
pub struct MetadataLock {
    global: RwSpin,
    buckets: Box<[RwSpin]>,
}

impl MetadataLock {
    /// Creates the lock hierarchy for `bucket_count` hash buckets.
    pub fn new(bucket_count: u32) -> Self {
        let buckets = (0..bucket_count).map(|_| RwSpin::new()).collect();
        Self {
            global: RwSpin::new(),
            buckets,
        }
    }

    /// Read-locks a sorted, deduplicated bucket set.
    pub fn req_lock_rd(&self, set: &[u32]) {
        self.global.lock_shared();
        for &bucket in set {
            self.buckets[bucket as usize].lock_shared();
        }
    }

    /// Releases a read-locked bucket set.
    pub fn req_unlock_rd(&self, set: &[u32]) {
        for &bucket in set {
            self.buckets[bucket as usize].unlock_shared();
        }
        self.global.unlock_shared();
    }

    /// Write-locks a sorted, deduplicated bucket set.
    pub fn req_lock_wr(&self, set: &[u32]) {
        self.global.lock_shared();
        for &bucket in set {
            self.buckets[bucket as usize].lock_exclusive();
        }
    }

    /// Releases a write-locked bucket set.
    pub fn req_unlock_wr(&self, set: &[u32]) {
        for &bucket in set {
            self.buckets[bucket as usize].unlock_exclusive();
        }
        self.global.unlock_shared();
    }

    /// Upgrades a read-locked set to write mode.
    ///
    /// Not atomic: the shared holds are released, then exclusive holds are
    /// acquired in ascending order. Metadata may change in the window, so the
    /// caller must re-check anything it observed under the read lock.
    pub fn upgrade(&self, set: &[u32]) {
        for &bucket in set {
            self.buckets[bucket as usize].unlock_shared();
        }
        for &bucket in set {
            self.buckets[bucket as usize].lock_exclusive();
        }
    }

    /// Takes the global metadata lock exclusively.
    ///
    /// The caller must hold no bucket locks. While held, no other thread can
    /// acquire any bucket lock, so chains, partitions and eviction state may
    /// be mutated freely.
    pub fn start_exclusive(&self) {
        self.global.lock_exclusive();
    }

    /// Tries to take the global metadata lock exclusively without waiting.
    pub fn try_start_exclusive(&self) -> bool {
        self.global.try_lock_exclusive()
    }

    /// Releases the global exclusive hold.
    pub fn end_exclusive(&self) {
        self.global.unlock_exclusive();
    }
}
