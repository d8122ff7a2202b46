//! Lock hierarchy for the metadata graph and cache line arena.
//!
//! Three lock classes, acquired strictly in this order:
//! 1. **Global metadata lock** ([`MetadataLock::start_exclusive`]) — eviction
//!    slow path only, taken with no other engine lock held.
//! 2. **Hash-bucket locks** ([`MetadataLock`]) — the bucket set covering a
//!    request's core line range, shared for traversal and exclusive for
//!    mapping.
//! 3. **Cache line locks** ([`CacheLineLocks`]) — per-line data access in the
//!    mode the request's engine callback declares, with asynchronous parking.
//!
//! The per-line collision access token (serializing chain splices against
//! chain walkers) lives with the line metadata in
//! [`crate::metadata::LineTable`] and reuses [`RwSpin`].

/// Per-cache-line lock manager with waiter parking.
pub mod cl;

/// Hash-bucket and global metadata locks.
pub mod hb;

/// Word-sized readers-writer spin lock.
pub mod rw_spin;

pub use cl::{CacheLineLocks, ClMode, LockAttempt};
pub use hb::{HbMode, MetadataLock};
pub use rw_spin::RwSpin;
