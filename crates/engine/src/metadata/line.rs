//! Per-cache-line metadata arena.
//!
//! One [`LineState`] per slot, stored densely and addressed by
//! [`CacheLineIdx`]. Each slot carries its bound core identity, its partition,
//! one 64-bit valid mask and one 64-bit dirty mask (a bit per sector), the
//! collision chain next pointer, and the collision access token serializing
//! chain splices against chain walkers.
//!
//! Word-level atomics let readers walk chains under the shared bucket lock
//! while writers splice under the exclusive bucket lock; the token closes the
//! remaining window where a walker could observe a half-updated splice.

use std::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering};

use crate::common::{CacheLineIdx, CoreId, CoreLine, PartitionId};
use crate::concurrency::RwSpin;

const CORE_NONE: u32 = u32::MAX;

/// Metadata words of a single cache line slot.
#[derive(Debug)]
struct LineState {
    core_id: AtomicU32,
    core_line: AtomicU64,
    partition: AtomicU8,
    valid: AtomicU64,
    dirty: AtomicU64,
    collision_next: AtomicU32,
    token: RwSpin,
}

impl LineState {
    fn new() -> Self {
        Self {
            core_id: AtomicU32::new(CORE_NONE),
            core_line: AtomicU64::new(u64::MAX),
            partition: AtomicU8::new(0),
            valid: AtomicU64::new(0),
            dirty: AtomicU64::new(0),
            collision_next: AtomicU32::new(CacheLineIdx::RAW_NONE),
            token: RwSpin::new(),
        }
    }
}

/// Bitmask covering sectors `start..=end`.
fn sector_mask(start: u8, end: u8) -> u64 {
    debug_assert!(start <= end && end < 64);
    let width = u32::from(end - start) + 1;
    if width == 64 {
        u64::MAX
    } else {
        ((1u64 << width) - 1) << start
    }
}

/// Dense per-line metadata table.
#[derive(Debug)]
pub struct LineTable {
    lines: Box<[LineState]>,
    line_sectors: u8,
}

impl LineTable {
    /// Creates a table of `count` unbound, fully-invalid lines.
    pub fn new(count: u32, line_sectors: u8) -> Self {
        let lines = (0..count).map(|_| LineState::new()).collect();
        Self {
            lines,
            line_sectors,
        }
    }

    /// Number of cache lines in the arena.
    pub fn len(&self) -> u32 {
        self.lines.len() as u32
    }

    /// Whether the arena is empty.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Sectors per cache line.
    pub fn line_sectors(&self) -> u8 {
        self.line_sectors
    }

    fn state(&self, line: CacheLineIdx) -> &LineState {
        &self.lines[line.val() as usize]
    }

    /// Core identity bound to `line`.
    ///
    /// Unbound lines report an identity that matches no real core line.
    pub fn core_info(&self, line: CacheLineIdx) -> (CoreId, CoreLine) {
        let state = self.state(line);
        let core_id = CoreId::new(state.core_id.load(Ordering::Acquire) as u16);
        let core_line = CoreLine::new(state.core_line.load(Ordering::Acquire));
        (core_id, core_line)
    }

    /// Binds `line` to a core identity.
    pub fn set_core_info(&self, line: CacheLineIdx, core_id: CoreId, core_line: CoreLine) {
        let state = self.state(line);
        state
            .core_id
            .store(u32::from(core_id.val()), Ordering::Release);
        state.core_line.store(core_line.val(), Ordering::Release);
    }

    /// Unbinds `line` from any core identity.
    pub fn clear_core_info(&self, line: CacheLineIdx) {
        let state = self.state(line);
        state.core_id.store(CORE_NONE, Ordering::Release);
        state.core_line.store(u64::MAX, Ordering::Release);
    }

    /// Partition `line` currently belongs to.
    pub fn partition_id(&self, line: CacheLineIdx) -> PartitionId {
        PartitionId::new(self.state(line).partition.load(Ordering::Acquire))
    }

    /// Assigns `line` to a partition.
    pub fn set_partition_id(&self, line: CacheLineIdx, part: PartitionId) {
        self.state(line).partition.store(part.val(), Ordering::Release);
    }

    /// Collision chain successor of `line`.
    pub fn collision_next(&self, line: CacheLineIdx) -> Option<CacheLineIdx> {
        CacheLineIdx::from_raw(self.state(line).collision_next.load(Ordering::Acquire))
    }

    /// Sets the collision chain successor of `line`.
    pub fn set_collision_next(&self, line: CacheLineIdx, next: Option<CacheLineIdx>) {
        self.state(line)
            .collision_next
            .store(CacheLineIdx::to_raw(next), Ordering::Release);
    }

    /// Whether every sector in `start..=end` is valid.
    pub fn valid_sec_test(&self, line: CacheLineIdx, start: u8, end: u8) -> bool {
        let mask = sector_mask(start, end);
        self.state(line).valid.load(Ordering::Acquire) & mask == mask
    }

    /// Whether any sector of `line` is valid.
    pub fn any_valid(&self, line: CacheLineIdx) -> bool {
        self.state(line).valid.load(Ordering::Acquire) != 0
    }

    /// Marks sectors `start..=end` valid.
    pub fn set_valid_sec(&self, line: CacheLineIdx, start: u8, end: u8) {
        let mask = sector_mask(start, end);
        let _ = self.state(line).valid.fetch_or(mask, Ordering::AcqRel);
    }

    /// Whether any sector of `line` is dirty.
    pub fn dirty_test(&self, line: CacheLineIdx) -> bool {
        self.state(line).dirty.load(Ordering::Acquire) != 0
    }

    /// Whether every sector in `start..=end` is dirty.
    pub fn dirty_sec_test_all(&self, line: CacheLineIdx, start: u8, end: u8) -> bool {
        let mask = sector_mask(start, end);
        self.state(line).dirty.load(Ordering::Acquire) & mask == mask
    }

    /// Marks sectors `start..=end` dirty (and valid).
    pub fn set_dirty_sec(&self, line: CacheLineIdx, start: u8, end: u8) {
        let mask = sector_mask(start, end);
        let _ = self.state(line).dirty.fetch_or(mask, Ordering::AcqRel);
        let _ = self.state(line).valid.fetch_or(mask, Ordering::AcqRel);
    }

    /// Clears all dirty bits of `line` (cleaner completion).
    pub fn clear_dirty(&self, line: CacheLineIdx) {
        self.state(line).dirty.store(0, Ordering::Release);
    }

    /// Invalidates every sector of `line`, dirty bits included.
    pub fn invalidate_all(&self, line: CacheLineIdx) {
        let state = self.state(line);
        state.valid.store(0, Ordering::Release);
        state.dirty.store(0, Ordering::Release);
    }

    /// Takes the collision access token of `line` shared.
    pub fn start_collision_shared_access(&self, line: CacheLineIdx) {
        self.state(line).token.lock_shared();
    }

    /// Releases a shared collision access hold.
    pub fn end_collision_shared_access(&self, line: CacheLineIdx) {
        self.state(line).token.unlock_shared();
    }

    /// Takes the collision access token of `line` exclusively.
    ///
    /// Used by external metadata flushers; chain mutators take it shared.
    pub fn start_collision_exclusive_access(&self, line: CacheLineIdx) {
        self.state(line).token.lock_exclusive();
    }

    /// Releases an exclusive collision access hold.
    pub fn end_collision_exclusive_access(&self, line: CacheLineIdx) {
        self.state(line).token.unlock_exclusive();
    }
}
