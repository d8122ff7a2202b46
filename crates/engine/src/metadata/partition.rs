//! Partition occupancy table.
//!
//! Partitions group cache lines under independent budgets. The table tracks
//! per-partition line counts and the enabled flag; which partition a given
//! line belongs to is recorded in the line metadata arena.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::common::PartitionId;
use crate::config::PartitionConfig;

#[derive(Debug)]
struct Partition {
    enabled: AtomicBool,
    max_lines: u32,
    curr_lines: AtomicU32,
}

/// Budgets and occupancy for every configured partition.
#[derive(Debug)]
pub struct PartitionTable {
    parts: Box<[Partition]>,
}

impl PartitionTable {
    /// Builds the table from the configured partition list.
    pub fn new(configs: &[PartitionConfig]) -> Self {
        let parts = configs
            .iter()
            .map(|config| Partition {
                enabled: AtomicBool::new(config.enabled),
                max_lines: config.max_lines,
                curr_lines: AtomicU32::new(0),
            })
            .collect();
        Self { parts }
    }

    /// Number of partitions.
    pub fn count(&self) -> usize {
        self.parts.len()
    }

    fn part(&self, id: PartitionId) -> &Partition {
        &self.parts[usize::from(id.val())]
    }

    /// Whether requests may insert into partition `id`.
    pub fn is_enabled(&self, id: PartitionId) -> bool {
        self.part(id).enabled.load(Ordering::Acquire)
    }

    /// Enables or disables partition `id`.
    pub fn set_enabled(&self, id: PartitionId, enabled: bool) {
        self.part(id).enabled.store(enabled, Ordering::Release);
    }

    /// Whether partition `id` can absorb `needed` more lines.
    pub fn has_space(&self, id: PartitionId, needed: u32) -> bool {
        let part = self.part(id);
        let curr = part.curr_lines.load(Ordering::Acquire);
        curr.saturating_add(needed) <= part.max_lines
    }

    /// Current line count of partition `id`.
    pub fn occupancy(&self, id: PartitionId) -> u32 {
        self.part(id).curr_lines.load(Ordering::Acquire)
    }

    /// Accounts one line added to partition `id`.
    pub fn add_line(&self, id: PartitionId) {
        let _ = self.part(id).curr_lines.fetch_add(1, Ordering::AcqRel);
    }

    /// Accounts one line removed from partition `id`.
    pub fn remove_line(&self, id: PartitionId) {
        let prev = self.part(id).curr_lines.fetch_sub(1, Ordering::AcqRel);
        debug_assert_ne!(prev, 0, "partition occupancy underflow");
    }
}
