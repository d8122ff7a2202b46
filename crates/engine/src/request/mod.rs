//! Requests: the unit of work flowing through the engine.
//!
//! A [`Request`] covers a contiguous range of core lines on one core device.
//! It owns a [`MapEntry`] per touched core line, the [`RequestInfo`]
//! aggregate the prepare pipeline fills in, bookkeeping for every lock it
//! holds, and the callback surface (engine callbacks, I/O interface slots,
//! one-shot completion, owning queue).
//!
//! Requests move as `Box<Request>`: enqueueing, parking on a contended cache
//! line lock, and handing off to the cleaner all transfer ownership, so code
//! cannot touch a request it has given away.

/// Request queue with front/back handoff.
pub mod queue;

pub use queue::{NopKicker, QueueKicker, RequestQueue};

use std::sync::Arc;

use crate::common::{CacheLineIdx, CoreId, CoreLine, EngineError, PartitionId, SECTOR_SIZE};
use crate::concurrency::{ClMode, HbMode};
use crate::config::CacheConfig;
use crate::engine::traits::{EngineCallbacks, IoInterface};
use crate::metadata::HashIndex;

/// Direction of a request's data transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Host reads from the core device.
    Read,
    /// Host writes to the core device.
    Write,
}

/// Mapping state of one core line within a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LookupStatus {
    /// Not mapped; the initial assumption written by traversal.
    Miss,
    /// Resident; traversal found the line in its collision chain.
    Hit,
    /// Freshly allocated from the free list by mapping.
    Inserted,
    /// An eviction victim rebound to this core line.
    Remapped,
}

/// Per-core-line lookup/mapping slot inside a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MapEntry {
    /// Precomputed hash bucket for this core line.
    pub hash: u32,
    /// Current mapping state.
    pub status: LookupStatus,
    /// Cache line this entry maps to, if any.
    pub coll_idx: Option<CacheLineIdx>,
    /// Core device identity.
    pub core_id: CoreId,
    /// Core line identity.
    pub core_line: CoreLine,
    /// Line must move to the request's partition during mapping.
    pub re_part: bool,
    /// Set by the refresh check when the mapping raced and diverged.
    pub invalid: bool,
}

/// Aggregate statistics the prepare pipeline maintains per request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RequestInfo {
    /// Hits whose targeted sectors are all valid.
    pub hit_no: u32,
    /// Hits with at least one stale targeted sector.
    pub invalid_no: u32,
    /// Lines inserted or remapped by this request.
    pub insert_no: u32,
    /// Hits residing in a foreign partition.
    pub re_part_no: u32,
    /// Adjacent mapped pairs that are physically contiguous.
    pub seq_no: u32,
    /// Hits with any dirty sector.
    pub dirty_any: u32,
    /// Hits with every targeted sector dirty.
    pub dirty_all: u32,
    /// Latched when mapping fails; the request falls back to pass-through.
    pub mapping_error: bool,
}

/// Caller-supplied request parameters.
#[derive(Clone, Copy, Debug)]
pub struct RequestDesc {
    /// Target core device.
    pub core_id: CoreId,
    /// Byte offset on the core device.
    pub byte_position: u64,
    /// Transfer length in bytes; must be nonzero.
    pub byte_length: u32,
    /// Transfer direction.
    pub direction: Direction,
    /// Partition the request inserts into.
    pub part_id: PartitionId,
    /// Internal requests do not refresh the cache's last-access clock.
    pub internal: bool,
}

/// One-shot request completion callback.
pub type CompleteFn = Box<dyn FnOnce(Box<Request>, Result<(), EngineError>) + Send>;

/// A batched cache operation over a contiguous core line range.
pub struct Request {
    /// Target core device.
    pub core_id: CoreId,
    /// Byte offset on the core device.
    pub byte_position: u64,
    /// Transfer length in bytes.
    pub byte_length: u32,
    /// Transfer direction.
    pub direction: Direction,
    /// Partition the request inserts into.
    pub part_id: PartitionId,
    /// First core line covered.
    pub core_line_first: CoreLine,
    /// Number of core lines covered.
    pub core_line_count: u32,
    /// Sectors per cache line, captured from the cache configuration.
    pub line_sectors: u8,
    /// Per-core-line lookup entries, in increasing core line order.
    pub map: Vec<MapEntry>,
    /// Aggregate lookup/mapping statistics.
    pub info: RequestInfo,
    /// Sorted, deduplicated hash buckets covering the core line range.
    pub lock_set: Vec<u32>,
    /// Mode the hash-bucket set is currently held in, if any.
    pub hb_mode: Option<HbMode>,
    /// Mode the cache line locks are currently held in, if any.
    pub cl_mode: Option<ClMode>,
    /// Cache lines currently locked by this request.
    pub cl_locked: Vec<CacheLineIdx>,
    /// Eviction must stay within the request's partition.
    pub part_evict: bool,
    /// Internal requests do not refresh the cache's last-access clock.
    pub internal: bool,
    /// Latched terminal error, if any.
    pub error: Option<EngineError>,
    /// Active I/O interface dispatched by queue workers.
    pub io_if: Option<Arc<dyn IoInterface>>,
    /// Original I/O interface saved while a refresh pass runs.
    pub saved_io_if: Option<Arc<dyn IoInterface>>,
    /// Engine callback table (lock mode, resume).
    pub engine_cbs: Arc<dyn EngineCallbacks>,
    /// One-shot completion; consumed when the request finishes.
    pub complete: Option<CompleteFn>,
    /// Queue that owns this request between processing steps.
    pub queue: Arc<RequestQueue>,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("core_id", &self.core_id)
            .field("byte_position", &self.byte_position)
            .field("byte_length", &self.byte_length)
            .field("direction", &self.direction)
            .field("part_id", &self.part_id)
            .field("core_line_first", &self.core_line_first)
            .field("core_line_count", &self.core_line_count)
            .field("info", &self.info)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl Request {
    /// Builds a request covering every core line its byte range touches.
    ///
    /// # Panics
    ///
    /// Debug-asserts that `byte_length` is nonzero and the partition id is
    /// within the configured table.
    pub fn new(
        config: &CacheConfig,
        desc: RequestDesc,
        queue: Arc<RequestQueue>,
        engine_cbs: Arc<dyn EngineCallbacks>,
    ) -> Box<Self> {
        debug_assert!(desc.byte_length > 0, "zero-length request");
        debug_assert!(
            usize::from(desc.part_id.val()) < config.partitions.len(),
            "partition id out of range"
        );

        let line_bytes = config.line_bytes();
        let first = desc.byte_position / line_bytes;
        let last = (desc.byte_position + u64::from(desc.byte_length) - 1) / line_bytes;
        let count = (last - first + 1) as u32;

        let map = (0..count)
            .map(|idx| MapEntry {
                hash: 0,
                status: LookupStatus::Miss,
                coll_idx: None,
                core_id: desc.core_id,
                core_line: CoreLine::new(first + u64::from(idx)),
                re_part: false,
                invalid: false,
            })
            .collect();

        Box::new(Self {
            core_id: desc.core_id,
            byte_position: desc.byte_position,
            byte_length: desc.byte_length,
            direction: desc.direction,
            part_id: desc.part_id,
            core_line_first: CoreLine::new(first),
            core_line_count: count,
            line_sectors: config.line_sectors,
            map,
            info: RequestInfo::default(),
            lock_set: Vec::new(),
            hb_mode: None,
            cl_mode: None,
            cl_locked: Vec::new(),
            part_evict: false,
            internal: desc.internal,
            error: None,
            io_if: None,
            saved_io_if: None,
            engine_cbs,
            complete: None,
            queue,
        })
    }

    /// Zeroes the aggregate info, the mapping-error latch included.
    pub fn clear_info(&mut self) {
        self.info = RequestInfo::default();
    }

    /// Precomputes every entry's hash bucket and the sorted lock set.
    pub fn compute_hashes(&mut self, hash: &HashIndex) {
        for entry in &mut self.map {
            entry.hash = hash.bucket_of(entry.core_line, entry.core_id);
        }
        let mut set: Vec<u32> = self.map.iter().map(|entry| entry.hash).collect();
        set.sort_unstable();
        set.dedup();
        self.lock_set = set;
    }

    /// Whether every entry is a hit.
    pub fn is_fully_mapped(&self) -> bool {
        self.map
            .iter()
            .all(|entry| entry.status == LookupStatus::Hit)
    }

    /// Number of entries still unmapped.
    pub fn unmapped_count(&self) -> u32 {
        self.map
            .iter()
            .filter(|entry| entry.status == LookupStatus::Miss)
            .count() as u32
    }

    /// Whether the mapped cache lines are physically contiguous end to end.
    pub fn is_sequential(&self) -> bool {
        self.info.seq_no + 1 == self.core_line_count
    }

    /// Targeted sector range (inclusive) within entry `idx`'s cache line.
    ///
    /// Interior lines are covered fully; the first and last lines are
    /// clipped to the request's byte range.
    pub fn line_range_sectors(&self, idx: usize) -> (u8, u8) {
        let line_bytes = u64::from(self.line_sectors) * SECTOR_SIZE;
        let start = if idx == 0 {
            ((self.byte_position % line_bytes) / SECTOR_SIZE) as u8
        } else {
            0
        };
        let end = if idx + 1 == self.core_line_count as usize {
            let last_byte = self.byte_position + u64::from(self.byte_length) - 1;
            ((last_byte % line_bytes) / SECTOR_SIZE) as u8
        } else {
            self.line_sectors - 1
        };
        (start, end)
    }
}
