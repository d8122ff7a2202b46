//! The request preparation pipeline and its building blocks.
//!
//! `prepare_clines` takes a request from "covers a range of core lines" to
//! "every touched core line is mapped to a cache slot, the metadata locks are
//! held in the right modes, and `req.info` is a consistent snapshot". The
//! fast path is a traversal under shared bucket locks; misses go through
//! mapping under exclusive bucket locks; shortage falls back to eviction
//! under the global metadata lock. Any failure latches the request's mapping
//! error, unwinds partial work, and leaves no lock held.

use std::sync::Arc;

use tracing::{debug, error, trace, warn};

use crate::cache::Cache;
use crate::cleaner::CleanerAttribs;
use crate::common::{CacheLineIdx, EngineError, SECTOR_SHIFT};
use crate::concurrency::{ClMode, HbMode, LockAttempt};
use crate::eviction::EvictScope;
use crate::request::{Direction, LookupStatus, MapEntry, Request};

use super::traits::{IoInterface, LockType};

/// Outcome of [`prepare_clines`].
#[derive(Debug)]
pub enum PrepareResult {
    /// Every line is mapped and locked; the caller proceeds with the request.
    Acquired(Box<Request>),
    /// A cache line lock was contended; the request is parked and its resume
    /// callback will fire on grant.
    Parked,
    /// Mapping failed; the mapping error is latched, `req.error` carries
    /// [`EngineError::Mapping`], and the caller downgrades the request to
    /// pass-through.
    MappingError(Box<Request>),
}

/// Latches the mapping failure on the request and hands it back.
fn fail_mapping(mut req: Box<Request>) -> PrepareResult {
    req.info.mapping_error = true;
    req.error = Some(EngineError::Mapping);
    PrepareResult::MappingError(req)
}

/// Reports a request-level error, optionally stopping the cache.
pub fn engine_error(cache: &Cache, req: &Request, stop_cache: bool, msg: &str) {
    if stop_cache {
        cache.set_running(false);
    }
    error!(
        core = req.core_id.val(),
        sector = req.byte_position >> SECTOR_SHIFT,
        bytes = req.byte_length,
        "{msg}"
    );
}

/// Re-resolves one map entry against the collision index.
///
/// Starts from a miss assumption and promotes to a hit on a chain match.
fn lookup_map_entry(cache: &Cache, entry: &mut MapEntry) {
    entry.status = LookupStatus::Miss;
    entry.coll_idx = None;
    entry.re_part = false;
    entry.invalid = false;
    if let Some(line) = cache.metadata.lookup(entry.hash, entry.core_id, entry.core_line) {
        entry.coll_idx = Some(line);
        entry.status = LookupStatus::Hit;
    }
}

/// Whether the cache lines at `idx` and `idx + 1` are physically contiguous.
fn clines_phys_cont(req: &Request, idx: usize) -> bool {
    let first = req.map[idx];
    let second = req.map[idx + 1];
    if first.status == LookupStatus::Miss || second.status == LookupStatus::Miss {
        return false;
    }
    match (first.coll_idx, second.coll_idx) {
        (Some(a), Some(b)) => a.val() + 1 == b.val(),
        _ => false,
    }
}

/// Folds entry `idx` into the request's aggregate info.
///
/// Hits account sector validity, dirtiness and partition placement; inserted
/// and remapped entries only bump the insert count.
fn update_req_info(cache: &Cache, req: &mut Request, idx: usize) {
    let (start, end) = req.line_range_sectors(idx);
    let entry = req.map[idx];
    match entry.status {
        LookupStatus::Hit => {
            let Some(line) = entry.coll_idx else {
                unreachable!("hit entry without a cache line")
            };
            let table = &cache.metadata.table;
            if table.valid_sec_test(line, start, end) {
                req.info.hit_no += 1;
            } else {
                req.info.invalid_no += 1;
            }
            if table.dirty_test(line) {
                req.info.dirty_any += 1;
                if table.dirty_sec_test_all(line, start, end) {
                    req.info.dirty_all += 1;
                }
            }
            if req.part_id != table.partition_id(line) {
                req.map[idx].re_part = true;
                req.info.re_part_no += 1;
            }
        }
        LookupStatus::Inserted | LookupStatus::Remapped => req.info.insert_no += 1,
        LookupStatus::Miss => {}
    }

    if idx > 0 && clines_phys_cont(req, idx - 1) {
        req.info.seq_no += 1;
    }
}

/// Fills the request map from the collision index and rebuilds `req.info`.
///
/// The caller must hold the request's bucket set at least shared (or the
/// global lock exclusively). Never allocates; hits are promoted in the
/// eviction policy.
pub fn traverse(cache: &Cache, req: &mut Request) {
    req.clear_info();

    for idx in 0..req.core_line_count as usize {
        lookup_map_entry(cache, &mut req.map[idx]);
        let entry = req.map[idx];
        if entry.status != LookupStatus::Hit {
            trace!(core_line = entry.core_line.val(), "miss");
            continue;
        }
        let Some(line) = entry.coll_idx else {
            unreachable!("hit entry without a cache line")
        };
        trace!(
            core_line = entry.core_line.val(),
            line = line.val(),
            "hit"
        );
        cache.eviction.touch_hot(line);
        update_req_info(cache, req, idx);
    }

    trace!(sequential = req.is_sequential(), "traverse complete");
}

/// Re-verifies every mapped entry's identity after a parked request resumes.
///
/// Diverged entries are flagged `invalid`; valid entries rebuild `req.info`.
/// Returns whether the whole mapping is still consistent. The caller must
/// hold the bucket set shared.
pub fn check(cache: &Cache, req: &mut Request) -> bool {
    let mut consistent = true;
    req.clear_info();

    for idx in 0..req.core_line_count as usize {
        let entry = req.map[idx];
        if entry.status == LookupStatus::Miss {
            continue;
        }
        let Some(line) = entry.coll_idx else {
            unreachable!("mapped entry without a cache line")
        };
        let (core_id, core_line) = cache.metadata.info_of(line);
        if core_id == entry.core_id && core_line == entry.core_line {
            req.map[idx].invalid = false;
            update_req_info(cache, req, idx);
        } else {
            req.map[idx].invalid = true;
            consistent = false;
            trace!(line = line.val(), "mapping diverged");
        }
    }

    consistent
}

/// Allocates a free slot for entry `idx` and splices it into its chain.
fn alloc_map_line(cache: &Cache, req: &mut Request, idx: usize) -> bool {
    let Some(line) = cache.freelist.take() else {
        return false;
    };
    let entry = req.map[idx];
    cache.metadata.partitions.add_line(req.part_id);
    cache.metadata.table.set_partition_id(line, req.part_id);
    cache
        .metadata
        .add_to_collision(entry.hash, line, entry.core_id, entry.core_line);
    cache.eviction.init_line(req.part_id, line);
    cache.eviction.touch_hot(line);
    req.map[idx].coll_idx = Some(line);
    req.map[idx].status = LookupStatus::Inserted;
    true
}

/// Unwinds every inserted/remapped entry after a mapping failure.
///
/// Each such line is unchained, invalidated, unbound, dropped from its
/// partition and the eviction policy, and returned to the free list; the
/// entry reverts to a miss. The info aggregate is rebuilt over the unwound
/// map and the mapping error stays latched.
fn map_handle_error(cache: &Cache, req: &mut Request) {
    for idx in 0..req.core_line_count as usize {
        let entry = req.map[idx];
        match entry.status {
            LookupStatus::Inserted | LookupStatus::Remapped => {
                let Some(line) = entry.coll_idx else {
                    unreachable!("mapped entry without a cache line")
                };
                debug!(line = line.val(), "canceling cache line");
                cache.metadata.remove_from_collision(line);
                cache.metadata.table.invalidate_all(line);
                let part = cache.metadata.table.partition_id(line);
                cache.metadata.table.clear_core_info(line);
                cache.metadata.partitions.remove_line(part);
                cache.eviction.remove_line(line);
                cache.freelist.put(line);
                req.map[idx].status = LookupStatus::Miss;
                req.map[idx].coll_idx = None;
            }
            LookupStatus::Hit | LookupStatus::Miss => {}
        }
    }

    req.clear_info();
    for idx in 0..req.core_line_count as usize {
        update_req_info(cache, req, idx);
    }
    req.info.mapping_error = true;
}

/// Moves hit lines flagged for re-partitioning into the request's partition.
fn repart_hits(cache: &Cache, req: &mut Request) {
    for idx in 0..req.core_line_count as usize {
        let entry = req.map[idx];
        if entry.status != LookupStatus::Hit || !entry.re_part {
            continue;
        }
        let Some(line) = entry.coll_idx else {
            continue;
        };
        let from = cache.metadata.table.partition_id(line);
        if from == req.part_id {
            continue;
        }
        cache.metadata.partitions.remove_line(from);
        cache.metadata.partitions.add_line(req.part_id);
        cache.metadata.table.set_partition_id(line, req.part_id);
        cache.eviction.remove_line(line);
        cache.eviction.init_line(req.part_id, line);
        cache.eviction.touch_hot(line);
    }
}

/// Maps every unmapped entry into a free slot.
///
/// Must run with the bucket set exclusive (or the global lock exclusive).
/// Entries already inserted or remapped by this request are kept; miss and
/// hit entries are re-resolved because the lock upgrade may have released
/// the buckets. On free-list exhaustion the mapping error is latched and all
/// partial work is unwound.
fn map(cache: &Cache, req: &mut Request) {
    if u64::from(req.unmapped_count()) > cache.freelist.num_free() {
        req.info.mapping_error = true;
        return;
    }

    req.clear_info();

    for idx in 0..req.core_line_count as usize {
        match req.map[idx].status {
            LookupStatus::Inserted | LookupStatus::Remapped => {}
            LookupStatus::Miss | LookupStatus::Hit => {
                lookup_map_entry(cache, &mut req.map[idx]);
                if req.map[idx].status == LookupStatus::Miss && !alloc_map_line(cache, req, idx) {
                    debug!("free list exhausted mid-map");
                    map_handle_error(cache, req);
                    return;
                }
            }
        }
        update_req_info(cache, req, idx);
    }

    repart_hits(cache, req);
    cache.promotion.purge(req);

    trace!(sequential = req.is_sequential(), "mapping complete");
}

/// Rebinds up to `count` eviction victims onto the request's miss entries.
///
/// Runs under the global metadata lock. Victims must be clean, unlocked and
/// not already mapped by this request; each is unchained, invalidated, moved
/// to the request's partition and spliced into the target chain as a
/// `Remapped` entry, in request order. Returns the number supplied.
fn evict_and_remap(cache: &Cache, req: &mut Request, count: u32, scope: EvictScope) -> u32 {
    if count == 0 {
        return 0;
    }

    // Never recycle a line the request itself hits.
    let ours: Vec<u32> = req
        .map
        .iter()
        .filter_map(|entry| entry.coll_idx)
        .map(CacheLineIdx::val)
        .collect();
    let eligible = |line: CacheLineIdx| {
        !ours.contains(&line.val())
            && !cache.metadata.table.dirty_test(line)
            && cache.cl_locks.is_unlocked(line)
    };
    let victims = cache.eviction.victims(scope, count, &eligible);

    let mut supplied = 0u32;
    let mut next_victim = victims.iter().copied();
    for idx in 0..req.core_line_count as usize {
        if req.map[idx].status != LookupStatus::Miss {
            continue;
        }
        let Some(line) = next_victim.next() else {
            break;
        };
        let entry = req.map[idx];
        debug!(
            victim = line.val(),
            core_line = entry.core_line.val(),
            "remapping eviction victim"
        );
        cache.metadata.remove_from_collision(line);
        cache.metadata.table.invalidate_all(line);
        cache
            .metadata
            .partitions
            .remove_line(cache.metadata.table.partition_id(line));
        cache.eviction.remove_line(line);
        cache.metadata.partitions.add_line(req.part_id);
        cache.metadata.table.set_partition_id(line, req.part_id);
        cache
            .metadata
            .add_to_collision(entry.hash, line, entry.core_id, entry.core_line);
        cache.eviction.init_line(req.part_id, line);
        cache.eviction.touch_hot(line);
        req.map[idx].status = LookupStatus::Remapped;
        req.map[idx].coll_idx = Some(line);
        supplied += 1;
    }

    supplied
}

/// Acquires the cache line locks in the mode the engine callback declares.
///
/// `LockType::None` succeeds synchronously without touching the manager.
fn lock_clines(cache: &Arc<Cache>, req: Box<Request>) -> LockAttempt {
    let lock_type = req.engine_cbs.lock_type(&req);
    match lock_type {
        LockType::None => LockAttempt::Acquired(req),
        LockType::Read => cache.cl_locks.lock_or_park(req, ClMode::Read),
        LockType::Write => cache.cl_locks.lock_or_park(req, ClMode::Write),
    }
}

/// Releases the request's cache line locks and resumes any granted waiters.
pub fn unlock_clines(cache: &Arc<Cache>, req: &mut Request) {
    let granted = cache.cl_locks.unlock(req);
    for parked in granted {
        let cbs = Arc::clone(&parked.engine_cbs);
        cbs.resume(cache, parked);
    }
}

fn hb_lock_rd(cache: &Cache, req: &mut Request) {
    debug_assert!(req.hb_mode.is_none(), "bucket set already locked");
    cache.metadata.lock.req_lock_rd(&req.lock_set);
    req.hb_mode = Some(HbMode::Read);
}

fn hb_unlock_rd(cache: &Cache, req: &mut Request) {
    debug_assert_eq!(req.hb_mode, Some(HbMode::Read));
    cache.metadata.lock.req_unlock_rd(&req.lock_set);
    req.hb_mode = None;
}

fn hb_upgrade(cache: &Cache, req: &mut Request) {
    debug_assert_eq!(req.hb_mode, Some(HbMode::Read));
    cache.metadata.lock.upgrade(&req.lock_set);
    req.hb_mode = Some(HbMode::Write);
}

fn hb_unlock_wr(cache: &Cache, req: &mut Request) {
    debug_assert_eq!(req.hb_mode, Some(HbMode::Write));
    cache.metadata.lock.req_unlock_wr(&req.lock_set);
    req.hb_mode = None;
}

/// Miss handling: mapping under exclusive buckets, eviction as the fallback.
fn prepare_clines_miss(cache: &Arc<Cache>, mut req: Box<Request>) -> PrepareResult {
    // Requests to disabled partitions go in pass-through.
    if !cache.metadata.partitions.is_enabled(req.part_id) {
        hb_unlock_rd(cache, &mut req);
        return fail_mapping(req);
    }

    if cache
        .metadata
        .partitions
        .has_space(req.part_id, req.unmapped_count())
    {
        // Mapping must run holding (at least) the bucket set exclusively.
        hb_upgrade(cache, &mut req);
        map(cache, &mut req);

        if !req.info.mapping_error {
            let set = req.lock_set.clone();
            req.hb_mode = None;
            let attempt = lock_clines(cache, req);
            cache.metadata.lock.req_unlock_wr(&set);
            return match attempt {
                LockAttempt::Acquired(r) => PrepareResult::Acquired(r),
                LockAttempt::Parked => PrepareResult::Parked,
            };
        }

        hb_unlock_wr(cache, &mut req);
    } else {
        hb_unlock_rd(cache, &mut req);
    }

    // Eviction slow path: the whole metadata graph is frozen while victims
    // are chosen and rebound.
    debug!("entering eviction slow path");
    cache.metadata.lock.start_exclusive();

    // Repeat the traversal to pick up the latest metadata status.
    traverse(cache, &mut req);

    req.part_evict = !cache
        .metadata
        .partitions
        .has_space(req.part_id, req.unmapped_count());

    let unmapped = req.unmapped_count();
    let (scope, needed) = if req.part_evict {
        (EvictScope::Partition(req.part_id), unmapped)
    } else {
        (
            EvictScope::Any,
            unmapped.saturating_sub(cache.freelist.num_free() as u32),
        )
    };

    let supplied = evict_and_remap(cache, &mut req, needed, scope);
    if supplied < needed {
        debug!(needed, supplied, "eviction could not supply enough victims");
        map_handle_error(cache, &mut req);
        cache.metadata.lock.end_exclusive();
        return fail_mapping(req);
    }

    map(cache, &mut req);
    if req.info.mapping_error {
        cache.metadata.lock.end_exclusive();
        return fail_mapping(req);
    }

    let attempt = lock_clines(cache, req);
    cache.metadata.lock.end_exclusive();
    match attempt {
        LockAttempt::Acquired(r) => PrepareResult::Acquired(r),
        LockAttempt::Parked => PrepareResult::Parked,
    }
}

/// Prepares every core line of a request: lookup, mapping or eviction as
/// needed, and cache line lock acquisition.
///
/// On return no hash-bucket lock and no global metadata hold remain, in every
/// outcome. See [`PrepareResult`] for the contract per variant.
pub fn prepare_clines(cache: &Arc<Cache>, mut req: Box<Request>) -> PrepareResult {
    // Hash buckets associated with the request's core lines are read-locked
    // so the mapping cannot change during traversal.
    req.compute_hashes(&cache.metadata.hash);
    hb_lock_rd(cache, &mut req);

    traverse(cache, &mut req);

    if req.is_fully_mapped() {
        // The lock attempt happens under the bucket set; a parked request's
        // box is owned by the lock manager, so the set to release is copied
        // out first.
        let set = req.lock_set.clone();
        req.hb_mode = None;
        let attempt = lock_clines(cache, req);
        cache.metadata.lock.req_unlock_rd(&set);
        return match attempt {
            LockAttempt::Acquired(r) => PrepareResult::Acquired(r),
            LockAttempt::Parked => PrepareResult::Parked,
        };
    }

    if !cache.promotion.should_promote(&req) {
        hb_unlock_rd(cache, &mut req);
        return fail_mapping(req);
    }

    prepare_clines_miss(cache, req)
}

/// Hands the request's dirty hit lines to the external cleaner.
///
/// The caller holds the cache line locks; the cleaner is told not to re-lock.
/// On success the dirty counters are zeroed and the request re-enters the
/// head of its queue; on error the request completes with the cleaner error
/// and its locks are released.
pub fn clean(cache: &Arc<Cache>, req: Box<Request>) {
    let count = req.info.dirty_any;
    let attribs = CleanerAttribs::new(false, count, req, Box::new(clean_end));
    cache.cleaner.fire(cache, attribs);
}

fn clean_end(cache: &Arc<Cache>, mut req: Box<Request>, result: Result<(), EngineError>) {
    match result {
        Ok(()) => {
            req.info.dirty_any = 0;
            req.info.dirty_all = 0;
            push_req_front(cache, req, true);
        }
        Err(err) => {
            debug!("cleaning error");
            req.error = Some(err.clone());
            unlock_clines(cache, &mut req);
            finish_request(req, Err(err));
        }
    }
}

fn finish_request(mut req: Box<Request>, result: Result<(), EngineError>) {
    if let Some(complete) = req.complete.take() {
        complete(req, result);
    }
}

/// Accounts the request's byte volume in the cache statistics.
pub fn update_block_stats(cache: &Cache, req: &Request) {
    cache
        .stats
        .note_block(req.direction, u64::from(req.byte_length));
}

/// Accounts the request's hit outcome in the cache statistics.
pub fn update_request_stats(cache: &Cache, req: &Request) {
    cache
        .stats
        .note_request(req.direction, req.info.hit_no, req.core_line_count);
}

/// Appends a request to the tail of its queue and kicks the executor.
pub fn push_req_back(cache: &Cache, req: Box<Request>, allow_sync: bool) {
    if !req.internal {
        cache.touch_last_access();
    }
    let queue = Arc::clone(&req.queue);
    queue.push_back(req);
    // The request may already be running on a worker; only the queue handle
    // is touched from here on.
    queue.kick(allow_sync);
}

/// Prepends a request to the head of its queue and kicks the executor.
///
/// Used for resumptions, which must overtake newly submitted work.
pub fn push_req_front(cache: &Cache, req: Box<Request>, allow_sync: bool) {
    if !req.internal {
        cache.touch_last_access();
    }
    let queue = Arc::clone(&req.queue);
    queue.push_front(req);
    queue.kick(allow_sync);
}

/// Installs an I/O interface and prepends the request to its queue.
pub fn push_req_front_if(
    cache: &Cache,
    mut req: Box<Request>,
    io_if: Arc<dyn IoInterface>,
    allow_sync: bool,
) {
    debug_assert!(
        req.error.is_none(),
        "refresh must start with a clear error slot"
    );
    req.io_if = Some(io_if);
    push_req_front(cache, req, allow_sync);
}

/// Refresh interface installed while a resumed request re-validates.
struct RefreshIo;

impl IoInterface for RefreshIo {
    fn read(&self, cache: &Arc<Cache>, req: Box<Request>) {
        refresh(cache, req);
    }

    fn write(&self, cache: &Arc<Cache>, req: Box<Request>) {
        refresh(cache, req);
    }
}

fn refresh(cache: &Arc<Cache>, mut req: Box<Request>) {
    // Check under the shared bucket locks.
    hb_lock_rd(cache, &mut req);
    let consistent = check(cache, &mut req);
    hb_unlock_rd(cache, &mut req);

    if consistent {
        // Refresh successful; processing continues with the original
        // interface.
        let Some(io_if) = req.saved_io_if.take() else {
            unreachable!("refresh without a saved I/O interface")
        };
        req.io_if = Some(Arc::clone(&io_if));
        match req.direction {
            Direction::Read => io_if.read(cache, req),
            Direction::Write => io_if.write(cache, req),
        }
    } else {
        warn!("inconsistent request after deferred lock grant");
        req.error = Some(EngineError::InconsistentRequest);
        unlock_clines(cache, &mut req);
        finish_request(req, Err(EngineError::InconsistentRequest));
    }
}

/// Entry point for deferred cache line lock grants.
///
/// Metadata may have changed while the request was parked, so the original
/// I/O interface is saved and a refresh interface is dispatched first; the
/// refresh re-validates the mapping before restoring the original.
pub fn on_resume(cache: &Arc<Cache>, mut req: Box<Request>) {
    debug_assert!(
        req.saved_io_if.is_none(),
        "resume with a refresh already in flight"
    );
    let Some(io_if) = req.io_if.take() else {
        unreachable!("resume without an I/O interface")
    };
    req.saved_io_if = Some(io_if);

    debug!("on resume");
    push_req_front_if(cache, req, Arc::new(RefreshIo), false);
}
