//! Per-cache-line lock manager.
//!
//! Requests lock every cache line they map, all-or-nothing, in the mode their
//! engine callback declares. A request that cannot take all its lines at once
//! is *parked*: ownership of its `Box<Request>` moves into the waiter queue,
//! and when a later unlock makes its whole line set available the box is
//! handed back to the unlocking caller, which fires the parked request's
//! resume callback. Two requests touching the same cache line are therefore
//! serialized; requests on disjoint lines run concurrently. Waiters are
//! re-attempted in arrival order, but only per-line serialization is
//! guaranteed: a later waiter whose lines are all free is granted even while
//! an earlier waiter stays blocked on a held line.
//!
//! All state transitions are serialized on one mutex. The manager is touched
//! a constant number of times per request, and keeping grant/park decisions
//! atomic with the lock state makes eviction's `is_unlocked` eligibility
//! check exact.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::common::CacheLineIdx;
use crate::request::Request;

/// Mode a request holds (or wants) its cache lines in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClMode {
    /// Shared data access.
    Read,
    /// Exclusive data access.
    Write,
}

/// Outcome of an asynchronous cache line lock attempt.
#[derive(Debug)]
pub enum LockAttempt {
    /// All lines were taken synchronously; the request comes back to the caller.
    Acquired(Box<Request>),
    /// The request was parked; its resume callback fires on grant.
    Parked,
}

#[derive(Clone, Copy, Default)]
struct LineLock {
    readers: u32,
    writer: bool,
}

impl LineLock {
    fn available(self, mode: ClMode) -> bool {
        match mode {
            ClMode::Read => !self.writer,
            ClMode::Write => !self.writer && self.readers == 0,
        }
    }

    fn acquire(&mut self, mode: ClMode) {
        match mode {
            ClMode::Read => self.readers += 1,
            ClMode::Write => self.writer = true,
        }
    }

    fn release(&mut self, mode: ClMode) {
        match mode {
            ClMode::Read => {
                debug_assert_ne!(self.readers, 0, "read unlock without hold");
                self.readers -= 1;
            }
            ClMode::Write => {
                debug_assert!(self.writer, "write unlock without hold");
                self.writer = false;
            }
        }
    }
}

struct Waiter {
    req: Box<Request>,
    mode: ClMode,
}

struct ClState {
    lines: Vec<LineLock>,
    waiters: VecDeque<Waiter>,
}

/// Lock manager for the whole cache line arena.
pub struct CacheLineLocks {
    state: Mutex<ClState>,
}

impl std::fmt::Debug for CacheLineLocks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLineLocks").finish_non_exhaustive()
    }
}

/// Sorted, deduplicated cache lines a request has mapped.
fn request_lines(req: &Request) -> Vec<CacheLineIdx> {
    let mut lines: Vec<CacheLineIdx> = req.map.iter().filter_map(|entry| entry.coll_idx).collect();
    lines.sort_unstable();
    lines.dedup();
    lines
}

impl CacheLineLocks {
    /// Creates the manager for `count` cache lines.
    pub fn new(count: u32) -> Self {
        Self {
            state: Mutex::new(ClState {
                lines: vec![LineLock::default(); count as usize],
                waiters: VecDeque::new(),
            }),
        }
    }

    /// Attempts to lock every mapped line of `req` in `mode`.
    ///
    /// On contention the request joins the waiter queue and
    /// [`LockAttempt::Parked`] is returned; the box comes back through a
    /// later [`CacheLineLocks::unlock`] grant.
    pub fn lock_or_park(&self, mut req: Box<Request>, mode: ClMode) -> LockAttempt {
        let lines = request_lines(&req);
        let mut state = self.state.lock();
        if Self::take_all(&mut state.lines, &lines, mode) {
            req.cl_mode = Some(mode);
            req.cl_locked = lines;
            return LockAttempt::Acquired(req);
        }
        state.waiters.push_back(Waiter { req, mode });
        LockAttempt::Parked
    }

    /// Releases every line `req` holds and re-attempts parked waiters.
    ///
    /// Waiters are scanned in arrival order and every one whose full line
    /// set is now available is granted, its lock bookkeeping filled in — a
    /// still-blocked earlier waiter does not hold back a grantable later
    /// one. The caller fires each granted request's resume callback.
    pub fn unlock(&self, req: &mut Request) -> Vec<Box<Request>> {
        let mut state = self.state.lock();
        if let Some(mode) = req.cl_mode.take() {
            for line in req.cl_locked.drain(..) {
                state.lines[line.val() as usize].release(mode);
            }
        }

        let mut granted = Vec::new();
        let mut remaining = VecDeque::with_capacity(state.waiters.len());
        while let Some(mut waiter) = state.waiters.pop_front() {
            let lines = request_lines(&waiter.req);
            if Self::take_all(&mut state.lines, &lines, waiter.mode) {
                waiter.req.cl_mode = Some(waiter.mode);
                waiter.req.cl_locked = lines;
                granted.push(waiter.req);
            } else {
                remaining.push_back(waiter);
            }
        }
        state.waiters = remaining;
        granted
    }

    /// Whether no request currently holds `line` in any mode.
    ///
    /// Used as the eviction eligibility check.
    pub fn is_unlocked(&self, line: CacheLineIdx) -> bool {
        let state = self.state.lock();
        let lock = state.lines[line.val() as usize];
        !lock.writer && lock.readers == 0
    }

    /// Number of parked requests (diagnostic).
    pub fn waiter_count(&self) -> usize {
        self.state.lock().waiters.len()
    }

    fn take_all(lines: &mut [LineLock], wanted: &[CacheLineIdx], mode: ClMode) -> bool {
        if wanted
            .iter()
            .any(|line| !lines[line.val() as usize].available(mode))
        {
            return false;
        }
        for line in wanted {
            lines[line.val() as usize].acquire(mode);
        }
        true
    }
}
