//! Cleaner seam.
//!
//! The cleaner writes dirty cache lines back to their core device. The device
//! I/O is external; the engine hands over a [`CleanerAttribs`] record naming
//! the dirty lines of one request and a completion to call when the writeback
//! finishes.

use std::sync::Arc;

use crate::cache::Cache;
use crate::common::{CacheLineIdx, EngineError};
use crate::request::{LookupStatus, Request};

/// Completion invoked by the cleaner when it finishes a request's lines.
pub type CleanerCompleteFn =
    Box<dyn FnOnce(&Arc<Cache>, Box<Request>, Result<(), EngineError>) + Send>;

/// Work order handed to the external cleaner.
pub struct CleanerAttribs {
    /// Whether the cleaner must lock the lines itself.
    ///
    /// `false` when the caller already holds the cache line locks, as the
    /// engine's clean-before-use path does.
    pub lock_cachelines: bool,
    /// Number of lines to clean; equals the request's `dirty_any`.
    pub count: u32,
    req: Box<Request>,
    complete: CleanerCompleteFn,
}

impl std::fmt::Debug for CleanerAttribs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanerAttribs")
            .field("lock_cachelines", &self.lock_cachelines)
            .field("count", &self.count)
            .finish_non_exhaustive()
    }
}

impl CleanerAttribs {
    /// Builds a work order owning `req` until [`CleanerAttribs::finish`].
    pub fn new(
        lock_cachelines: bool,
        count: u32,
        req: Box<Request>,
        complete: CleanerCompleteFn,
    ) -> Self {
        Self {
            lock_cachelines,
            count,
            req,
            complete,
        }
    }

    /// The request being cleaned.
    pub fn request(&self) -> &Request {
        &self.req
    }

    /// The dirty hit lines to clean, in request order.
    pub fn dirty_lines(&self, cache: &Cache) -> Vec<CacheLineIdx> {
        self.req
            .map
            .iter()
            .filter(|entry| entry.status == LookupStatus::Hit)
            .filter_map(|entry| entry.coll_idx)
            .filter(|&line| cache.metadata.table.dirty_test(line))
            .collect()
    }

    /// Hands the request back through the stored completion.
    pub fn finish(self, cache: &Arc<Cache>, result: Result<(), EngineError>) {
        (self.complete)(cache, self.req, result);
    }
}

/// External subsystem performing dirty line writeback.
pub trait Cleaner: Send + Sync {
    /// Starts cleaning the lines named by `attribs`.
    ///
    /// The cleaner must eventually call [`CleanerAttribs::finish`].
    fn fire(&self, cache: &Arc<Cache>, attribs: CleanerAttribs);
}
