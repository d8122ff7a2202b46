//! Callback seams between the engine core and the I/O engines around it.
//!
//! The read/write engines that drive actual device I/O live outside this
//! crate. They plug in through two traits: [`EngineCallbacks`] answers
//! per-request questions during preparation (lock mode) and handles deferred
//! lock grants; [`IoInterface`] is the dispatch table a queue worker invokes
//! for whatever processing phase a request is in.

use std::sync::Arc;

use crate::cache::Cache;
use crate::request::Request;

/// Cache line lock mode an engine wants for a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockType {
    /// No cache line locks needed.
    None,
    /// Shared data access.
    Read,
    /// Exclusive data access.
    Write,
}

/// Per-request callbacks supplied by the owning I/O engine.
pub trait EngineCallbacks: Send + Sync {
    /// Lock mode the engine needs on the request's cache lines.
    fn lock_type(&self, req: &Request) -> LockType;

    /// Invoked when a deferred cache line lock is finally granted.
    fn resume(&self, cache: &Arc<Cache>, req: Box<Request>);
}

/// Callbacks for engines that resume through the standard refresh pass.
#[derive(Debug, Clone, Copy)]
pub struct DefaultCallbacks {
    /// Lock mode reported for every request.
    pub lock: LockType,
}

impl EngineCallbacks for DefaultCallbacks {
    fn lock_type(&self, _req: &Request) -> LockType {
        self.lock
    }

    fn resume(&self, cache: &Arc<Cache>, req: Box<Request>) {
        super::on_resume(cache, req);
    }
}

/// Dispatch table a queue worker calls to process a request.
pub trait IoInterface: Send + Sync {
    /// Processes a read request.
    fn read(&self, cache: &Arc<Cache>, req: Box<Request>);

    /// Processes a write request.
    fn write(&self, cache: &Arc<Cache>, req: Box<Request>);
}
