//! Mock implementations of the engine's external collaborators.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use blkcache_core::Cache;
use blkcache_core::cleaner::{Cleaner, CleanerAttribs};
use blkcache_core::common::EngineError;
use blkcache_core::engine::IoInterface;
use blkcache_core::promotion::PromotionPolicy;
use blkcache_core::request::{CompleteFn, Request};

/// A cleaner that records every work order and lets the test finish it.
#[derive(Default)]
pub struct MockCleaner {
    /// `(count, lock_cachelines, dirty line indices)` per fire.
    pub fired: Mutex<Vec<(u32, bool, Vec<u32>)>>,
    pending: Mutex<Option<CleanerAttribs>>,
}

impl Cleaner for MockCleaner {
    fn fire(&self, cache: &Arc<Cache>, attribs: CleanerAttribs) {
        let lines = attribs
            .dirty_lines(cache)
            .iter()
            .map(|line| line.val())
            .collect();
        self.fired
            .lock()
            .unwrap()
            .push((attribs.count, attribs.lock_cachelines, lines));
        *self.pending.lock().unwrap() = Some(attribs);
    }
}

impl MockCleaner {
    /// Completes the pending work order with `result`.
    pub fn finish(&self, cache: &Arc<Cache>, result: Result<(), EngineError>) {
        let attribs = self
            .pending
            .lock()
            .unwrap()
            .take()
            .expect("a pending clean to finish");
        attribs.finish(cache, result);
    }

    /// Whether a work order is waiting to be finished.
    pub fn has_pending(&self) -> bool {
        self.pending.lock().unwrap().is_some()
    }
}

/// A promotion policy with a fixed verdict and a purge counter.
pub struct ProbePromotion {
    /// Verdict returned from `should_promote`.
    pub promote: bool,
    /// Number of `purge` calls observed.
    pub purges: AtomicU32,
}

impl ProbePromotion {
    pub fn approving() -> Self {
        Self {
            promote: true,
            purges: AtomicU32::new(0),
        }
    }

    pub fn declining() -> Self {
        Self {
            promote: false,
            purges: AtomicU32::new(0),
        }
    }
}

impl PromotionPolicy for ProbePromotion {
    fn should_promote(&self, _req: &Request) -> bool {
        self.promote
    }

    fn purge(&self, _req: &Request) {
        let _ = self.purges.fetch_add(1, Ordering::Relaxed);
    }
}

/// An I/O interface that counts dispatches and keeps the last request.
#[derive(Default)]
pub struct RecordingIo {
    pub reads: AtomicU32,
    pub writes: AtomicU32,
    pub last: Mutex<Option<Box<Request>>>,
}

impl IoInterface for RecordingIo {
    fn read(&self, _cache: &Arc<Cache>, req: Box<Request>) {
        let _ = self.reads.fetch_add(1, Ordering::Relaxed);
        *self.last.lock().unwrap() = Some(req);
    }

    fn write(&self, _cache: &Arc<Cache>, req: Box<Request>) {
        let _ = self.writes.fetch_add(1, Ordering::Relaxed);
        *self.last.lock().unwrap() = Some(req);
    }
}

/// Slot a completion probe writes its observed result into.
pub type CompletionSlot = Arc<Mutex<Option<Result<(), EngineError>>>>;

/// Builds a one-shot completion that records its result.
pub fn completion_probe() -> (CompleteFn, CompletionSlot) {
    let slot: CompletionSlot = Arc::new(Mutex::new(None));
    let writer = Arc::clone(&slot);
    let complete: CompleteFn = Box::new(move |_req, result| {
        *writer.lock().unwrap() = Some(result);
    });
    (complete, slot)
}
