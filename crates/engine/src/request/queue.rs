//! Request queues.
//!
//! A request is owned by exactly one queue at a time; workers pop from the
//! front and queues kick their executor after every push. Resumed requests
//! are pushed to the front so they overtake newly submitted work.
//!
//! Pushing transfers ownership of the boxed request. A worker may pop and
//! complete it the instant the list lock drops, which is why the kick happens
//! through the queue handle and never through the request.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use super::Request;

/// Executor notification hook: wakes whatever runs this queue's requests.
pub trait QueueKicker: Send + Sync {
    /// Notifies the executor; `allow_sync` permits draining on this thread.
    fn kick(&self, allow_sync: bool);
}

/// A kicker that does nothing; workers poll the queue instead.
#[derive(Debug, Default, Clone, Copy)]
pub struct NopKicker;

impl QueueKicker for NopKicker {
    fn kick(&self, _allow_sync: bool) {}
}

/// An ordered queue of requests awaiting a worker.
pub struct RequestQueue {
    list: Mutex<VecDeque<Box<Request>>>,
    io_no: AtomicU32,
    kicker: Box<dyn QueueKicker>,
}

impl std::fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestQueue")
            .field("io_no", &self.io_no.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl RequestQueue {
    /// Creates an empty queue with the given executor hook.
    pub fn new(kicker: Box<dyn QueueKicker>) -> Self {
        Self {
            list: Mutex::new(VecDeque::new()),
            io_no: AtomicU32::new(0),
            kicker,
        }
    }

    /// Appends a request to the tail.
    pub fn push_back(&self, req: Box<Request>) {
        let mut list = self.list.lock();
        list.push_back(req);
        let _ = self.io_no.fetch_add(1, Ordering::AcqRel);
    }

    /// Prepends a request to the head (resumptions overtake new work).
    pub fn push_front(&self, req: Box<Request>) {
        let mut list = self.list.lock();
        list.push_front(req);
        let _ = self.io_no.fetch_add(1, Ordering::AcqRel);
    }

    /// Pops the request at the head, if any.
    pub fn pop_front(&self) -> Option<Box<Request>> {
        let popped = self.list.lock().pop_front();
        if popped.is_some() {
            let _ = self.io_no.fetch_sub(1, Ordering::AcqRel);
        }
        popped
    }

    /// Number of queued requests.
    pub fn len(&self) -> u32 {
        self.io_no.load(Ordering::Acquire)
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wakes the executor.
    pub fn kick(&self, allow_sync: bool) {
        self.kicker.kick(allow_sync);
    }
}
