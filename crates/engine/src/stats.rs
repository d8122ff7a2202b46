//! Cache-scope statistic counters.
//!
//! Flat atomic counters fed by the engine's per-request hooks. Aggregation,
//! rates and reporting belong to the embedder; the engine only counts.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::request::Direction;

/// Request and volume counters for one cache.
#[derive(Debug, Default)]
pub struct CacheStats {
    read_requests: AtomicU64,
    write_requests: AtomicU64,
    full_hit_requests: AtomicU64,
    request_lines: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
}

impl CacheStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accounts one prepared request and its hit outcome.
    pub fn note_request(&self, direction: Direction, hit_no: u32, line_count: u32) {
        let counter = match direction {
            Direction::Read => &self.read_requests,
            Direction::Write => &self.write_requests,
        };
        let _ = counter.fetch_add(1, Ordering::Relaxed);
        let _ = self
            .request_lines
            .fetch_add(u64::from(line_count), Ordering::Relaxed);
        if hit_no == line_count {
            let _ = self.full_hit_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Accounts transferred byte volume.
    pub fn note_block(&self, direction: Direction, bytes: u64) {
        let counter = match direction {
            Direction::Read => &self.bytes_read,
            Direction::Write => &self.bytes_written,
        };
        let _ = counter.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Read requests counted so far.
    pub fn read_requests(&self) -> u64 {
        self.read_requests.load(Ordering::Relaxed)
    }

    /// Write requests counted so far.
    pub fn write_requests(&self) -> u64 {
        self.write_requests.load(Ordering::Relaxed)
    }

    /// Requests whose every core line hit.
    pub fn full_hit_requests(&self) -> u64 {
        self.full_hit_requests.load(Ordering::Relaxed)
    }

    /// Total core lines covered by counted requests.
    pub fn request_lines(&self) -> u64 {
        self.request_lines.load(Ordering::Relaxed)
    }

    /// Bytes counted for reads.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    /// Bytes counted for writes.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }
}
