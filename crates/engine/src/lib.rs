//! Block-level cache engine core.
//!
//! This crate implements the request preparation core of a block cache that
//! sits between a host I/O submitter and two block devices — a fast *cache
//! device* and a slow *core device* — with the following:
//! 1. **Metadata:** a collision hash index, per-line sector state, and
//!    partition budgets over a dense cache line arena.
//! 2. **Allocation:** a free list plus LRU eviction with victim remapping.
//! 3. **Locking:** a global/bucket/cache-line lock hierarchy with
//!    asynchronous cache line lock grants.
//! 4. **Engine:** the `prepare_clines` pipeline, the post-resume refresh
//!    pass, the dirty-line cleaner handoff, and request queue handoff.
//!
//! The surrounding I/O engines (read/write paths, cleaner device I/O,
//! promotion heuristics, queue executors) plug in through the traits in
//! [`engine::traits`], [`promotion`] and [`cleaner`].

/// The assembled cache object.
pub mod cache;
/// Cleaner seam (dirty line writeback work orders).
pub mod cleaner;
/// Common types and constants (indices, sector geometry, errors).
pub mod common;
/// Lock hierarchy (bucket/global locks, cache line locks).
pub mod concurrency;
/// Engine configuration (defaults, enums, validation).
pub mod config;
/// The request engine: preparation, refresh, cleaner and queue handoff.
pub mod engine;
/// Eviction policies (LRU).
pub mod eviction;
/// Free cache line allocator.
pub mod freelist;
/// Cache metadata: line arena, collision index, partitions.
pub mod metadata;
/// Promotion policy seam.
pub mod promotion;
/// Requests, map entries, and request queues.
pub mod request;
/// Cache-scope statistic counters.
pub mod stats;

/// Top-level cache type; construct with [`Cache::new`].
pub use crate::cache::Cache;
/// Root configuration type; use `CacheConfig::default()` or deserialize from JSON.
pub use crate::config::CacheConfig;
/// Preparation entry point and its outcome.
pub use crate::engine::{PrepareResult, prepare_clines};
/// The unit of work flowing through the engine.
pub use crate::request::Request;
