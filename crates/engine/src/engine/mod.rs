//! The request engine: preparation pipeline, refresh, and queue handoff.
//!
//! This module orchestrates the per-request state machine over the metadata,
//! free list, eviction and lock subsystems. It provides:
//! 1. **Preparation:** [`prepare_clines`] and its traversal/mapping passes.
//! 2. **Refresh:** [`on_resume`] and [`check`] for deferred lock grants.
//! 3. **Cleaner handoff:** [`clean`] for dirty-hit requests.
//! 4. **Queue handoff:** the `push_req_*` family.
//! 5. **Seams:** the [`traits`] the surrounding I/O engines implement.

/// Pipeline implementation.
pub mod common;

/// Callback traits for the surrounding I/O engines.
pub mod traits;

pub use common::{
    PrepareResult, check, clean, engine_error, on_resume, prepare_clines, push_req_back,
    push_req_front, push_req_front_if, traverse, unlock_clines, update_block_stats,
    update_request_stats,
};
pub use traits::{DefaultCallbacks, EngineCallbacks, IoInterface, LockType};
