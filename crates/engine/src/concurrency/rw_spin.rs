//! Word-sized readers-writer spin lock.
//!
//! The bucket and global metadata locks are acquired and released across
//! function boundaries (a request read-locks its bucket set in one function
//! and releases it in another), so guard-based locks do not fit. [`RwSpin`]
//! packs the whole lock into one atomic word with explicit lock/unlock
//! operations:
//!
//! - bit 31: writer holds the lock
//! - bit 30: writer intent (blocks new readers while the holder drains)
//! - bits 0..30: reader count
//!
//! Writers first publish intent, then wait for readers to drain; new readers
//! spin while either writer bit is set. Unbalanced unlocks are logic bugs
//! caught by debug assertions, not undefined behavior.

use std::hint;
use std::sync::atomic::{AtomicU32, Ordering};

const WRITER: u32 = 1 << 31;
const INTENT: u32 = 1 << 30;
const READER: u32 = 1;

/// A readers-writer spin lock with explicit (non-guard) operations.
#[derive(Debug, Default)]
pub struct RwSpin {
    state: AtomicU32,
}

impl RwSpin {
    /// Creates a new unlocked lock.
    pub const fn new() -> Self {
        Self {
            state: AtomicU32::new(0),
        }
    }

    /// Acquires the lock in shared (read) mode, spinning while a writer
    /// holds it or has published intent.
    pub fn lock_shared(&self) {
        let mut state = self.state.load(Ordering::Relaxed);
        loop {
            if state & (WRITER | INTENT) != 0 {
                hint::spin_loop();
                state = self.state.load(Ordering::Relaxed);
                continue;
            }
            match self.state.compare_exchange_weak(
                state,
                state + READER,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(current) => state = current,
            }
        }
    }

    /// Tries to acquire the lock in shared mode without spinning.
    pub fn try_lock_shared(&self) -> bool {
        let state = self.state.load(Ordering::Relaxed);
        if state & (WRITER | INTENT) != 0 {
            return false;
        }
        self.state
            .compare_exchange(state, state + READER, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Releases one shared hold.
    pub fn unlock_shared(&self) {
        let prev = self.state.fetch_sub(READER, Ordering::Release);
        debug_assert_ne!(prev & !(WRITER | INTENT), 0, "unlock_shared without hold");
    }

    /// Acquires the lock exclusively, spinning until all readers drain.
    pub fn lock_exclusive(&self) {
        // Publish intent first so a stream of readers cannot starve us.
        loop {
            let state = self.state.load(Ordering::Relaxed);
            if state & (WRITER | INTENT) == 0
                && self
                    .state
                    .compare_exchange_weak(
                        state,
                        state | INTENT,
                        Ordering::Acquire,
                        Ordering::Relaxed,
                    )
                    .is_ok()
            {
                break;
            }
            hint::spin_loop();
        }
        // Wait for the remaining readers, then swap intent for the writer bit.
        while self
            .state
            .compare_exchange_weak(INTENT, WRITER, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            hint::spin_loop();
        }
    }

    /// Tries to acquire the lock exclusively without spinning.
    pub fn try_lock_exclusive(&self) -> bool {
        self.state
            .compare_exchange(0, WRITER, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Releases an exclusive hold.
    pub fn unlock_exclusive(&self) {
        let prev = self.state.swap(0, Ordering::Release);
        debug_assert_eq!(prev, WRITER, "unlock_exclusive without hold");
    }
}
