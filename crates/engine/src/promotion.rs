//! Promotion policy seam.
//!
//! The promotion policy decides whether a missed request deserves insertion
//! or should bypass the cache. The decision function itself is external; the
//! engine consults it once per miss and notifies it when lines land in the
//! cache.

use crate::request::Request;

/// External decider of whether misses are inserted or bypassed.
pub trait PromotionPolicy: Send + Sync {
    /// Whether the missed lines of `req` should be inserted.
    fn should_promote(&self, req: &Request) -> bool;

    /// Informs the policy that `req`'s lines are now cached.
    fn purge(&self, req: &Request);
}

/// Promotes every miss; the reference behavior when no policy is wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysPromote;

impl PromotionPolicy for AlwaysPromote {
    fn should_promote(&self, _req: &Request) -> bool {
        true
    }

    fn purge(&self, _req: &Request) {}
}
