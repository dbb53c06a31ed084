//! Single-owner lock shared between responders.
//!
//! The lock never blocks. A responder that fails to acquire it stays in a
//! waiting state and tries again on its next spin.

use serde::Serialize;
use std::fmt;

/// Identity of a responder: its slot in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ResponderId(pub usize);

impl fmt::Display for ResponderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Guards a resource that two responders must never use at once
/// (e.g. a multi-round metadata lookup on the file store).
#[derive(Debug, Default)]
pub struct ResourceLock {
    owner: Option<ResponderId>,
}

impl ResourceLock {
    pub fn new() -> Self {
        Self { owner: None }
    }

    /// Takes the lock for `who`.
    ///
    /// Succeeds if the lock is free or already held by `who`; otherwise
    /// returns `false` and leaves ownership unchanged.
    pub fn acquire(&mut self, who: ResponderId) -> bool {
        match self.owner {
            None => {
                self.owner = Some(who);
                tracing::trace!(responder = %who, "Resource lock acquired");
                true
            }
            Some(owner) if owner == who => true,
            Some(owner) => {
                tracing::debug!(responder = %who, owner = %owner, "Resource lock busy");
                false
            }
        }
    }

    /// Releases the lock if `who` holds it. Anyone else is ignored.
    pub fn release(&mut self, who: ResponderId) {
        if self.owner == Some(who) {
            self.owner = None;
            tracing::trace!(responder = %who, "Resource lock released");
        }
    }

    pub fn is_owned_by(&self, who: ResponderId) -> bool {
        self.owner == Some(who)
    }

    pub fn owner(&self) -> Option<ResponderId> {
        self.owner
    }
}
