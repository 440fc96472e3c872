//! Registry entries

use std::time::{Duration, Instant};

/// One bound identifier
#[derive(Debug)]
pub struct IdentityEntry<T> {
    /// Registration currently holding the identifier
    pub registration_id: u64,

    /// When the identifier was bound
    pub registered_at: Instant,

    /// Implementation data attached to the binding
    pub binding: T,
}

impl<T> IdentityEntry<T> {
    pub(super) fn new(registration_id: u64, binding: T) -> Self {
        Self {
            registration_id,
            registered_at: Instant::now(),
            binding,
        }
    }

    pub fn info(&self) -> IdentityInfo {
        IdentityInfo {
            registration_id: self.registration_id,
            bound_for: self.registered_at.elapsed(),
        }
    }
}

/// Snapshot of a binding
#[derive(Debug, Clone, Copy)]
pub struct IdentityInfo {
    pub registration_id: u64,
    pub bound_for: Duration,
}
