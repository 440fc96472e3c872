//! Identity registry implementation

use std::collections::HashMap;

use parking_lot::RwLock;

use super::entry::{IdentityEntry, IdentityInfo};
use super::error::RegistryError;
use crate::transport::PeerId;

/// Map of identifier to its single live registration
///
/// Check-and-insert happens under one write lock, so of any number of
/// concurrent claims for the same identifier exactly one succeeds.
pub struct IdentityRegistry<T> {
    identities: RwLock<HashMap<PeerId, IdentityEntry<T>>>,
}

impl<T: Clone> IdentityRegistry<T> {
    pub fn new() -> Self {
        Self {
            identities: RwLock::new(HashMap::new()),
        }
    }

    /// Bind `id` to a registration
    ///
    /// Returns an error if the identifier is already bound, whichever
    /// registration holds it.
    pub fn register(
        &self,
        id: &PeerId,
        registration_id: u64,
        binding: T,
    ) -> Result<(), RegistryError> {
        let mut identities = self.identities.write();

        if let Some(existing) = identities.get(id) {
            tracing::warn!(
                peer = %id,
                holder = existing.registration_id,
                contender = registration_id,
                "Identifier already bound"
            );
            return Err(RegistryError::AlreadyBound(id.clone()));
        }

        identities.insert(id.clone(), IdentityEntry::new(registration_id, binding));
        tracing::info!(
            peer = %id,
            registration_id = registration_id,
            bound = identities.len(),
            "Identifier bound"
        );

        Ok(())
    }

    /// Release `id` if `registration_id` still holds it
    pub fn unregister(&self, id: &PeerId, registration_id: u64) -> Option<T> {
        let mut identities = self.identities.write();

        match identities.get(id) {
            Some(entry) if entry.registration_id == registration_id => {}
            Some(entry) => {
                tracing::warn!(
                    peer = %id,
                    expected = entry.registration_id,
                    actual = registration_id,
                    "Unregister mismatch"
                );
                return None;
            }
            None => return None,
        }

        let entry = identities.remove(id)?;
        tracing::info!(
            peer = %id,
            registration_id = registration_id,
            bound_for_ms = entry.registered_at.elapsed().as_millis() as u64,
            "Identifier released"
        );
        Some(entry.binding)
    }

    /// Binding data for a bound identifier
    pub fn lookup(&self, id: &PeerId) -> Result<T, RegistryError> {
        self.identities
            .read()
            .get(id)
            .map(|entry| entry.binding.clone())
            .ok_or_else(|| RegistryError::NotBound(id.clone()))
    }

    pub fn is_bound(&self, id: &PeerId) -> bool {
        self.identities.read().contains_key(id)
    }

    pub fn info(&self, id: &PeerId) -> Option<IdentityInfo> {
        self.identities.read().get(id).map(IdentityEntry::info)
    }

    /// Number of bound identifiers
    pub fn len(&self) -> usize {
        self.identities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> Default for IdentityRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
