//! Claiming identities through a media transport

use crate::error::{Error, Result};
use crate::transport::{MediaTransport, PeerId, PeerRegistration, TransportError};

/// Register under a well-known identifier
///
/// A collision surfaces as [`Error::RegistrationCollision`] and is terminal
/// for the attempt; callers must not retry on their own.
pub async fn claim_identity<T: MediaTransport>(
    transport: &T,
    id: &PeerId,
) -> Result<T::Registration> {
    match transport.register(Some(id.clone())).await {
        Ok(registration) => {
            tracing::info!(peer = %registration.peer_id(), "Identity claimed");
            Ok(registration)
        }
        Err(TransportError::UnavailableId(taken)) => {
            tracing::warn!(peer = %taken, "Identity collision");
            Err(Error::RegistrationCollision(taken))
        }
        Err(e) => {
            tracing::warn!(peer = %id, error = %e, "Identity claim failed");
            Err(Error::Registration(e))
        }
    }
}

/// Register under a freshly generated identifier
pub async fn register_anonymous<T: MediaTransport>(transport: &T) -> Result<T::Registration> {
    match transport.register(None).await {
        Ok(registration) => {
            tracing::debug!(peer = %registration.peer_id(), "Anonymous identity registered");
            Ok(registration)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Anonymous registration failed");
            Err(Error::Registration(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LocalTransport;

    #[tokio::test]
    async fn test_claim_then_collide() {
        let transport = LocalTransport::new();
        let id = PeerId::new("main");

        let first = claim_identity(&transport, &id).await;
        assert!(first.is_ok());

        let second = claim_identity(&transport, &id).await;
        assert!(matches!(second, Err(Error::RegistrationCollision(taken)) if taken == id));
    }

    #[tokio::test]
    async fn test_claim_after_teardown() {
        let transport = LocalTransport::new();
        let id = PeerId::new("main");

        let mut first = claim_identity(&transport, &id).await.unwrap();
        first.teardown();

        assert!(claim_identity(&transport, &id).await.is_ok());
    }

    #[tokio::test]
    async fn test_anonymous_ids_do_not_collide() {
        let transport = LocalTransport::new();

        let a = register_anonymous(&transport).await.unwrap();
        let b = register_anonymous(&transport).await.unwrap();
        assert_ne!(a.peer_id(), b.peer_id());
    }
}
