//! Media transport
//!
//! Peer-to-peer signaling and media, consumed through three capability
//! traits. A participant registers an identity ([`MediaTransport`]), places
//! or receives calls through that registration ([`PeerRegistration`]), and
//! answers or closes individual calls ([`MediaCall`]).
//!
//! Everything the transport reports, for the registration or for any of its
//! calls, arrives on the registration's single event queue as a
//! [`TransportEvent`]. Sessions therefore have exactly one transport source
//! to drain, and "call closed" after a session already tore the call down is
//! just an unknown call id.
//!
//! [`LocalTransport`] is an in-process implementation used by tests and the
//! demo.

pub mod event;
pub mod local;
pub mod media;
pub mod peer;

use std::future::Future;

pub use event::{CallEvent, TransportError, TransportEvent};
pub use local::{LocalCall, LocalRegistration, LocalTransport};
pub use media::{AudioFrame, MediaStream, MediaTrack};
pub use peer::{CallId, PeerId};

/// Call type produced by a transport's registrations
pub type CallOf<T> = <<T as MediaTransport>::Registration as PeerRegistration>::Call;

/// Capability to register identities with the transport
pub trait MediaTransport: Send + Sync {
    type Registration: PeerRegistration;

    /// Register under `id`, or under a generated identifier when `None`
    ///
    /// Fails with [`TransportError::UnavailableId`] if `id` is already bound.
    fn register(
        &self,
        id: Option<PeerId>,
    ) -> impl Future<Output = Result<Self::Registration, TransportError>> + Send;
}

/// A live registration with the transport
///
/// Dropping a registration tears it down.
pub trait PeerRegistration: Send + 'static {
    type Call: MediaCall;

    fn peer_id(&self) -> &PeerId;

    /// Offer a call to `remote`, optionally sending local media
    ///
    /// Failures (including an unregistered remote) arrive later as
    /// [`CallEvent::Error`] for the returned call's id.
    fn call(&mut self, remote: &PeerId, local_media: Option<MediaStream>) -> Self::Call;

    /// Wait for the next event (None once torn down)
    fn next_event(
        &mut self,
    ) -> impl Future<Output = Option<TransportEvent<Self::Call>>> + Send;

    /// Next already-delivered event, without waiting
    fn try_next_event(&mut self) -> Option<TransportEvent<Self::Call>>;

    /// Release the identifier and close every call it owns; idempotent
    fn teardown(&mut self);

    fn is_open(&self) -> bool;
}

/// One call between two registrations
///
/// Dropping a call closes it.
pub trait MediaCall: Send + 'static {
    fn id(&self) -> CallId;

    fn remote_peer(&self) -> &PeerId;

    /// Accept an inbound call, sending `local_media` to the caller
    fn answer(&mut self, local_media: MediaStream);

    /// End the call on both sides; idempotent
    fn close(&mut self);
}
