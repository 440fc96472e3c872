//! In-process media transport
//!
//! Routes calls between registrations living in the same process. Media is
//! handed over as shared [`MediaStream`] handles, so audio pushed by the
//! answering side reaches the caller through the stream's broadcast channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::event::{CallEvent, TransportError, TransportEvent};
use super::media::MediaStream;
use super::peer::{CallId, PeerId};
use super::{MediaCall, MediaTransport, PeerRegistration};
use crate::registry::{IdentityRegistry, RegistryError};

type EventTx = mpsc::UnboundedSender<TransportEvent<LocalCall>>;
type EventRx = mpsc::UnboundedReceiver<TransportEvent<LocalCall>>;

/// A specific registration of a peer identifier
#[derive(Debug, Clone, PartialEq, Eq)]
struct Endpoint {
    peer: PeerId,
    registration_id: u64,
}

/// Registry binding for a live registration
#[derive(Clone)]
struct PeerLink {
    registration_id: u64,
    events: EventTx,
}

/// Hub-side state of one call
struct CallLink {
    caller: Endpoint,
    callee: Endpoint,
    caller_media: Option<MediaStream>,
    answered: bool,
}

struct Hub {
    identities: IdentityRegistry<PeerLink>,
    calls: Mutex<HashMap<CallId, CallLink>>,
    next_call_id: AtomicU64,
    next_registration_id: AtomicU64,
}

impl Hub {
    /// Deliver an event to a registration, if it still holds its identifier
    fn notify(&self, endpoint: &Endpoint, event: TransportEvent<LocalCall>) -> bool {
        match self.identities.lookup(&endpoint.peer) {
            Ok(link) if link.registration_id == endpoint.registration_id => {
                link.events.send(event).is_ok()
            }
            _ => false,
        }
    }

    fn place_call(
        self: &Arc<Self>,
        caller: &Endpoint,
        caller_events: &EventTx,
        remote: &PeerId,
        caller_media: Option<MediaStream>,
    ) -> LocalCall {
        let call_id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        let outbound = LocalCall::new(call_id, remote.clone(), Arc::clone(self));

        let link = match self.identities.lookup(remote) {
            Ok(link) => link,
            Err(_) => {
                tracing::debug!(call_id = call_id, peer = %remote, "Call to unregistered peer");
                let _ = caller_events.send(TransportEvent::Call {
                    call_id,
                    event: CallEvent::Error(TransportError::PeerUnavailable(remote.clone())),
                });
                return outbound;
            }
        };

        let callee = Endpoint {
            peer: remote.clone(),
            registration_id: link.registration_id,
        };
        self.calls.lock().insert(
            call_id,
            CallLink {
                caller: caller.clone(),
                callee,
                caller_media,
                answered: false,
            },
        );

        let inbound = LocalCall::new(call_id, caller.peer.clone(), Arc::clone(self));
        if let Err(mpsc::error::SendError(event)) = link.events.send(TransportEvent::Incoming(inbound))
        {
            if let TransportEvent::Incoming(mut inbound) = event {
                inbound.closed = true;
            }
            self.calls.lock().remove(&call_id);
            let _ = caller_events.send(TransportEvent::Call {
                call_id,
                event: CallEvent::Error(TransportError::PeerUnavailable(remote.clone())),
            });
            return outbound;
        }

        tracing::debug!(call_id = call_id, from = %caller.peer, to = %remote, "Call offered");
        outbound
    }

    fn answer_call(&self, call_id: CallId, media: MediaStream) {
        let (caller, callee, caller_media) = {
            let mut calls = self.calls.lock();
            let Some(link) = calls.get_mut(&call_id) else {
                tracing::debug!(call_id = call_id, "Answer for closed call ignored");
                return;
            };
            if link.answered {
                return;
            }
            link.answered = true;
            (link.caller.clone(), link.callee.clone(), link.caller_media.clone())
        };

        self.notify(
            &caller,
            TransportEvent::Call {
                call_id,
                event: CallEvent::RemoteStream(media),
            },
        );
        if let Some(media) = caller_media.filter(MediaStream::is_active) {
            self.notify(
                &callee,
                TransportEvent::Call {
                    call_id,
                    event: CallEvent::RemoteStream(media),
                },
            );
        }

        tracing::debug!(call_id = call_id, "Call answered");
    }

    fn close_call(&self, call_id: CallId) -> bool {
        let Some(link) = self.calls.lock().remove(&call_id) else {
            return false;
        };

        for endpoint in [&link.caller, &link.callee] {
            self.notify(
                endpoint,
                TransportEvent::Call {
                    call_id,
                    event: CallEvent::Closed,
                },
            );
        }

        tracing::debug!(
            call_id = call_id,
            caller = %link.caller.peer,
            callee = %link.callee.peer,
            "Call closed"
        );
        true
    }

    /// Close every call one registration participates in
    fn close_calls_for(&self, endpoint: &Endpoint) -> usize {
        let ids: Vec<CallId> = self
            .calls
            .lock()
            .iter()
            .filter(|(_, link)| link.caller == *endpoint || link.callee == *endpoint)
            .map(|(id, _)| *id)
            .collect();

        ids.into_iter().filter(|id| self.close_call(*id)).count()
    }
}

/// In-process transport shared by every participant
#[derive(Clone)]
pub struct LocalTransport {
    hub: Arc<Hub>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self {
            hub: Arc::new(Hub {
                identities: IdentityRegistry::new(),
                calls: Mutex::new(HashMap::new()),
                next_call_id: AtomicU64::new(1),
                next_registration_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn is_registered(&self, peer: &PeerId) -> bool {
        self.hub.identities.is_bound(peer)
    }

    /// Number of registered identifiers
    pub fn registered_count(&self) -> usize {
        self.hub.identities.len()
    }

    /// Number of calls not yet closed
    pub fn call_count(&self) -> usize {
        self.hub.calls.lock().len()
    }

    /// Drop a peer as a network loss would
    ///
    /// The identifier is released, every call it takes part in is closed,
    /// and the registration receives [`TransportEvent::Disconnected`].
    pub fn force_disconnect(&self, peer: &PeerId) -> bool {
        let Ok(link) = self.hub.identities.lookup(peer) else {
            return false;
        };
        let endpoint = Endpoint {
            peer: peer.clone(),
            registration_id: link.registration_id,
        };

        let closed = self.hub.close_calls_for(&endpoint);
        let _ = link.events.send(TransportEvent::Disconnected);
        self.hub.identities.unregister(peer, link.registration_id);

        tracing::info!(peer = %peer, calls_closed = closed, "Peer force-disconnected");
        true
    }

    /// Report a registration-level error to a peer
    pub fn inject_error(&self, peer: &PeerId, error: TransportError) -> bool {
        match self.hub.identities.lookup(peer) {
            Ok(link) => link.events.send(TransportEvent::Error(error)).is_ok(),
            Err(_) => false,
        }
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaTransport for LocalTransport {
    type Registration = LocalRegistration;

    async fn register(&self, id: Option<PeerId>) -> Result<LocalRegistration, TransportError> {
        // Registration completes on a later turn, as a signaling round-trip would
        tokio::task::yield_now().await;

        let peer = id.unwrap_or_else(PeerId::generate);
        let registration_id = self.hub.next_registration_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        self.hub
            .identities
            .register(
                &peer,
                registration_id,
                PeerLink {
                    registration_id,
                    events: tx.clone(),
                },
            )
            .map_err(|e| match e {
                RegistryError::AlreadyBound(id) => TransportError::UnavailableId(id),
                RegistryError::NotBound(id) => TransportError::PeerUnavailable(id),
            })?;

        Ok(LocalRegistration {
            endpoint: Endpoint {
                peer,
                registration_id,
            },
            hub: Arc::clone(&self.hub),
            tx,
            rx,
            open: true,
        })
    }
}

/// Registration with a [`LocalTransport`]
pub struct LocalRegistration {
    endpoint: Endpoint,
    hub: Arc<Hub>,
    tx: EventTx,
    rx: EventRx,
    open: bool,
}

impl PeerRegistration for LocalRegistration {
    type Call = LocalCall;

    fn peer_id(&self) -> &PeerId {
        &self.endpoint.peer
    }

    fn call(&mut self, remote: &PeerId, local_media: Option<MediaStream>) -> LocalCall {
        if !self.open {
            let call_id = self.hub.next_call_id.fetch_add(1, Ordering::Relaxed);
            let mut call = LocalCall::new(call_id, remote.clone(), Arc::clone(&self.hub));
            call.closed = true;
            return call;
        }
        self.hub.place_call(&self.endpoint, &self.tx, remote, local_media)
    }

    async fn next_event(&mut self) -> Option<TransportEvent<LocalCall>> {
        if !self.open {
            return None;
        }
        self.rx.recv().await
    }

    fn try_next_event(&mut self) -> Option<TransportEvent<LocalCall>> {
        if !self.open {
            return None;
        }
        self.rx.try_recv().ok()
    }

    fn teardown(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;

        self.hub
            .identities
            .unregister(&self.endpoint.peer, self.endpoint.registration_id);
        let closed = self.hub.close_calls_for(&self.endpoint);

        tracing::debug!(peer = %self.endpoint.peer, calls_closed = closed, "Registration torn down");
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

impl Drop for LocalRegistration {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// One side of a call on a [`LocalTransport`]
pub struct LocalCall {
    id: CallId,
    remote: PeerId,
    hub: Arc<Hub>,
    closed: bool,
}

impl LocalCall {
    fn new(id: CallId, remote: PeerId, hub: Arc<Hub>) -> Self {
        Self {
            id,
            remote,
            hub,
            closed: false,
        }
    }
}

impl MediaCall for LocalCall {
    fn id(&self) -> CallId {
        self.id
    }

    fn remote_peer(&self) -> &PeerId {
        &self.remote
    }

    fn answer(&mut self, local_media: MediaStream) {
        if !self.closed {
            self.hub.answer_call(self.id, local_media);
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.hub.close_call(self.id);
        }
    }
}

impl Drop for LocalCall {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for LocalCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCall")
            .field("id", &self.id)
            .field("remote", &self.remote)
            .field("closed", &self.closed)
            .finish()
    }
}
