//! Transport events and errors

use super::media::MediaStream;
use super::peer::{CallId, PeerId};

/// Error reported by the media transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The requested identifier is already registered
    UnavailableId(PeerId),
    /// The called identifier is not registered
    PeerUnavailable(PeerId),
    /// The registration lost its connection to the transport
    Disconnected,
    /// Any other network or negotiation failure
    Network(String),
}

impl TransportError {
    /// Stable machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::UnavailableId(_) => "unavailable-id",
            TransportError::PeerUnavailable(_) => "peer-unavailable",
            TransportError::Disconnected => "disconnected",
            TransportError::Network(_) => "network",
        }
    }
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::UnavailableId(id) => write!(f, "ID is taken: {}", id),
            TransportError::PeerUnavailable(id) => write!(f, "Could not connect to peer: {}", id),
            TransportError::Disconnected => write!(f, "Lost connection to transport"),
            TransportError::Network(reason) => write!(f, "Network error: {}", reason),
        }
    }
}

impl std::error::Error for TransportError {}

/// Event on one call
#[derive(Debug, Clone)]
pub enum CallEvent {
    /// The remote side's media arrived
    RemoteStream(MediaStream),
    /// The call ended (either side closed, or a peer went away)
    Closed,
    /// The call failed
    Error(TransportError),
}

/// Event delivered to a registration
///
/// Call events for both inbound and outbound calls are routed here, tagged
/// with the call id, so each session consumes a single ordered queue.
#[derive(Debug)]
pub enum TransportEvent<C> {
    /// A remote peer is calling
    Incoming(C),
    /// Something happened on a call owned by this registration
    Call { call_id: CallId, event: CallEvent },
    /// The transport dropped this registration
    Disconnected,
    /// Registration-level failure
    Error(TransportError),
}
