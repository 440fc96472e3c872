//! Error types for livecast
//!
//! Every variant is terminal for the attempt that produced it. Sessions
//! surface [`Error::user_message`] as their status text and never retry on
//! their own.

use crate::capture::CaptureError;
use crate::store::StoreError;
use crate::transport::{PeerId, TransportError};

/// Result type alias using the crate's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for session operations
#[derive(Debug, Clone)]
pub enum Error {
    /// Audio input could not be acquired (permission or device)
    Capture(CaptureError),
    /// The broadcaster identifier is already bound elsewhere
    RegistrationCollision(PeerId),
    /// Any other failure registering with the media transport
    Registration(TransportError),
    /// The remote identifier is not currently registered
    ConnectionUnavailable(PeerId),
    /// Generic transport or negotiation failure on a call
    Connection(TransportError),
    /// The local environment refused to start playback
    PlaybackBlocked,
    /// The broadcaster went offline while this session was attached
    BroadcastEnded,
    /// Presence store failure
    Store(StoreError),
}

impl Error {
    /// Short status string shown to the user
    pub fn user_message(&self) -> String {
        match self {
            Error::Capture(CaptureError::PermissionDenied) => "Microphone access denied.".into(),
            Error::Capture(CaptureError::NoInputDevice) => "No audio input device found.".into(),
            Error::Capture(CaptureError::Unavailable(reason)) => {
                format!("Audio capture unavailable: {}", reason)
            }
            Error::RegistrationCollision(_) => "Another broadcast is already active.".into(),
            Error::Registration(e) => format!("Stream error: {}", e.kind()),
            Error::ConnectionUnavailable(_) => "Broadcast offline or signal lost.".into(),
            Error::Connection(_) => "Connection interrupted.".into(),
            Error::PlaybackBlocked => "Tap to activate sound".into(),
            Error::BroadcastEnded => "Broadcast has ended.".into(),
            Error::Store(_) => "Presence service unavailable.".into(),
        }
    }

    /// Whether the error means the broadcaster is gone rather than broken
    pub fn is_offline(&self) -> bool {
        matches!(
            self,
            Error::ConnectionUnavailable(_) | Error::BroadcastEnded
        )
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Capture(e) => write!(f, "Capture error: {}", e),
            Error::RegistrationCollision(id) => write!(f, "Identifier already registered: {}", id),
            Error::Registration(e) => write!(f, "Registration error: {}", e),
            Error::ConnectionUnavailable(id) => write!(f, "Peer unavailable: {}", id),
            Error::Connection(e) => write!(f, "Connection error: {}", e),
            Error::PlaybackBlocked => write!(f, "Playback blocked by autoplay policy"),
            Error::BroadcastEnded => write!(f, "Broadcast ended"),
            Error::Store(e) => write!(f, "Store error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Capture(e) => Some(e),
            Error::Registration(e) | Error::Connection(e) => Some(e),
            Error::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CaptureError> for Error {
    fn from(err: CaptureError) -> Self {
        Error::Capture(err)
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Error::Store(err)
    }
}
