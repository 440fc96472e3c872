//! Session configuration

use crate::capture::CaptureConstraints;
use crate::session::AutoplayPolicy;
use crate::store::{StorePath, LISTENERS_PATH, LIVENESS_PATH};
use crate::transport::PeerId;

/// Well-known identifier the broadcaster registers under
pub const DEFAULT_BROADCASTER_ID: &str = "rcn-ghana-main-stream";

/// Default capacity of the per-stream audio fan-out channel
pub const DEFAULT_MEDIA_BUFFER: usize = 256;

/// Configuration shared by broadcaster and listener sessions
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Identifier the broadcaster binds and listeners call
    pub broadcaster_id: PeerId,

    /// Store path of the liveness record
    pub liveness_path: StorePath,

    /// Store subtree holding one presence entry per listener
    pub listeners_path: StorePath,

    /// Audio processing requested from the capture device
    pub capture: CaptureConstraints,

    /// Frames buffered per stream before slow receivers lag
    pub media_buffer: usize,

    /// Whether playback may start without a user gesture
    pub autoplay: AutoplayPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            broadcaster_id: PeerId::new(DEFAULT_BROADCASTER_ID),
            liveness_path: StorePath::new(LIVENESS_PATH),
            listeners_path: StorePath::new(LISTENERS_PATH),
            capture: CaptureConstraints::default(),
            media_buffer: DEFAULT_MEDIA_BUFFER,
            autoplay: AutoplayPolicy::Allowed,
        }
    }
}

impl SessionConfig {
    /// Create a config with a custom broadcaster identifier
    pub fn with_broadcaster_id(id: impl Into<PeerId>) -> Self {
        Self {
            broadcaster_id: id.into(),
            ..Default::default()
        }
    }

    /// Set the broadcaster identifier
    pub fn broadcaster_id(mut self, id: impl Into<PeerId>) -> Self {
        self.broadcaster_id = id.into();
        self
    }

    /// Set the liveness record path
    pub fn liveness_path(mut self, path: impl Into<StorePath>) -> Self {
        self.liveness_path = path.into();
        self
    }

    /// Set the listener presence subtree
    pub fn listeners_path(mut self, path: impl Into<StorePath>) -> Self {
        self.listeners_path = path.into();
        self
    }

    /// Set capture constraints
    pub fn capture(mut self, constraints: CaptureConstraints) -> Self {
        self.capture = constraints;
        self
    }

    /// Set the media fan-out buffer (at least one frame)
    pub fn media_buffer(mut self, frames: usize) -> Self {
        self.media_buffer = frames.max(1);
        self
    }

    /// Set the autoplay policy
    pub fn autoplay(mut self, policy: AutoplayPolicy) -> Self {
        self.autoplay = policy;
        self
    }
}
