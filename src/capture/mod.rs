//! Local audio capture
//!
//! The broadcaster acquires its microphone through [`AudioCapture`]. The
//! returned [`MediaStream`] is owned exclusively by the broadcaster session
//! and released by stopping its tracks.

pub mod synthetic;

use std::future::Future;
use std::sync::Arc;

use crate::transport::MediaStream;

pub use synthetic::SyntheticCapture;

/// Processing requested from the input device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// Why audio input could not be acquired
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The user or platform refused microphone access
    PermissionDenied,
    /// No audio input device exists
    NoInputDevice,
    /// Any other device failure
    Unavailable(String),
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::PermissionDenied => write!(f, "Permission denied"),
            CaptureError::NoInputDevice => write!(f, "No input device"),
            CaptureError::Unavailable(reason) => write!(f, "Device unavailable: {}", reason),
        }
    }
}

impl std::error::Error for CaptureError {}

/// Capability to open the local audio input
pub trait AudioCapture: Send + Sync {
    /// Acquire an input stream with the given processing
    ///
    /// `buffer` sizes the stream's frame fan-out.
    fn acquire(
        &self,
        constraints: &CaptureConstraints,
        buffer: usize,
    ) -> impl Future<Output = Result<MediaStream, CaptureError>> + Send;
}

impl<T: AudioCapture> AudioCapture for Arc<T> {
    fn acquire(
        &self,
        constraints: &CaptureConstraints,
        buffer: usize,
    ) -> impl Future<Output = Result<MediaStream, CaptureError>> + Send {
        (**self).acquire(constraints, buffer)
    }
}
