//! Device-free capture source
//!
//! Produces a single-track stream without touching hardware. Frames are fed
//! by whoever owns the stream (`BroadcasterSession::send_audio`). Failure
//! modes can be configured to exercise the broadcaster's error paths.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::{AudioCapture, CaptureConstraints, CaptureError};
use crate::transport::{MediaStream, MediaTrack};

pub struct SyntheticCapture {
    label: String,
    failure: Option<CaptureError>,
    acquisitions: AtomicUsize,
    /// Streams handed out and not yet stopped, for release checks
    issued: Mutex<Vec<MediaStream>>,
}

impl SyntheticCapture {
    pub fn new() -> Self {
        Self::with_label("Synthetic microphone")
    }

    pub fn with_label(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            failure: None,
            acquisitions: AtomicUsize::new(0),
            issued: Mutex::new(Vec::new()),
        }
    }

    /// Capture that always fails as if access was refused
    pub fn denied() -> Self {
        Self::failing(CaptureError::PermissionDenied)
    }

    /// Capture that always fails as if no microphone exists
    pub fn without_device() -> Self {
        Self::failing(CaptureError::NoInputDevice)
    }

    pub fn failing(error: CaptureError) -> Self {
        Self {
            failure: Some(error),
            ..Self::new()
        }
    }

    /// Number of acquisition attempts
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::Relaxed)
    }

    /// Number of issued streams whose tracks are still running
    pub fn active_streams(&self) -> usize {
        self.issued.lock().iter().filter(|s| s.is_active()).count()
    }
}

impl Default for SyntheticCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioCapture for SyntheticCapture {
    async fn acquire(
        &self,
        constraints: &CaptureConstraints,
        buffer: usize,
    ) -> Result<MediaStream, CaptureError> {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);

        if let Some(ref error) = self.failure {
            tracing::debug!(error = %error, "Synthetic capture refused");
            return Err(error.clone());
        }

        let stream = MediaStream::new(vec![MediaTrack::new(&*self.label, *constraints)], buffer);
        let mut issued = self.issued.lock();
        issued.retain(MediaStream::is_active);
        issued.push(stream.clone());
        drop(issued);

        tracing::debug!(
            stream = stream.id(),
            echo_cancellation = constraints.echo_cancellation,
            noise_suppression = constraints.noise_suppression,
            auto_gain_control = constraints.auto_gain_control,
            "Synthetic capture acquired"
        );
        Ok(stream)
    }
}
