//! Statistics for broadcast sessions

use std::time::{Duration, Instant};

/// Broadcaster-side statistics
#[derive(Debug, Clone, Default)]
pub struct BroadcastStats {
    /// Listener calls answered
    pub calls_accepted: u64,
    /// Answered calls that have since closed
    pub calls_closed: u64,
    /// Calls refused because the session was not live
    pub calls_rejected: u64,
    /// Audio frames pushed to listeners
    pub frames_sent: u64,
    /// Audio payload bytes pushed to listeners
    pub bytes_sent: u64,
    /// Number of times the session went live
    pub sessions_started: u64,
    /// When the current broadcast went live
    pub live_since: Option<Instant>,
    /// Accumulated duration of finished broadcasts
    pub total_live: Duration,
}

impl BroadcastStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on_live(&mut self) {
        self.sessions_started += 1;
        self.live_since = Some(Instant::now());
    }

    pub(crate) fn on_stopped(&mut self) {
        if let Some(since) = self.live_since.take() {
            self.total_live += since.elapsed();
        }
    }

    pub(crate) fn on_frame(&mut self, size: usize) {
        self.frames_sent += 1;
        self.bytes_sent += size as u64;
    }

    /// Calls answered and not yet closed
    pub fn open_calls(&self) -> u64 {
        self.calls_accepted.saturating_sub(self.calls_closed)
    }

    /// Duration of the current broadcast (zero when not live)
    pub fn duration(&self) -> Duration {
        self.live_since.map(|t| t.elapsed()).unwrap_or_default()
    }

    /// Average outgoing bitrate of the current broadcast in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.duration().as_secs();
        if secs > 0 {
            (self.bytes_sent * 8) / secs
        } else {
            0
        }
    }
}
