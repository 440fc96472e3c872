//! Local playback of the received stream
//!
//! Playback is a local media element. Pause, resume and volume never touch
//! presence or transport state.

use tokio::sync::broadcast;

use crate::error::{Error, Result};
use crate::transport::{AudioFrame, MediaStream};

/// Whether the environment lets playback start on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoplayPolicy {
    Allowed,
    /// Playback must be started by a user gesture
    RequiresGesture,
}

/// Volume applied on creation
pub const DEFAULT_VOLUME: u8 = 100;

pub struct Playback {
    policy: AutoplayPolicy,
    source: Option<MediaStream>,
    frames: Option<broadcast::Receiver<AudioFrame>>,
    playing: bool,
    activated: bool,
    volume: u8,
}

impl Playback {
    pub fn new(policy: AutoplayPolicy) -> Self {
        Self {
            policy,
            source: None,
            frames: None,
            playing: false,
            activated: false,
            volume: DEFAULT_VOLUME,
        }
    }

    /// Attach a remote stream and try to start playing
    ///
    /// Returns [`Error::PlaybackBlocked`] when autostart is refused; the
    /// stream stays attached and [`toggle`](Self::toggle) starts it.
    pub fn attach(&mut self, stream: MediaStream) -> Result<()> {
        self.frames = Some(stream.subscribe());
        self.source = Some(stream);
        self.playing = false;

        if self.policy == AutoplayPolicy::RequiresGesture && !self.activated {
            tracing::debug!("Autoplay refused, waiting for user gesture");
            return Err(Error::PlaybackBlocked);
        }

        self.playing = true;
        Ok(())
    }

    /// User gesture: pause when playing, play otherwise
    ///
    /// Returns whether playback is now running.
    pub fn toggle(&mut self) -> bool {
        self.activated = true;
        if self.source.is_none() {
            return false;
        }
        self.playing = !self.playing;
        self.playing
    }

    /// Set volume (0-100)
    pub fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(100);
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    /// Linear gain for the current volume
    pub fn gain(&self) -> f32 {
        f32::from(self.volume) / 100.0
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn source(&self) -> Option<&MediaStream> {
        self.source.as_ref()
    }

    /// Detach the source; volume and activation are kept
    pub fn clear(&mut self) {
        self.source = None;
        self.frames = None;
        self.playing = false;
    }

    /// Frames received since the last call
    ///
    /// Frames arriving while paused are discarded, as a paused live element
    /// does not buffer.
    pub fn drain_frames(&mut self) -> Vec<AudioFrame> {
        let Some(rx) = self.frames.as_mut() else {
            return Vec::new();
        };

        let mut frames = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(frame) => frames.push(frame),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::debug!(skipped = n, "Playback lagged, skipping frames");
                }
                Err(_) => break,
            }
        }

        if self.playing {
            frames
        } else {
            Vec::new()
        }
    }
}

impl std::fmt::Debug for Playback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Playback")
            .field("policy", &self.policy)
            .field("source", &self.source)
            .field("playing", &self.playing)
            .field("volume", &self.volume)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::capture::CaptureConstraints;
    use crate::transport::MediaTrack;

    fn stream() -> MediaStream {
        MediaStream::new(vec![MediaTrack::new("mic", CaptureConstraints::default())], 8)
    }

    #[test]
    fn test_autoplay_allowed() {
        let mut playback = Playback::new(AutoplayPolicy::Allowed);

        assert!(playback.attach(stream()).is_ok());
        assert!(playback.is_playing());
    }

    #[test]
    fn test_autoplay_blocked_until_gesture() {
        let mut playback = Playback::new(AutoplayPolicy::RequiresGesture);

        assert!(matches!(playback.attach(stream()), Err(Error::PlaybackBlocked)));
        assert!(playback.has_source());
        assert!(!playback.is_playing());

        assert!(playback.toggle());
        assert!(playback.is_playing());

        // Once activated, later attaches autostart
        playback.clear();
        assert!(playback.attach(stream()).is_ok());
    }

    #[test]
    fn test_toggle_pauses_and_resumes() {
        let mut playback = Playback::new(AutoplayPolicy::Allowed);
        playback.attach(stream()).unwrap();

        assert!(!playback.toggle());
        assert!(playback.toggle());
    }

    #[test]
    fn test_toggle_without_source() {
        let mut playback = Playback::new(AutoplayPolicy::Allowed);

        assert!(!playback.toggle());
        assert!(!playback.is_playing());
    }

    #[test]
    fn test_volume_clamped() {
        let mut playback = Playback::new(AutoplayPolicy::Allowed);
        assert_eq!(playback.volume(), DEFAULT_VOLUME);

        playback.set_volume(250);
        assert_eq!(playback.volume(), 100);

        playback.set_volume(25);
        assert_eq!(playback.gain(), 0.25);
    }

    #[test]
    fn test_drain_frames_respects_pause() {
        let source = stream();
        let mut playback = Playback::new(AutoplayPolicy::Allowed);
        playback.attach(source.clone()).unwrap();

        source.send(AudioFrame::new(0, Bytes::from_static(b"a")));
        assert_eq!(playback.drain_frames().len(), 1);

        playback.toggle();
        source.send(AudioFrame::new(20, Bytes::from_static(b"b")));
        assert!(playback.drain_frames().is_empty());

        playback.clear();
        assert!(playback.drain_frames().is_empty());
    }
}
