//! Media streams and audio frames
//!
//! A [`MediaStream`] is a cheaply clonable handle. Clones share the same
//! tracks and the same `tokio::sync::broadcast` fan-out, so the stream a
//! broadcaster answers with is the stream every listener receives. Frame
//! payloads are `Bytes`; receivers share one allocation per frame.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::broadcast;

use crate::capture::CaptureConstraints;

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// One encoded audio frame
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Timestamp in milliseconds
    pub timestamp: u32,
    /// Encoded payload (reference counted)
    pub data: Bytes,
    /// Whether this frame carries decoder configuration
    pub is_header: bool,
}

impl AudioFrame {
    pub fn new(timestamp: u32, data: Bytes) -> Self {
        Self {
            timestamp,
            data,
            is_header: false,
        }
    }

    /// Decoder configuration frame
    pub fn header(data: Bytes) -> Self {
        Self {
            timestamp: 0,
            data,
            is_header: true,
        }
    }
}

/// A single audio input track
#[derive(Debug)]
pub struct MediaTrack {
    label: String,
    settings: CaptureConstraints,
    ended: AtomicBool,
}

impl MediaTrack {
    pub fn new(label: impl Into<String>, settings: CaptureConstraints) -> Self {
        Self {
            label: label.into(),
            settings,
            ended: AtomicBool::new(false),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Processing applied by the device
    pub fn settings(&self) -> &CaptureConstraints {
        &self.settings
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    /// Release the underlying device; idempotent
    pub fn stop(&self) -> bool {
        !self.ended.swap(true, Ordering::AcqRel)
    }
}

struct StreamInner {
    id: u64,
    tracks: Vec<MediaTrack>,
    tx: broadcast::Sender<AudioFrame>,
}

/// Live media shared between a source and its consumers
#[derive(Clone)]
pub struct MediaStream {
    inner: Arc<StreamInner>,
}

impl MediaStream {
    /// Create a stream over the given tracks
    pub fn new(tracks: Vec<MediaTrack>, buffer: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));

        Self {
            inner: Arc::new(StreamInner {
                id: NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed),
                tracks,
                tx,
            }),
        }
    }

    /// A stream with no tracks, offered by receive-only callers
    pub fn empty() -> Self {
        Self::new(Vec::new(), 1)
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.inner.tracks
    }

    /// Whether any track is still running
    pub fn is_active(&self) -> bool {
        self.inner.tracks.iter().any(|t| !t.is_ended())
    }

    /// Stop every track; returns how many were still running
    pub fn stop_tracks(&self) -> usize {
        self.inner.tracks.iter().filter(|t| t.stop()).count()
    }

    /// Push a frame to every consumer
    ///
    /// Returns the number of receivers, or 0 if the stream has ended or
    /// nobody is listening.
    pub fn send(&self, frame: AudioFrame) -> usize {
        if !self.is_active() {
            return 0;
        }
        self.inner.tx.send(frame).unwrap_or(0)
    }

    /// Receive frames pushed from now on
    pub fn subscribe(&self) -> broadcast::Receiver<AudioFrame> {
        self.inner.tx.subscribe()
    }

    /// Whether two handles refer to the same stream
    pub fn same_stream(&self, other: &MediaStream) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.inner.id)
            .field("tracks", &self.inner.tracks.len())
            .field("active", &self.is_active())
            .finish()
    }
}
