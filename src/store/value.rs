//! Values held in the presence store

use crate::transport::PeerId;

/// Point in time as recorded by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    /// Placeholder replaced with the store's clock when the write lands
    Server,
    /// Milliseconds since the Unix epoch
    Millis(u64),
}

impl Timestamp {
    /// Milliseconds, if already resolved
    pub fn millis(&self) -> Option<u64> {
        match self {
            Timestamp::Server => None,
            Timestamp::Millis(ms) => Some(*ms),
        }
    }
}

/// Whether a broadcast is currently active
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivenessRecord {
    pub is_live: bool,
    pub started_at: Option<Timestamp>,
    pub broadcaster_id: Option<PeerId>,
    /// Nonce of the go-live that wrote this record
    pub session: Option<String>,
}

impl LivenessRecord {
    /// Record published by a broadcaster that just went live
    pub fn live(broadcaster_id: PeerId) -> Self {
        Self {
            is_live: true,
            started_at: Some(Timestamp::Server),
            broadcaster_id: Some(broadcaster_id),
            session: Some(uuid::Uuid::new_v4().to_string()),
        }
    }

    /// Record written on stop and armed as the disconnect revert
    pub fn offline() -> Self {
        Self {
            is_live: false,
            started_at: None,
            broadcaster_id: None,
            session: None,
        }
    }

    /// Whether this record was written by the go-live identified by `session`
    pub fn published_by(&self, session: &str) -> bool {
        self.session.as_deref() == Some(session)
    }
}

/// Marks one listener as connected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceEntry {
    pub active: bool,
}

impl PresenceEntry {
    pub fn active() -> Self {
        Self { active: true }
    }
}

/// A value stored at a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Liveness(LivenessRecord),
    Presence(PresenceEntry),
}

impl Value {
    pub fn as_liveness(&self) -> Option<&LivenessRecord> {
        match self {
            Value::Liveness(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_presence(&self) -> Option<&PresenceEntry> {
        match self {
            Value::Presence(entry) => Some(entry),
            _ => None,
        }
    }

    /// Replace server-time placeholders with `now_ms`
    pub(crate) fn resolve_server_time(&mut self, now_ms: u64) {
        if let Value::Liveness(record) = self {
            if record.started_at == Some(Timestamp::Server) {
                record.started_at = Some(Timestamp::Millis(now_ms));
            }
        }
    }
}

impl From<LivenessRecord> for Value {
    fn from(record: LivenessRecord) -> Self {
        Value::Liveness(record)
    }
}

impl From<PresenceEntry> for Value {
    fn from(entry: PresenceEntry) -> Self {
        Value::Presence(entry)
    }
}
