//! Broadcaster liveness tracking

use crate::error::Result;
use crate::store::{LivenessRecord, PresenceStore, Snapshot, StorePath, Subscription, Value};

/// Effect of applying a new liveness record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessChange {
    WentLive,
    WentOffline,
    Unchanged,
}

/// Subscription to the liveness record
///
/// An absent record counts as not live.
#[derive(Debug)]
pub struct LivenessWatch {
    subscription: Subscription,
    current: Option<LivenessRecord>,
}

impl LivenessWatch {
    /// Subscribe and apply the current record
    pub async fn attach<S: PresenceStore>(store: &S, path: &StorePath) -> Result<Self> {
        let mut subscription = store.subscribe(path).await?;
        let current = subscription.latest().and_then(|s| Self::record_of(&s));

        Ok(Self {
            subscription,
            current,
        })
    }

    fn record_of(snapshot: &Snapshot) -> Option<LivenessRecord> {
        snapshot
            .value()
            .and_then(Value::as_liveness)
            .cloned()
    }

    pub fn is_live(&self) -> bool {
        self.current.as_ref().is_some_and(|r| r.is_live)
    }

    pub fn record(&self) -> Option<&LivenessRecord> {
        self.current.as_ref()
    }

    /// Replace the current record and report the transition
    pub fn update(&mut self, record: Option<LivenessRecord>) -> LivenessChange {
        let was_live = self.is_live();
        self.current = record;

        match (was_live, self.is_live()) {
            (false, true) => LivenessChange::WentLive,
            (true, false) => LivenessChange::WentOffline,
            _ => LivenessChange::Unchanged,
        }
    }

    /// Wait for the next delivered record (None once the store is gone)
    pub async fn next(&mut self) -> Option<Option<LivenessRecord>> {
        let snapshot = self.subscription.next().await?;
        Some(Self::record_of(&snapshot))
    }

    /// Next already-delivered record, without waiting
    pub fn try_next(&mut self) -> Option<Option<LivenessRecord>> {
        let snapshot = self.subscription.try_next()?;
        Some(Self::record_of(&snapshot))
    }

    /// Apply everything delivered so far; returns whether anything changed
    pub fn refresh(&mut self) -> bool {
        let mut changed = false;
        while let Some(record) = self.try_next() {
            changed |= self.update(record) != LivenessChange::Unchanged;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, LIVENESS_PATH};
    use crate::transport::PeerId;

    #[tokio::test]
    async fn test_absent_record_is_not_live() {
        let store = MemoryStore::new();
        let client = store.client();

        let watch = LivenessWatch::attach(&client, &StorePath::new(LIVENESS_PATH))
            .await
            .unwrap();
        assert!(!watch.is_live());
        assert!(watch.record().is_none());
    }

    #[tokio::test]
    async fn test_refresh_follows_writes() {
        let store = MemoryStore::new();
        let client = store.client();
        let path = StorePath::new(LIVENESS_PATH);

        let mut watch = LivenessWatch::attach(&client, &path).await.unwrap();

        client
            .write(&path, LivenessRecord::live(PeerId::new("main")).into())
            .await
            .unwrap();
        assert!(watch.refresh());
        assert!(watch.is_live());

        client.write(&path, LivenessRecord::offline().into()).await.unwrap();
        assert!(watch.refresh());
        assert!(!watch.is_live());

        assert!(!watch.refresh());
    }

    #[tokio::test]
    async fn test_update_transitions() {
        let store = MemoryStore::new();
        let client = store.client();
        let mut watch = LivenessWatch::attach(&client, &StorePath::new(LIVENESS_PATH))
            .await
            .unwrap();

        let live = Some(LivenessRecord::live(PeerId::new("main")));
        assert_eq!(watch.update(live.clone()), LivenessChange::WentLive);
        assert_eq!(watch.update(live), LivenessChange::Unchanged);
        assert_eq!(watch.update(None), LivenessChange::WentOffline);
        assert_eq!(
            watch.update(Some(LivenessRecord::offline())),
            LivenessChange::Unchanged
        );
    }
}
