//! Live listener count

use tokio::sync::watch;

use crate::error::Result;
use crate::store::{PresenceStore, Snapshot, StorePath, Subscription};

/// Count of presence entries under the listeners path
///
/// Independent of broadcaster liveness: it reports whatever entries exist.
/// Observers can either poll [`count`](Self::count) or hold a
/// [`watch`](Self::watch) receiver while [`run`](Self::run) drives updates.
#[derive(Debug)]
pub struct ListenerCounter {
    subscription: Subscription,
    count: usize,
    tx: watch::Sender<usize>,
}

impl ListenerCounter {
    /// Subscribe to the listeners path and take the initial count
    pub async fn attach<S: PresenceStore>(store: &S, path: &StorePath) -> Result<Self> {
        let mut subscription = store.subscribe(path).await?;
        let count = subscription
            .latest()
            .map_or(0, |snapshot| snapshot.child_count());
        let (tx, _) = watch::channel(count);

        Ok(Self {
            subscription,
            count,
            tx,
        })
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Receiver that observes every count change
    pub fn watch(&self) -> watch::Receiver<usize> {
        self.tx.subscribe()
    }

    /// Recompute from a snapshot of the listeners path
    pub fn apply(&mut self, snapshot: &Snapshot) -> usize {
        let count = snapshot.child_count();
        if count != self.count {
            tracing::debug!(previous = self.count, count = count, "Listener count changed");
            self.count = count;
            self.tx.send_replace(count);
        }
        count
    }

    /// Apply every snapshot already delivered; returns the current count
    pub fn process_pending(&mut self) -> usize {
        while let Some(snapshot) = self.subscription.try_next() {
            self.apply(&snapshot);
        }
        self.count
    }

    /// Wait for the next snapshot and return the updated count
    pub async fn next(&mut self) -> Option<usize> {
        let snapshot = self.subscription.next().await?;
        Some(self.apply(&snapshot))
    }

    /// Follow the store until it goes away
    pub async fn run(mut self) {
        while self.next().await.is_some() {}
        tracing::debug!("Listener count subscription ended");
    }
}
