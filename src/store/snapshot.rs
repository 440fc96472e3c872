//! Snapshots and change subscriptions

use std::collections::{BTreeMap, BTreeSet};

use tokio::sync::mpsc;

use super::path::StorePath;
use super::value::Value;

/// Contents of the store at and below a path, at one moment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    path: StorePath,
    value: Option<Value>,
    descendants: BTreeMap<StorePath, Value>,
}

impl Snapshot {
    pub fn new(
        path: StorePath,
        value: Option<Value>,
        descendants: BTreeMap<StorePath, Value>,
    ) -> Self {
        Self {
            path,
            value,
            descendants,
        }
    }

    /// Snapshot of an absent location
    pub fn empty(path: StorePath) -> Self {
        Self::new(path, None, BTreeMap::new())
    }

    pub fn path(&self) -> &StorePath {
        &self.path
    }

    /// Value stored exactly at the path
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Whether anything exists at or below the path
    pub fn exists(&self) -> bool {
        self.value.is_some() || !self.descendants.is_empty()
    }

    /// Keys of the direct children present below the path
    pub fn child_keys(&self) -> BTreeSet<&str> {
        self.descendants
            .keys()
            .filter_map(|p| self.path.child_key(p))
            .collect()
    }

    /// Number of direct children present below the path
    pub fn child_count(&self) -> usize {
        self.child_keys().len()
    }

    /// Every value stored below the path
    pub fn descendants(&self) -> impl Iterator<Item = (&StorePath, &Value)> {
        self.descendants.iter()
    }
}

/// Stream of snapshots for one path
///
/// The first snapshot is the state at subscription time; each later one
/// follows a change at, above, or below the path.
#[derive(Debug)]
pub struct Subscription {
    path: StorePath,
    rx: mpsc::UnboundedReceiver<Snapshot>,
}

impl Subscription {
    pub fn new(path: StorePath, rx: mpsc::UnboundedReceiver<Snapshot>) -> Self {
        Self { path, rx }
    }

    pub fn path(&self) -> &StorePath {
        &self.path
    }

    /// Wait for the next snapshot (None once the store is gone)
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.rx.recv().await
    }

    /// Next already-delivered snapshot, without waiting
    pub fn try_next(&mut self) -> Option<Snapshot> {
        self.rx.try_recv().ok()
    }

    /// Drain delivered snapshots and return the most recent
    pub fn latest(&mut self) -> Option<Snapshot> {
        let mut latest = None;
        while let Some(snapshot) = self.try_next() {
            latest = Some(snapshot);
        }
        latest
    }
}
