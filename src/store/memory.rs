//! In-memory presence store
//!
//! A process-local implementation of the store used by tests, the demo, and
//! single-host deployments. Each participant gets its own [`MemoryClient`];
//! dropping or disconnecting a client fires whatever that client armed.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use super::error::StoreError;
use super::path::StorePath;
use super::snapshot::{Snapshot, Subscription};
use super::value::Value;
use super::PresenceStore;

/// Registered subscription
struct Watcher {
    path: StorePath,
    tx: mpsc::UnboundedSender<Snapshot>,
}

struct StoreInner {
    /// Flat map of path to value
    tree: RwLock<BTreeMap<StorePath, Value>>,

    /// Active subscriptions
    watchers: Mutex<Vec<Watcher>>,

    /// Armed disconnect operations per client connection
    armed: Mutex<HashMap<u64, BTreeMap<StorePath, Option<Value>>>>,

    next_connection_id: AtomicU64,
}

impl StoreInner {
    fn snapshot_of(tree: &BTreeMap<StorePath, Value>, path: &StorePath) -> Snapshot {
        let descendants = tree
            .iter()
            .filter(|(p, _)| path.is_ancestor_of(p))
            .map(|(p, v)| (p.clone(), v.clone()))
            .collect();
        Snapshot::new(path.clone(), tree.get(path).cloned(), descendants)
    }

    /// Replace (or remove) the subtree at `path` and notify overlapping watchers
    fn apply(&self, path: &StorePath, value: Option<Value>) -> bool {
        self.apply_if(path, value, |_| true).unwrap_or(false)
    }

    /// [`apply`](Self::apply) when `guard` accepts the current value
    ///
    /// None when the guard refused, otherwise whether anything changed.
    fn apply_if<F>(&self, path: &StorePath, value: Option<Value>, guard: F) -> Option<bool>
    where
        F: FnOnce(Option<&Value>) -> bool,
    {
        let mut tree = self.tree.write();
        if !guard(tree.get(path)) {
            return None;
        }
        let before = Self::snapshot_of(&tree, path);

        tree.retain(|p, _| !path.is_ancestor_of(p));
        match value {
            Some(mut value) => {
                value.resolve_server_time(now_millis());
                tree.insert(path.clone(), value);
            }
            None => {
                tree.remove(path);
            }
        }

        if Self::snapshot_of(&tree, path) == before {
            return Some(false);
        }

        // Notify while still holding the tree lock so snapshots arrive in write order
        let mut watchers = self.watchers.lock();
        watchers.retain(|w| {
            if !w.path.overlaps(path) {
                return !w.tx.is_closed();
            }
            w.tx.send(Self::snapshot_of(&tree, &w.path)).is_ok()
        });

        Some(true)
    }

    fn disarm(&self, connection_id: u64, path: &StorePath) {
        let mut armed = self.armed.lock();
        if let Some(ops) = armed.get_mut(&connection_id) {
            ops.remove(path);
            if ops.is_empty() {
                armed.remove(&connection_id);
            }
        }
    }

    fn fire_armed(&self, connection_id: u64) {
        let armed = self.armed.lock().remove(&connection_id);

        for (path, value) in armed.into_iter().flatten() {
            let removal = value.is_none();
            let changed = self.apply(&path, value);
            tracing::info!(
                connection = connection_id,
                path = %path,
                removal = removal,
                changed = changed,
                "Auto-revert fired"
            );
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Shared in-memory store
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                tree: RwLock::new(BTreeMap::new()),
                watchers: Mutex::new(Vec::new()),
                armed: Mutex::new(HashMap::new()),
                next_connection_id: AtomicU64::new(1),
            }),
        }
    }

    /// Open a new client connection
    pub fn client(&self) -> MemoryClient {
        let connection_id = self.inner.next_connection_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(connection = connection_id, "Store client connected");

        MemoryClient {
            store: self.clone(),
            connection_id,
            connected: AtomicBool::new(true),
        }
    }

    /// Value stored exactly at a path
    pub fn get(&self, path: &StorePath) -> Option<Value> {
        self.inner.tree.read().get(path).cloned()
    }

    /// Current snapshot of a path
    pub fn snapshot(&self, path: &StorePath) -> Snapshot {
        StoreInner::snapshot_of(&self.inner.tree.read(), path)
    }

    /// Number of armed operations held for a connection
    pub fn armed_count(&self, connection_id: u64) -> usize {
        self.inner
            .armed
            .lock()
            .get(&connection_id)
            .map_or(0, |ops| ops.len())
    }

    /// Number of live subscriptions
    pub fn watcher_count(&self) -> usize {
        let mut watchers = self.inner.watchers.lock();
        watchers.retain(|w| !w.tx.is_closed());
        watchers.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// One participant's connection to a [`MemoryStore`]
pub struct MemoryClient {
    store: MemoryStore,
    connection_id: u64,
    connected: AtomicBool,
}

impl MemoryClient {
    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// The store this client is attached to
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Drop the connection as a network loss would; armed reverts fire
    pub fn disconnect(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            tracing::debug!(connection = self.connection_id, "Store client disconnected");
            self.store.inner.fire_armed(self.connection_id);
        }
    }

    fn ensure_connected(&self) -> Result<(), StoreError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(StoreError::Disconnected)
        }
    }

    fn ensure_writable(&self, path: &StorePath) -> Result<(), StoreError> {
        self.ensure_connected()?;
        if path.is_root() {
            return Err(StoreError::InvalidPath(path.clone()));
        }
        Ok(())
    }
}

impl Drop for MemoryClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl PresenceStore for MemoryClient {
    async fn subscribe(&self, path: &StorePath) -> Result<Subscription, StoreError> {
        self.ensure_connected()?;

        let (tx, rx) = mpsc::unbounded_channel();
        let tree = self.store.inner.tree.read();
        // Send the initial snapshot under the read lock so no change slips in between
        let _ = tx.send(StoreInner::snapshot_of(&tree, path));
        self.store.inner.watchers.lock().push(Watcher {
            path: path.clone(),
            tx,
        });
        drop(tree);

        Ok(Subscription::new(path.clone(), rx))
    }

    async fn write(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        self.ensure_writable(path)?;
        self.store.inner.apply(path, Some(value));
        Ok(())
    }

    async fn delete(&self, path: &StorePath) -> Result<(), StoreError> {
        self.ensure_writable(path)?;
        self.store.inner.apply(path, None);
        Ok(())
    }

    async fn arm_auto_revert(
        &self,
        path: &StorePath,
        on_disconnect: Option<Value>,
    ) -> Result<(), StoreError> {
        self.ensure_writable(path)?;
        self.store
            .inner
            .armed
            .lock()
            .entry(self.connection_id)
            .or_default()
            .insert(path.clone(), on_disconnect);
        Ok(())
    }

    async fn cancel_auto_revert(&self, path: &StorePath) -> Result<(), StoreError> {
        self.ensure_connected()?;
        self.store.inner.disarm(self.connection_id, path);
        Ok(())
    }

    async fn write_if<F>(
        &self,
        path: &StorePath,
        value: Option<Value>,
        guard: F,
    ) -> Result<bool, StoreError>
    where
        F: FnOnce(Option<&Value>) -> bool + Send,
    {
        self.ensure_writable(path)?;
        Ok(self.store.inner.apply_if(path, value, guard).is_some())
    }

    fn release_now<F>(&self, path: &StorePath, value: Option<Value>, guard: F) -> bool
    where
        F: FnOnce(Option<&Value>) -> bool,
    {
        if self.ensure_writable(path).is_err() {
            return false;
        }
        self.store.inner.disarm(self.connection_id, path);
        self.store.inner.apply_if(path, value, guard).is_some()
    }
}
