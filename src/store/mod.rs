//! Presence store
//!
//! A realtime key-value tree shared by every participant. Sessions keep all
//! cross-participant state here:
//!
//! ```text
//!   status/main            LivenessRecord   written by the broadcaster,
//!                                           reverted by the store on drop
//!   listeners/<peer-id>    PresenceEntry    written by each listener,
//!                                           removed by the store on drop
//! ```
//!
//! The important property is that the *store* owns the compensating write:
//! a client arms it up front with [`PresenceStore::arm_auto_revert`], and the
//! store fires it exactly once if that client's connection goes away without
//! cancelling. Listener counts trust nothing else.

pub mod error;
pub mod memory;
pub mod path;
pub mod snapshot;
pub mod value;

use std::future::Future;
use std::sync::Arc;

pub use error::StoreError;
pub use memory::{MemoryClient, MemoryStore};
pub use path::{StorePath, LISTENERS_PATH, LIVENESS_PATH};
pub use snapshot::{Snapshot, Subscription};
pub use value::{LivenessRecord, PresenceEntry, Timestamp, Value};

/// One participant's connection to the presence store
pub trait PresenceStore: Send + Sync {
    /// Subscribe to a path; the current snapshot is delivered first
    fn subscribe(
        &self,
        path: &StorePath,
    ) -> impl Future<Output = Result<Subscription, StoreError>> + Send;

    /// Replace the value at a path (and everything below it)
    fn write(
        &self,
        path: &StorePath,
        value: Value,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Remove a path and everything below it
    fn delete(&self, path: &StorePath) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Arm a write (or removal when `None`) that the store performs if this
    /// connection drops before [`cancel_auto_revert`](Self::cancel_auto_revert)
    fn arm_auto_revert(
        &self,
        path: &StorePath,
        on_disconnect: Option<Value>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Disarm a pending revert for a path
    fn cancel_auto_revert(
        &self,
        path: &StorePath,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Write (or remove when `None`) only if `guard` accepts the current value
    ///
    /// Resolves to whether the write was applied.
    fn write_if<F>(
        &self,
        path: &StorePath,
        value: Option<Value>,
        guard: F,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send
    where
        F: FnOnce(Option<&Value>) -> bool + Send;

    /// Disarm the path's revert and apply a guarded write without waiting
    ///
    /// Best effort, for `Drop` where nothing can be awaited. Returns whether
    /// the write was applied.
    fn release_now<F>(&self, path: &StorePath, value: Option<Value>, guard: F) -> bool
    where
        F: FnOnce(Option<&Value>) -> bool;
}

impl<T: PresenceStore> PresenceStore for Arc<T> {
    fn subscribe(
        &self,
        path: &StorePath,
    ) -> impl Future<Output = Result<Subscription, StoreError>> + Send {
        (**self).subscribe(path)
    }

    fn write(
        &self,
        path: &StorePath,
        value: Value,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).write(path, value)
    }

    fn delete(&self, path: &StorePath) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).delete(path)
    }

    fn arm_auto_revert(
        &self,
        path: &StorePath,
        on_disconnect: Option<Value>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).arm_auto_revert(path, on_disconnect)
    }

    fn cancel_auto_revert(
        &self,
        path: &StorePath,
    ) -> impl Future<Output = Result<(), StoreError>> + Send {
        (**self).cancel_auto_revert(path)
    }

    fn write_if<F>(
        &self,
        path: &StorePath,
        value: Option<Value>,
        guard: F,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send
    where
        F: FnOnce(Option<&Value>) -> bool + Send,
    {
        (**self).write_if(path, value, guard)
    }

    fn release_now<F>(&self, path: &StorePath, value: Option<Value>, guard: F) -> bool
    where
        F: FnOnce(Option<&Value>) -> bool,
    {
        (**self).release_now(path, value, guard)
    }
}
