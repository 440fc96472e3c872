//! # livecast
//!
//! Peer-to-peer live audio broadcast sessions with presence tracking.
//!
//! One broadcaster claims a well-known identifier, publishes its liveness
//! to a shared presence store, and answers every listener call with its
//! microphone stream. Listeners follow the liveness record, announce
//! themselves under the listeners path while attached, and play the
//! received audio. The listener count is derived from those presence
//! entries.
//!
//! The presence store and media transport are traits so sessions can run
//! against real services. [`MemoryStore`] and [`LocalTransport`] provide
//! in-process implementations with the same disconnect semantics.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use livecast::capture::SyntheticCapture;
//! use livecast::{BroadcasterSession, ListenerSession, LocalTransport, MemoryStore, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> livecast::Result<()> {
//!     let store = MemoryStore::new();
//!     let transport = LocalTransport::new();
//!
//!     let mut broadcaster = BroadcasterSession::new(
//!         SessionConfig::default(),
//!         transport.clone(),
//!         store.client(),
//!         SyntheticCapture::new(),
//!     );
//!     broadcaster.start().await?;
//!
//!     let mut listener =
//!         ListenerSession::new(SessionConfig::default(), transport, Arc::new(store.client()))
//!             .await?;
//!     listener.connect().await?;
//!
//!     broadcaster.process_pending().await;
//!     listener.process_pending().await;
//!     Ok(())
//! }
//! ```

pub mod capture;
pub mod config;
pub mod console;
pub mod error;
pub mod registry;
pub mod session;
pub mod stats;
pub mod store;
pub mod transport;

pub use config::SessionConfig;
pub use error::{Error, Result};
pub use session::{BroadcastStatus, BroadcasterSession, ListenerSession, ListenerStatus};
pub use stats::{BroadcastStats, ListenerCounter};
pub use store::{MemoryStore, PresenceStore, StorePath};
pub use transport::{LocalTransport, MediaTransport, PeerId};
