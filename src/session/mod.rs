//! Broadcaster and listener sessions
//!
//! Each session is a state machine driven by `&mut self`: user actions are
//! async methods, and remote input arrives as events applied through
//! `handle_event`. `process_pending` applies whatever is already queued;
//! `run_until` drives a session from a task until shutdown.

pub mod broadcaster;
pub mod listener;
pub mod liveness;
pub mod playback;
pub mod state;

pub use broadcaster::BroadcasterSession;
pub use listener::{ListenerEvent, ListenerSession};
pub use liveness::{LivenessChange, LivenessWatch};
pub use playback::{AutoplayPolicy, Playback, DEFAULT_VOLUME};
pub use state::{BroadcastStatus, ListenerStatus};
