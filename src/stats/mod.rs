//! Session statistics and the live listener count

pub mod listeners;
pub mod metrics;

pub use listeners::ListenerCounter;
pub use metrics::BroadcastStats;
