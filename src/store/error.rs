//! Store error types

use super::path::StorePath;

/// Error type for presence store operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The client's connection to the store is closed
    Disconnected,
    /// Writes to the tree root are not allowed
    InvalidPath(StorePath),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Disconnected => write!(f, "Store connection closed"),
            StoreError::InvalidPath(path) => write!(f, "Invalid store path: {}", path),
        }
    }
}

impl std::error::Error for StoreError {}
