//! Registry error types

use crate::transport::PeerId;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Identifier already bound to another registration
    AlreadyBound(PeerId),
    /// Identifier not bound
    NotBound(PeerId),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::AlreadyBound(id) => write!(f, "Identifier already bound: {}", id),
            RegistryError::NotBound(id) => write!(f, "Identifier not bound: {}", id),
        }
    }
}

impl std::error::Error for RegistryError {}
