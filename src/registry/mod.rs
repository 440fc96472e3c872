//! Session identity registry
//!
//! Binds well-known identifiers to at most one live transport registration.
//! The broadcaster claims its identifier through [`claim_identity`]; a
//! second claim while the first is bound is a collision, reported once and
//! never retried.
//!
//! ```text
//!                       IdentityRegistry
//!                 ┌──────────────────────────┐
//!                 │ identities: HashMap<     │
//!                 │   PeerId, IdentityEntry {│
//!                 │     registration_id,     │
//!                 │     binding,             │
//!                 │   }                      │
//!                 │ >                        │
//!                 └────────────┬─────────────┘
//!           register()         │         register()
//!      ┌───────────────────────┼────────────────────────┐
//!      ▼                                                ▼
//!  [Broadcaster A] ── Ok ──► live          [Broadcaster B] ── AlreadyBound
//! ```

pub mod claim;
pub mod entry;
pub mod error;
pub mod store;

pub use claim::{claim_identity, register_anonymous};
pub use entry::{IdentityEntry, IdentityInfo};
pub use error::RegistryError;
pub use store::IdentityRegistry;
