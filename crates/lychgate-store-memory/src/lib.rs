//! # lychgate-store-memory
//!
//! In-memory implementations of the `lychgate-oidc` storage and
//! collaborator traits.
//!
//! Suitable for tests and single-process deployments; nothing survives a
//! restart. Every backend is safe to share across tasks behind an `Arc`.
//!
//! ## Backends
//!
//! - [`MemoryTokenStorage`] - token records keyed by username
//! - [`MemoryStateStorage`] - single-use anti-forgery state records
//! - [`MemoryUserDirectory`] - a user directory seeded by the caller
//! - [`MemoryRoleAssignments`] - role assignments over a fixed role set
//! - [`RecordingEventSink`] - captures login events for inspection

mod directory;
mod events;
mod roles;
mod state;
mod token;

pub use directory::MemoryUserDirectory;
pub use events::RecordingEventSink;
pub use roles::MemoryRoleAssignments;
pub use state::MemoryStateStorage;
pub use token::MemoryTokenStorage;
