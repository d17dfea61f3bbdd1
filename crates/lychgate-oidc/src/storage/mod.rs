//! Storage and collaborator traits.
//!
//! This module defines the seams between the relying-party core and the
//! host application:
//!
//! - [`TokenStorage`] - persisted OIDC token records
//! - [`StateStorage`] - single-use anti-forgery state records
//! - [`UserDirectory`] - the host's user accounts
//! - [`RoleAssignments`] - the host's role-assignment service
//!
//! # Implementations
//!
//! In-memory backends for every trait here ship in the
//! `lychgate-store-memory` crate; production hosts supply their own
//! directory and role service.

pub mod directory;
pub mod role_service;
pub mod state;
pub mod token;

pub use directory::{LocalUser, UserDirectory, UserProfile};
pub use role_service::RoleAssignments;
pub use state::{AuthState, StateStorage};
pub use token::{OidcToken, TokenStorage, TokenUpdate};

/// Errors surfaced by storage backends and host collaborators.
///
/// `NotFound` and `Conflict` indicate token-store integrity issues; they
/// are logged with detail but shown to end users as a generic
/// authentication failure so account existence is not leaked.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record exists for the given key.
    #[error("No record found for {0}")]
    NotFound(String),

    /// The operation would violate the one-record-per-username invariant.
    #[error("Record conflict: {0}")]
    Conflict(String),

    /// The backend failed.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Creates a `NotFound` error for a key.
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    /// Creates a `Conflict` error.
    #[must_use]
    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict(reason.into())
    }

    /// Creates a `Backend` error.
    #[must_use]
    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend(reason.into())
    }

    /// Returns `true` for integrity errors (`NotFound` / `Conflict`).
    #[must_use]
    pub fn is_integrity_error(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Conflict(_))
    }
}
