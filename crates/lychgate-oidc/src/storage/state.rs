//! Anti-forgery state storage trait.
//!
//! A state record is written when a login is initiated and consumed
//! exactly once when the callback arrives. Consumption is the CSRF and
//! replay check: a state that is unknown, expired, or already consumed
//! fails the callback.
//!
//! # Implementation Notes
//!
//! Implementations must:
//!
//! - Store records with a short TTL (the flow config's `state_ttl`)
//! - Make `consume` atomic: of two concurrent callbacks presenting the
//!   same state, exactly one may receive the record
//! - Clean up expired records periodically

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::StoreError;

/// A pending login attempt awaiting its callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthState {
    /// The unguessable state value passed through the redirect.
    pub state: String,

    /// The nonce bound into the ID token for replay protection.
    pub nonce: String,

    /// Where the user wanted to go before being sent to the IdP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wants_url: Option<String>,

    /// When the record was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the record expires.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl AuthState {
    /// Creates a record expiring `ttl` from now.
    #[must_use]
    pub fn new(
        state: impl Into<String>,
        nonce: impl Into<String>,
        wants_url: Option<String>,
        ttl: std::time::Duration,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            state: state.into(),
            nonce: nonce.into(),
            wants_url,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// Returns `true` if the record has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() >= self.expires_at
    }
}

/// Storage trait for anti-forgery state records.
#[async_trait]
pub trait StateStorage: Send + Sync {
    /// Stores a pending state record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn create(&self, record: &AuthState) -> Result<(), StoreError>;

    /// Atomically removes and returns the record for `state`.
    ///
    /// Returns `None` when the state is unknown, already consumed, or
    /// expired. First successful consumer wins; a concurrent duplicate
    /// callback must observe `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn consume(&self, state: &str) -> Result<Option<AuthState>, StoreError>;

    /// Deletes expired records, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the cleanup operation fails.
    async fn cleanup_expired(&self) -> Result<u64, StoreError>;
}
