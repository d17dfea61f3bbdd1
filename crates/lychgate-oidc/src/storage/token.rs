//! OIDC token record storage trait.
//!
//! One [`OidcToken`] record exists per authenticated local identity,
//! keyed by username. The record links the IdP subject to the local user
//! account and carries the raw tokens from the last successful exchange.
//!
//! # Implementation Notes
//!
//! Implementations must:
//!
//! - Enforce at most one record per username
//! - Serialize concurrent writers for the same username (compare-and-swap
//!   or row-level locking) so token refreshes are not lost
//! - Set `user_id` exactly when a local account has been resolved

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::StoreError;

/// A persisted OIDC token record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcToken {
    /// Record identifier.
    pub id: Uuid,

    /// The linked local user ID; `None` until a local account has been
    /// resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// The local username this record is keyed by.
    pub username: String,

    /// The raw ID token from the last exchange (opaque here).
    pub id_token: String,

    /// The access token for calls against the IdP's resource.
    pub access_token: String,

    /// Optional refresh token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// When the access token expires.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,

    /// Granted scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Fields written on upsert; everything but the key.
#[derive(Debug, Clone, Default)]
pub struct TokenUpdate {
    /// The linked local user ID, when known.
    pub user_id: Option<String>,

    /// The raw ID token.
    pub id_token: String,

    /// The access token.
    pub access_token: String,

    /// Optional refresh token.
    pub refresh_token: Option<String>,

    /// When the access token expires.
    pub expires_at: Option<OffsetDateTime>,

    /// Granted scopes.
    pub scope: Option<String>,
}

impl OidcToken {
    /// Creates a record for a username from an update payload.
    #[must_use]
    pub fn from_update(username: impl Into<String>, update: TokenUpdate) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: update.user_id,
            username: username.into(),
            id_token: update.id_token,
            access_token: update.access_token,
            refresh_token: update.refresh_token,
            expires_at: update.expires_at,
            scope: update.scope,
        }
    }

    /// Applies an update payload to an existing record in place, keeping
    /// the record ID and username.
    ///
    /// An update without a `user_id` never clears an existing linkage.
    pub fn apply(&mut self, update: TokenUpdate) {
        if update.user_id.is_some() {
            self.user_id = update.user_id;
        }
        self.id_token = update.id_token;
        self.access_token = update.access_token;
        self.refresh_token = update.refresh_token;
        self.expires_at = update.expires_at;
        self.scope = update.scope;
    }
}

/// Storage trait for OIDC token records.
#[async_trait]
pub trait TokenStorage: Send + Sync {
    /// Creates or updates the record for `username`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn upsert_by_username(
        &self,
        username: &str,
        update: TokenUpdate,
    ) -> Result<OidcToken, StoreError>;

    /// Updates the record linked to `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no record is linked to the
    /// user.
    async fn upsert_by_user_id(
        &self,
        user_id: &str,
        update: TokenUpdate,
    ) -> Result<OidcToken, StoreError>;

    /// Links an existing record to a local user account.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no record exists for
    /// `username`.
    async fn link_user_id(&self, username: &str, user_id: &str) -> Result<OidcToken, StoreError>;

    /// Moves the record for `old_username` to `new_username` in place.
    ///
    /// Used when a local account is renamed so the token linkage follows.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no record exists for
    /// `old_username`, and [`StoreError::Conflict`] when a different
    /// record already exists for `new_username`.
    async fn rename_username(
        &self,
        old_username: &str,
        new_username: &str,
    ) -> Result<OidcToken, StoreError>;

    /// Finds the record for a username.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn find_by_username(&self, username: &str) -> Result<Option<OidcToken>, StoreError>;

    /// Finds the record linked to a local user ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<OidcToken>, StoreError>;

    /// Deletes the record for a username. Deleting a missing record is
    /// not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn delete_by_username(&self, username: &str) -> Result<(), StoreError>;
}
