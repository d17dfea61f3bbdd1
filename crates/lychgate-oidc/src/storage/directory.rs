//! User directory trait.
//!
//! The host application owns user accounts; the login flow only looks
//! them up and, when the provisioning policy allows, asks for a new one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::StoreError;

/// A local user account, as seen by the login flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalUser {
    /// The host's user identifier.
    pub id: String,

    /// The local username.
    pub username: String,

    /// Email address, if the host tracks one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl LocalUser {
    /// Creates a user with an ID and username.
    #[must_use]
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            email: None,
        }
    }

    /// Sets the email address.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Profile data offered to the directory when provisioning a new account.
///
/// Built from validated ID token claims.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserProfile {
    /// The username resolved from the token.
    pub username: String,

    /// The IdP subject identifier.
    pub subject: String,

    /// Email claim, if present.
    pub email: Option<String>,

    /// Given name claim, if present.
    pub given_name: Option<String>,

    /// Family name claim, if present.
    pub family_name: Option<String>,
}

/// The host application's user accounts.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Finds a user by the host's user ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory fails.
    async fn find_by_id(&self, id: &str) -> Result<Option<LocalUser>, StoreError>;

    /// Finds a user by username.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory fails.
    async fn find_by_username(&self, username: &str) -> Result<Option<LocalUser>, StoreError>;

    /// Creates a new account from a token-derived profile.
    ///
    /// Only called when the flow's provisioning policy is
    /// [`AutoProvision`](crate::config::ProvisioningPolicy::AutoProvision).
    ///
    /// # Errors
    ///
    /// Returns an error if the directory refuses or fails to create the
    /// account.
    async fn provision(&self, profile: &UserProfile) -> Result<LocalUser, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_user_builder() {
        let user = LocalUser::new("u1", "alice").with_email("alice@example.com");
        assert_eq!(user.id, "u1");
        assert_eq!(user.username, "alice");
        assert_eq!(user.email, Some("alice@example.com".to_string()));
    }
}
