//! In-memory user directory.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use lychgate_oidc::storage::{LocalUser, StoreError, UserDirectory, UserProfile};

/// A user directory seeded by the caller, keyed by user ID.
///
/// Provisioned accounts get a fresh UUID as their ID.
#[derive(Debug, Default)]
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<String, LocalUser>>,
}

impl MemoryUserDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a directory seeded with users.
    #[must_use]
    pub fn with_users(users: Vec<LocalUser>) -> Self {
        let map = users.into_iter().map(|u| (u.id.clone(), u)).collect();
        Self {
            users: RwLock::new(map),
        }
    }

    /// Adds a user.
    pub async fn insert(&self, user: LocalUser) {
        self.users.write().await.insert(user.id.clone(), user);
    }

    /// Number of accounts.
    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    /// Whether the directory is empty.
    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_id(&self, id: &str) -> Result<Option<LocalUser>, StoreError> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<LocalUser>, StoreError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn provision(&self, profile: &UserProfile) -> Result<LocalUser, StoreError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.username == profile.username) {
            return Err(StoreError::conflict(format!(
                "username {} already exists",
                profile.username
            )));
        }

        let mut user = LocalUser::new(Uuid::new_v4().to_string(), &profile.username);
        user.email = profile.email.clone();
        users.insert(user.id.clone(), user.clone());
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_by_id_and_username() {
        let directory = MemoryUserDirectory::new();
        directory.insert(LocalUser::new("u1", "alice")).await;

        assert!(directory.find_by_id("u1").await.unwrap().is_some());
        assert!(directory.find_by_username("alice").await.unwrap().is_some());
        assert!(directory.find_by_id("u2").await.unwrap().is_none());
        assert!(directory.find_by_username("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_provision_assigns_id_and_rejects_duplicates() {
        let directory = MemoryUserDirectory::new();
        let profile = UserProfile {
            username: "carol@contoso.com".to_string(),
            subject: "sub-1".to_string(),
            email: Some("carol@contoso.com".to_string()),
            ..UserProfile::default()
        };

        let user = directory.provision(&profile).await.unwrap();
        assert!(!user.id.is_empty());
        assert_eq!(user.email, profile.email);

        assert!(matches!(
            directory.provision(&profile).await,
            Err(StoreError::Conflict(_))
        ));
    }
}
