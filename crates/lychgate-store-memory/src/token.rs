//! In-memory token record storage.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use lychgate_oidc::storage::{OidcToken, StoreError, TokenStorage, TokenUpdate};

/// Token records in a map keyed by username.
///
/// A single `RwLock` over the whole map keeps multi-key operations like
/// renames atomic.
#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    records: RwLock<HashMap<String, OidcToken>>,
}

impl MemoryTokenStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl TokenStorage for MemoryTokenStorage {
    async fn upsert_by_username(
        &self,
        username: &str,
        update: TokenUpdate,
    ) -> Result<OidcToken, StoreError> {
        let mut records = self.records.write().await;
        let record = match records.get_mut(username) {
            Some(existing) => {
                existing.apply(update);
                existing.clone()
            }
            None => {
                let record = OidcToken::from_update(username, update);
                records.insert(username.to_string(), record.clone());
                record
            }
        };
        Ok(record)
    }

    async fn upsert_by_user_id(
        &self,
        user_id: &str,
        update: TokenUpdate,
    ) -> Result<OidcToken, StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .values_mut()
            .find(|r| r.user_id.as_deref() == Some(user_id))
            .ok_or_else(|| StoreError::not_found(format!("user id {user_id}")))?;
        record.apply(update);
        Ok(record.clone())
    }

    async fn link_user_id(&self, username: &str, user_id: &str) -> Result<OidcToken, StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(username)
            .ok_or_else(|| StoreError::not_found(username))?;
        record.user_id = Some(user_id.to_string());
        Ok(record.clone())
    }

    async fn rename_username(
        &self,
        old_username: &str,
        new_username: &str,
    ) -> Result<OidcToken, StoreError> {
        let mut records = self.records.write().await;

        if old_username != new_username && records.contains_key(new_username) {
            return Err(StoreError::conflict(format!(
                "a token record already exists for {new_username}"
            )));
        }

        let mut record = records
            .remove(old_username)
            .ok_or_else(|| StoreError::not_found(old_username))?;
        record.username = new_username.to_string();
        records.insert(new_username.to_string(), record.clone());
        Ok(record)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<OidcToken>, StoreError> {
        Ok(self.records.read().await.get(username).cloned())
    }

    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<OidcToken>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|r| r.user_id.as_deref() == Some(user_id))
            .cloned())
    }

    async fn delete_by_username(&self, username: &str) -> Result<(), StoreError> {
        self.records.write().await.remove(username);
        Ok(())
    }
}
