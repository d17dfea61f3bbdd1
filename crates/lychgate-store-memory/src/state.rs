//! In-memory anti-forgery state storage.

use async_trait::async_trait;
use dashmap::DashMap;

use lychgate_oidc::storage::{AuthState, StateStorage, StoreError};

/// State records in a concurrent map keyed by the state value.
///
/// `DashMap::remove` is atomic, which gives `consume` its
/// first-consumer-wins guarantee without extra locking.
#[derive(Debug, Default)]
pub struct MemoryStateStorage {
    records: DashMap<String, AuthState>,
}

impl MemoryStateStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pending records, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl StateStorage for MemoryStateStorage {
    async fn create(&self, record: &AuthState) -> Result<(), StoreError> {
        self.records.insert(record.state.clone(), record.clone());
        Ok(())
    }

    async fn consume(&self, state: &str) -> Result<Option<AuthState>, StoreError> {
        match self.records.remove(state) {
            Some((_, record)) if !record.is_expired() => Ok(Some(record)),
            _ => Ok(None),
        }
    }

    async fn cleanup_expired(&self) -> Result<u64, StoreError> {
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_expired());
        Ok((before - self.records.len()) as u64)
    }
}
