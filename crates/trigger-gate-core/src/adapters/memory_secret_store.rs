//! # In-Memory Secret Store
//!
//! Thread-safe in-memory implementation for testing and development.

use crate::secrets::{SecretData, SecretStore, SecretStoreError, SecretValue};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};

/// Thread-safe in-memory secret store
///
/// Secrets are keyed by namespace and name. Cloning the store shares the
/// underlying map, so a test can keep a handle and mutate secrets after the
/// store has been handed to a cache.
#[derive(Clone, Default)]
pub struct InMemorySecretStore {
    secrets: Arc<RwLock<HashMap<(String, String), SecretData>>>,
}

impl InMemorySecretStore {
    /// Create new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a whole secret
    pub fn insert_secret(&self, namespace: &str, name: &str, data: SecretData) {
        self.secrets
            .write()
            .insert((namespace.to_string(), name.to_string()), data);
    }

    /// Insert or replace a single key of a secret, creating the secret if needed
    pub fn insert_key(&self, namespace: &str, name: &str, key: &str, value: impl Into<Vec<u8>>) {
        self.secrets
            .write()
            .entry((namespace.to_string(), name.to_string()))
            .or_default()
            .insert(key.to_string(), SecretValue::from_bytes(value.into()));
    }

    /// Remove a secret, returning whether it existed
    pub fn remove_secret(&self, namespace: &str, name: &str) -> bool {
        self.secrets
            .write()
            .remove(&(namespace.to_string(), name.to_string()))
            .is_some()
    }

    /// Number of stored secrets
    pub fn len(&self) -> usize {
        self.secrets.read().len()
    }

    /// Check if the store holds no secrets
    pub fn is_empty(&self) -> bool {
        self.secrets.read().is_empty()
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<SecretData>, SecretStoreError> {
        Ok(self
            .secrets
            .read()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }
}

impl std::fmt::Debug for InMemorySecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySecretStore")
            .field("secrets", &self.len())
            .finish()
    }
}

#[cfg(test)]
#[path = "memory_secret_store_tests.rs"]
mod tests;
