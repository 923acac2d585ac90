//! In-memory storage for tests and ephemeral sessions

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::storage::{KeyStorage, StorageError};

/// Process-local storage. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn entry_key(namespace: &str, key: &str) -> (String, String) {
    (namespace.to_string(), key.to_string())
}

#[async_trait]
impl KeyStorage for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let entries = self.entries.read().await;
        Ok(entries.get(&entry_key(namespace, key)).cloned())
    }

    async fn put(&self, namespace: &str, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let mut entries = self.entries.write().await;
        entries.insert(entry_key(namespace, key), value.to_vec());
        Ok(())
    }

    async fn put_if_absent(
        &self,
        namespace: &str,
        key: &str,
        value: &[u8],
    ) -> Result<Option<Vec<u8>>, StorageError> {
        let mut entries = self.entries.write().await;
        match entries.entry(entry_key(namespace, key)) {
            Entry::Occupied(existing) => Ok(Some(existing.get().clone())),
            Entry::Vacant(vacant) => {
                vacant.insert(value.to_vec());
                Ok(None)
            }
        }
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool, StorageError> {
        let mut entries = self.entries.write().await;
        Ok(entries.remove(&entry_key(namespace, key)).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get() {
        let storage = MemoryStorage::new();
        storage.put("ns", "key", b"value").await.unwrap();

        assert_eq!(storage.get("ns", "key").await.unwrap(), Some(b"value".to_vec()));
        assert_eq!(storage.get("other", "key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_if_absent_keeps_first_value() {
        let storage = MemoryStorage::new();

        assert_eq!(storage.put_if_absent("ns", "key", b"first").await.unwrap(), None);
        assert_eq!(
            storage.put_if_absent("ns", "key", b"second").await.unwrap(),
            Some(b"first".to_vec())
        );
        assert_eq!(storage.get("ns", "key").await.unwrap(), Some(b"first".to_vec()));
    }

    #[tokio::test]
    async fn test_delete() {
        let storage = MemoryStorage::new();
        storage.put("ns", "key", b"value").await.unwrap();

        assert!(storage.delete("ns", "key").await.unwrap());
        assert!(!storage.delete("ns", "key").await.unwrap());
        assert_eq!(storage.get("ns", "key").await.unwrap(), None);
    }
}
