//! OS keychain storage backend

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use keyring::Entry;

use crate::storage::{KeyStorage, StorageError, DB_NAME};

/// Storage backend using OS keychain (Keychain on macOS, libsecret on Linux)
///
/// Each namespace maps to the keychain service `dpop-auth/<namespace>`.
/// The keychain has no create-if-absent primitive, so concurrent first
/// writers are last-writer-wins.
pub struct KeyringStorage {
    service_prefix: String,
}

impl KeyringStorage {
    pub fn new() -> Self {
        Self {
            service_prefix: DB_NAME.to_string(),
        }
    }

    fn get_entry(&self, namespace: &str, key: &str) -> Result<Entry, StorageError> {
        let service = format!("{}/{}", self.service_prefix, namespace);
        Entry::new(&service, key).map_err(|e| StorageError::Backend(e.to_string()))
    }
}

impl Default for KeyringStorage {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_blocking<T, F>(task: F) -> Result<T, StorageError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| StorageError::Backend(format!("Keychain task failed: {}", e)))?
}

#[async_trait]
impl KeyStorage for KeyringStorage {
    fn name(&self) -> &str {
        "keyring"
    }

    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let entry = self.get_entry(namespace, key)?;

        run_blocking(move || {
            let encoded = match entry.get_password() {
                Ok(encoded) => encoded,
                Err(keyring::Error::NoEntry) => return Ok(None),
                Err(e) => return Err(StorageError::Backend(e.to_string())),
            };

            STANDARD
                .decode(&encoded)
                .map(Some)
                .map_err(|e| StorageError::Backend(format!("Base64 decode error: {}", e)))
        })
        .await
    }

    async fn put(&self, namespace: &str, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let entry = self.get_entry(namespace, key)?;
        // keyring crate expects a string, so we base64 encode binary data
        let encoded = STANDARD.encode(value);

        run_blocking(move || {
            entry.set_password(&encoded).map_err(|e| match e {
                keyring::Error::Ambiguous(_) => {
                    StorageError::Backend("Ambiguous entry".to_string())
                }
                _ => StorageError::Backend(e.to_string()),
            })
        })
        .await
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool, StorageError> {
        let entry = self.get_entry(namespace, key)?;

        run_blocking(move || match entry.delete_credential() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(StorageError::Backend(e.to_string())),
        })
        .await
    }
}
