//! Durable storage for the DPoP key record
//!
//! This module provides:
//! - The [`KeyStorage`] capability (namespaced get/put with atomic writes)
//! - File, in-memory and OS keychain backends

pub mod file_store;
#[cfg(feature = "keyring")]
pub mod keyring_store;
pub mod memory_store;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{StorageBackend, StorageConfig};

/// Storage root for everything this client persists
pub const DB_NAME: &str = "dpop-auth";
/// Namespace holding the key record
pub const STORE_NAME: &str = "dpop-keys";
/// Well-known identifier of the single key record
pub const KEY_ID: &str = "dpop-keypair";

/// Namespaced key-value storage with per-call atomic writes
///
/// Values are opaque bytes. A failed or abandoned write must leave either the
/// previous value or no value, never a partial one.
#[async_trait]
pub trait KeyStorage: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Read a value, `None` if absent
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Write a value, replacing any existing one
    async fn put(&self, namespace: &str, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Write a value only if none exists yet
    ///
    /// Returns `None` when this call stored `value`, or the value that was
    /// already present. The default implementation is a read followed by a
    /// write, so concurrent writers end up last-writer-wins; backends that can
    /// do better override it.
    async fn put_if_absent(
        &self,
        namespace: &str,
        key: &str,
        value: &[u8],
    ) -> Result<Option<Vec<u8>>, StorageError> {
        if let Some(existing) = self.get(namespace, key).await? {
            return Ok(Some(existing));
        }
        self.put(namespace, key, value).await?;
        Ok(None)
    }

    /// Delete a value. Returns whether something was removed.
    async fn delete(&self, namespace: &str, key: &str) -> Result<bool, StorageError>;
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Corrupt record {key}: {reason}")]
    Corrupt { key: String, reason: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Open the backend selected by the configuration
pub fn open_storage(config: &StorageConfig) -> Result<Arc<dyn KeyStorage>, StorageError> {
    match config.backend {
        StorageBackend::File => {
            let storage = match &config.dir {
                Some(dir) => FileStorage::with_base_dir(dir.clone()),
                None => FileStorage::new()?,
            };
            Ok(Arc::new(storage))
        }
        StorageBackend::Memory => Ok(Arc::new(MemoryStorage::new())),
        #[cfg(feature = "keyring")]
        StorageBackend::Keyring => Ok(Arc::new(KeyringStorage::new())),
        #[cfg(not(feature = "keyring"))]
        StorageBackend::Keyring => Err(StorageError::Backend(
            "keyring backend not compiled in (enable the `keyring` feature)".to_string(),
        )),
    }
}

pub use file_store::FileStorage;
#[cfg(feature = "keyring")]
pub use keyring_store::KeyringStorage;
pub use memory_store::MemoryStorage;
