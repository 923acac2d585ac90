//! Key vault: one durable ES256 key identity per client
//!
//! The vault creates the key pair on first use, persists it under a fixed
//! record identifier, and hands out shared references for signing. It never
//! exposes the private key outside the storage record.

use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::config::ClientConfig;
use crate::crypto::{CryptoProvider, JwkThumbprint, KeyPair, SoftwareCrypto};
use crate::error::DPoPError;
use crate::storage::{open_storage, KeyStorage, KEY_ID, STORE_NAME};

/// Process-wide vault opened from configuration on first use
static GLOBAL_VAULT: OnceCell<Arc<KeyVault>> = OnceCell::const_new();

/// Owner of the client's DPoP key pair
pub struct KeyVault {
    storage: Arc<dyn KeyStorage>,
    crypto: Arc<dyn CryptoProvider>,
    /// Cached key pair; the lock also serializes first-time generation
    current: Mutex<Option<Arc<KeyPair>>>,
}

impl KeyVault {
    pub fn new(storage: Arc<dyn KeyStorage>, crypto: Arc<dyn CryptoProvider>) -> Self {
        Self {
            storage,
            crypto,
            current: Mutex::new(None),
        }
    }

    /// Vault over `storage` with the software crypto provider
    pub fn with_storage(storage: Arc<dyn KeyStorage>) -> Self {
        Self::new(storage, Arc::new(SoftwareCrypto))
    }

    /// The process-wide vault
    ///
    /// The first caller opens the configured storage; later callers, including
    /// ones racing the first, get the same instance whatever config they pass.
    pub async fn global(config: &ClientConfig) -> Result<Arc<KeyVault>, DPoPError> {
        GLOBAL_VAULT
            .get_or_try_init(|| async {
                let storage = open_storage(&config.storage)?;
                info!(backend = storage.name(), "Opened DPoP key storage");
                Ok::<_, DPoPError>(Arc::new(KeyVault::with_storage(storage)))
            })
            .await
            .cloned()
    }

    pub fn crypto(&self) -> &dyn CryptoProvider {
        self.crypto.as_ref()
    }

    /// Return the stored key pair, generating and persisting one if absent
    ///
    /// Concurrent callers on this vault wait for a single generation.
    /// Callers on other vaults over the same storage converge through
    /// [`KeyStorage::put_if_absent`]: whoever loses adopts the winner's key.
    pub async fn ensure_key_pair(&self) -> Result<Arc<KeyPair>, DPoPError> {
        let mut current = self.current.lock().await;
        if let Some(key_pair) = current.as_ref() {
            return Ok(Arc::clone(key_pair));
        }

        if let Some(key_pair) = self.load().await? {
            debug!("Loaded existing DPoP keypair");
            let key_pair = Arc::new(key_pair);
            *current = Some(Arc::clone(&key_pair));
            return Ok(key_pair);
        }

        info!("Generating new DPoP keypair");
        let generated = self.crypto.generate_key_pair()?;
        let record = generated.to_record();

        let key_pair = match self
            .storage
            .put_if_absent(STORE_NAME, KEY_ID, &record)
            .await?
        {
            None => generated,
            Some(existing) => {
                info!("Another writer stored a DPoP keypair first, using it");
                KeyPair::from_record(&Zeroizing::new(existing))?
            }
        };

        let key_pair = Arc::new(key_pair);
        if let Some(thumbprint) = key_pair.thumbprint() {
            info!(%thumbprint, "DPoP keypair ready");
        }
        *current = Some(Arc::clone(&key_pair));
        Ok(key_pair)
    }

    /// Return the stored key pair without ever generating one
    pub async fn get_key_pair(&self) -> Result<Option<Arc<KeyPair>>, DPoPError> {
        let mut current = self.current.lock().await;
        if let Some(key_pair) = current.as_ref() {
            return Ok(Some(Arc::clone(key_pair)));
        }

        let loaded = self.load().await?.map(Arc::new);
        *current = loaded.clone();
        Ok(loaded)
    }

    /// Thumbprint of the stored key, if there is one
    pub async fn thumbprint(&self) -> Result<Option<JwkThumbprint>, DPoPError> {
        Ok(self
            .get_key_pair()
            .await?
            .and_then(|key_pair| key_pair.thumbprint()))
    }

    /// Delete the key record. Returns whether one existed.
    ///
    /// Tokens bound to the old key stop working; the next
    /// [`ensure_key_pair`](Self::ensure_key_pair) creates a new identity.
    pub async fn clear(&self) -> Result<bool, DPoPError> {
        let mut current = self.current.lock().await;
        let removed = self.storage.delete(STORE_NAME, KEY_ID).await?;
        *current = None;

        if removed {
            info!("DPoP keypair deleted");
        }
        Ok(removed)
    }

    async fn load(&self) -> Result<Option<KeyPair>, DPoPError> {
        match self.storage.get(STORE_NAME, KEY_ID).await? {
            Some(record) => {
                let record = Zeroizing::new(record);
                Ok(Some(KeyPair::from_record(&record)?))
            }
            None => Ok(None),
        }
    }
}
