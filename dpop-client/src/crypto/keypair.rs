//! The ES256 key pair and its durable record encoding

use std::fmt;

use p256::ecdsa::{SigningKey, VerifyingKey};
use zeroize::Zeroizing;

use crate::crypto::jwk::JwkThumbprint;
use crate::crypto::thumbprint::compute_thumbprint;
use crate::crypto::EcPublicJwk;
use crate::storage::{StorageError, KEY_ID};

/// Record format version
const RECORD_VERSION: u8 = 1;
const SCALAR_LEN: usize = 32;
const POINT_LEN: usize = 65;
const RECORD_LEN: usize = 1 + SCALAR_LEN + POINT_LEN;

/// An ECDSA P-256 signing key pair
///
/// The private half never leaves this type except as the storage record
/// handed to [`KeyStorage`](crate::storage::KeyStorage). There is no
/// `Serialize`, `Clone` or public accessor for it, `Debug` prints only the
/// thumbprint, and the scalar is zeroized on drop.
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    pub(crate) fn from_signing_key(signing_key: SigningKey) -> Self {
        Self { signing_key }
    }

    /// The public half
    pub fn verifying_key(&self) -> &VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// SEC1 uncompressed encoding of the public key, the key identity
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.verifying_key().to_encoded_point(false).as_bytes().to_vec()
    }

    /// RFC 7638 thumbprint of the public key
    pub fn thumbprint(&self) -> Option<JwkThumbprint> {
        EcPublicJwk::from_verifying_key(self.verifying_key()).map(|jwk| compute_thumbprint(&jwk))
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// Encode as `[version][private scalar][SEC1 public point]`
    pub(crate) fn to_record(&self) -> Zeroizing<Vec<u8>> {
        let mut record = Zeroizing::new(Vec::with_capacity(RECORD_LEN));
        record.push(RECORD_VERSION);
        record.extend_from_slice(&self.signing_key.to_bytes());
        record.extend_from_slice(self.verifying_key().to_encoded_point(false).as_bytes());
        record
    }

    /// Decode a stored record, checking that its halves belong together
    pub(crate) fn from_record(record: &[u8]) -> Result<Self, StorageError> {
        let corrupt = |reason: &str| StorageError::Corrupt {
            key: KEY_ID.to_string(),
            reason: reason.to_string(),
        };

        if record.len() != RECORD_LEN {
            return Err(corrupt("unexpected record length"));
        }
        if record[0] != RECORD_VERSION {
            return Err(corrupt("unsupported record version"));
        }

        let signing_key = SigningKey::from_slice(&record[1..1 + SCALAR_LEN])
            .map_err(|_| corrupt("invalid private scalar"))?;
        let stored_public = VerifyingKey::from_sec1_bytes(&record[1 + SCALAR_LEN..])
            .map_err(|_| corrupt("invalid public point"))?;

        let key_pair = Self::from_signing_key(signing_key);
        if *key_pair.verifying_key() != stored_public {
            return Err(corrupt("public key does not match private key"));
        }

        Ok(key_pair)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let thumbprint = self.thumbprint();
        f.debug_struct("KeyPair")
            .field("alg", &"ES256")
            .field("thumbprint", &thumbprint.as_ref().map(JwkThumbprint::as_str))
            .field("private_key", &"<redacted>")
            .finish()
    }
}
