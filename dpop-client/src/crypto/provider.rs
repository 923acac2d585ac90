//! Crypto capability: key generation, JWK export and signing

use p256::ecdsa::{signature::Signer, Signature, SigningKey};
use p256::elliptic_curve::rand_core::OsRng;

use crate::crypto::jwk::EcPublicJwk;
use crate::crypto::keypair::KeyPair;
use crate::error::DPoPError;

/// JWS algorithm identifier for ECDSA P-256 with SHA-256
pub const ALGORITHM: &str = "ES256";

/// Trait for the cryptographic operations behind DPoP
///
/// Injected into [`KeyVault`](crate::vault::KeyVault) so the core can run
/// against fakes in tests. Every implementation works on ES256 key pairs.
pub trait CryptoProvider: Send + Sync {
    /// Generate a fresh ES256 key pair
    fn generate_key_pair(&self) -> Result<KeyPair, DPoPError>;

    /// Export the public half as a JWK
    fn export_public_jwk(&self, key_pair: &KeyPair) -> Result<EcPublicJwk, DPoPError>;

    /// Sign `message`, returning the 64-byte JWS `r || s` signature
    fn sign(&self, key_pair: &KeyPair, message: &[u8]) -> Result<Vec<u8>, DPoPError>;
}

/// Software implementation on the `p256` crate with OS randomness
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareCrypto;

impl CryptoProvider for SoftwareCrypto {
    fn generate_key_pair(&self) -> Result<KeyPair, DPoPError> {
        Ok(KeyPair::from_signing_key(SigningKey::random(&mut OsRng)))
    }

    fn export_public_jwk(&self, key_pair: &KeyPair) -> Result<EcPublicJwk, DPoPError> {
        EcPublicJwk::from_verifying_key(key_pair.verifying_key()).ok_or_else(|| {
            DPoPError::KeyExportFailed("public key has no affine coordinates".to_string())
        })
    }

    fn sign(&self, key_pair: &KeyPair, message: &[u8]) -> Result<Vec<u8>, DPoPError> {
        let signature: Signature = key_pair
            .signing_key()
            .try_sign(message)
            .map_err(|e| DPoPError::SigningFailed(e.to_string()))?;
        Ok(signature.to_bytes().to_vec())
    }
}
