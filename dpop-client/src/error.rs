//! Error types for key management and proof creation

use thiserror::Error;

use crate::storage::StorageError;

/// Errors from the key vault and the proof issuer
#[derive(Debug, Error)]
pub enum DPoPError {
    /// Durable storage could not be read or written
    #[error("Key storage unavailable: {0}")]
    StorageUnavailable(#[from] StorageError),

    /// A proof was requested before a key pair was established
    #[error("No DPoP key pair available (call ensure_key_pair first)")]
    NoKeyMaterial,

    /// Key pair generation failed
    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// The public key could not be exported as a JWK
    #[error("Public key export failed: {0}")]
    KeyExportFailed(String),

    /// The signing operation failed
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// Not a valid HTTP method token
    #[error("Invalid HTTP method: {0:?}")]
    InvalidMethod(String),

    /// Not an absolute target URI
    #[error("Invalid target URI: {0}")]
    InvalidTarget(String),

    /// System clock is before the Unix epoch
    #[error("Clock error")]
    ClockError,

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from decoding a compact proof back into its typed parts
#[derive(Debug, Error)]
pub enum ProofDecodeError {
    /// Not three dot-separated parts
    #[error("Invalid proof format")]
    InvalidFormat,

    /// A part is not unpadded base64url
    #[error("Invalid base64")]
    InvalidBase64,

    /// Header or payload does not match the proof schema
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Header `typ` is not `dpop+jwt`
    #[error("Invalid proof type (expected dpop+jwt, got {0})")]
    InvalidProofType(String),
}
