//! Cryptographic operations for DPoP
//!
//! This module provides:
//! - The ES256 key pair and its storage record
//! - A crypto provider trait for pluggable key backends
//! - JWK thumbprint computation (RFC 7638)
//! - DPoP proof encoding and typed decoding (RFC 9449)

pub mod dpop;
pub mod jwk;
pub mod keypair;
pub mod provider;
pub mod thumbprint;

pub use dpop::{
    access_token_hash, decode_proof, DecodedProof, Proof, ProofClaims, ProofHeader, DPOP_HEADER,
    PROOF_TYPE,
};
pub use jwk::{EcPublicJwk, JwkThumbprint};
pub use keypair::KeyPair;
pub use provider::{CryptoProvider, SoftwareCrypto, ALGORITHM};
pub use thumbprint::compute_thumbprint;
