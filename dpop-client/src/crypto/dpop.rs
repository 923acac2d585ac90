//! DPoP proof encoding and decoding (RFC 9449)

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::crypto::jwk::EcPublicJwk;
use crate::crypto::keypair::KeyPair;
use crate::crypto::provider::{CryptoProvider, ALGORITHM};
use crate::error::{DPoPError, ProofDecodeError};

/// `typ` header value of a DPoP proof
pub const PROOF_TYPE: &str = "dpop+jwt";

/// Request header carrying the proof
pub const DPOP_HEADER: &str = "DPoP";

/// DPoP proof JOSE header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProofHeader {
    pub typ: String,
    pub alg: String,
    /// Public key of the signer
    pub jwk: EcPublicJwk,
}

impl ProofHeader {
    pub fn new(jwk: EcPublicJwk) -> Self {
        Self {
            typ: PROOF_TYPE.to_string(),
            alg: ALGORITHM.to_string(),
            jwk,
        }
    }
}

/// DPoP proof claims per RFC 9449 Section 4.2
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProofClaims {
    /// HTTP method (GET, POST, etc.)
    pub htm: String,
    /// Target URI without query and fragment
    pub htu: String,
    /// Unique identifier for the proof (prevents replay)
    pub jti: String,
    /// Issued at timestamp (seconds since Unix epoch)
    pub iat: i64,
    /// Server-provided nonce
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Access token hash, for resource requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ath: Option<String>,
}

/// A signed DPoP proof in compact serialization (`header.claims.signature`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof(String);

impl Proof {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    /// Decode into typed header and claims (no signature check)
    pub fn decode(&self) -> Result<DecodedProof, ProofDecodeError> {
        decode_proof(&self.0)
    }
}

impl fmt::Display for Proof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Proof {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<Proof> for String {
    fn from(proof: Proof) -> Self {
        proof.0
    }
}

/// A proof split back into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedProof {
    /// The compact proof this was decoded from
    pub raw: String,
    pub header: ProofHeader,
    pub claims: ProofClaims,
    pub signature: Vec<u8>,
    /// `header.claims` exactly as signed
    pub signing_input: String,
}

impl fmt::Display for DecodedProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header = serde_json::to_string_pretty(&self.header).map_err(|_| fmt::Error)?;
        let claims = serde_json::to_string_pretty(&self.claims).map_err(|_| fmt::Error)?;

        writeln!(f, "==================")?;
        writeln!(f, "Raw: {}", self.raw)?;
        writeln!(f, "Header:")?;
        writeln!(f, "{}", header)?;
        writeln!(f, "Payload:")?;
        writeln!(f, "{}", claims)?;
        writeln!(f, "Signature: {}", URL_SAFE_NO_PAD.encode(&self.signature))?;
        write!(f, "==================")
    }
}

/// base64url(SHA-256(access_token)), the `ath` claim value
pub fn access_token_hash(access_token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(access_token.as_bytes()))
}

/// Encode header and claims, sign, and assemble the compact proof
///
/// All-or-nothing: any failure returns an error and no partial token.
pub(crate) fn sign_proof(
    header: &ProofHeader,
    claims: &ProofClaims,
    key_pair: &KeyPair,
    crypto: &dyn CryptoProvider,
) -> Result<Proof, DPoPError> {
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header)?);
    let claims_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);

    let message = format!("{}.{}", header_b64, claims_b64);
    let signature = crypto.sign(key_pair, message.as_bytes())?;
    let sig_b64 = URL_SAFE_NO_PAD.encode(signature);

    Ok(Proof(format!("{}.{}", message, sig_b64)))
}

/// Decode a compact DPoP proof into its typed header and claims
///
/// Checks structure, encoding, schema and `typ`. Does not verify the
/// signature.
pub fn decode_proof(proof: &str) -> Result<DecodedProof, ProofDecodeError> {
    let mut parts = proof.split('.');
    let (header_b64, claims_b64, sig_b64) = match (parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(c), Some(s)) if parts.next().is_none() => (h, c, s),
        _ => return Err(ProofDecodeError::InvalidFormat),
    };

    let decode = |part: &str| {
        URL_SAFE_NO_PAD
            .decode(part)
            .map_err(|_| ProofDecodeError::InvalidBase64)
    };

    let header: ProofHeader = serde_json::from_slice(&decode(header_b64)?)?;
    if header.typ != PROOF_TYPE {
        return Err(ProofDecodeError::InvalidProofType(header.typ));
    }
    let claims: ProofClaims = serde_json::from_slice(&decode(claims_b64)?)?;
    let signature = decode(sig_b64)?;

    Ok(DecodedProof {
        raw: proof.to_string(),
        header,
        claims,
        signature,
        signing_input: format!("{}.{}", header_b64, claims_b64),
    })
}
