//! JSON Web Key (JWK) types for DPoP

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use p256::ecdsa::VerifyingKey;
use serde::{Deserialize, Serialize};

/// Expected coordinate length for P-256 (32 bytes)
const P256_COORDINATE_LEN: usize = 32;

/// EC public key in JWK format (P-256/ES256)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EcPublicJwk {
    /// Key type (always "EC")
    pub kty: String,
    /// Curve name (always "P-256" for ES256)
    pub crv: String,
    /// X coordinate (base64url-encoded)
    pub x: String,
    /// Y coordinate (base64url-encoded)
    pub y: String,
}

impl EcPublicJwk {
    /// Create a new EC public JWK for P-256
    pub fn new(x: String, y: String) -> Self {
        Self {
            kty: "EC".to_string(),
            crv: "P-256".to_string(),
            x,
            y,
        }
    }

    /// Encode a verifying key
    ///
    /// Returns `None` only for the identity point, which a valid key never is.
    pub fn from_verifying_key(verifying_key: &VerifyingKey) -> Option<Self> {
        let point = verifying_key.to_encoded_point(false);
        let x = URL_SAFE_NO_PAD.encode(point.x()?);
        let y = URL_SAFE_NO_PAD.encode(point.y()?);
        Some(Self::new(x, y))
    }

    /// Rebuild the verifying key this JWK describes
    ///
    /// Returns `None` for non-P-256 keys, bad base64, wrong coordinate
    /// lengths, or points not on the curve.
    pub fn to_verifying_key(&self) -> Option<VerifyingKey> {
        if self.kty != "EC" || self.crv != "P-256" {
            return None;
        }

        let x = URL_SAFE_NO_PAD.decode(&self.x).ok()?;
        let y = URL_SAFE_NO_PAD.decode(&self.y).ok()?;
        if x.len() != P256_COORDINATE_LEN || y.len() != P256_COORDINATE_LEN {
            return None;
        }

        // Uncompressed SEC1 point: 0x04 || x || y
        let mut point = Vec::with_capacity(1 + 2 * P256_COORDINATE_LEN);
        point.push(0x04);
        point.extend_from_slice(&x);
        point.extend_from_slice(&y);

        VerifyingKey::from_sec1_bytes(&point).ok()
    }
}

/// JWK Thumbprint (RFC 7638)
///
/// A thumbprint is a SHA-256 hash of the canonical JSON representation
/// of a JWK, providing a unique identifier for the key. Servers put it in
/// the `cnf.jkt` claim of DPoP-bound tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JwkThumbprint(String);

impl JwkThumbprint {
    pub fn new(thumbprint: String) -> Self {
        Self(thumbprint)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for JwkThumbprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for JwkThumbprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
