//! JWK Thumbprint computation (RFC 7638)

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use sha2::{Digest, Sha256};

use crate::crypto::jwk::{EcPublicJwk, JwkThumbprint};

/// Compute the JWK thumbprint of an EC public key per RFC 7638
///
/// The thumbprint is SHA-256 of the canonical JSON:
/// `{"crv":"P-256","kty":"EC","x":"...","y":"..."}`
pub fn compute_thumbprint(jwk: &EcPublicJwk) -> JwkThumbprint {
    // RFC 7638: Members MUST be in lexicographic order
    // For EC: crv < kty < x < y
    let canonical = format!(
        r#"{{"crv":"{}","kty":"{}","x":"{}","y":"{}"}}"#,
        jwk.crv, jwk.kty, jwk.x, jwk.y
    );

    let hash = Sha256::digest(canonical.as_bytes());
    JwkThumbprint::new(URL_SAFE_NO_PAD.encode(hash))
}
