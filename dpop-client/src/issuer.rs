//! Proof issuer: mints a signed DPoP proof per HTTP request
//!
//! Stateless per call. Each proof gets a fresh `jti` and the current `iat`,
//! and is signed with the vault's key pair, whose public half is embedded in
//! the header.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use reqwest::Method;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::crypto::dpop::sign_proof;
use crate::crypto::{access_token_hash, Proof, ProofClaims, ProofHeader};
use crate::error::DPoPError;
use crate::vault::KeyVault;

/// Optional claims for a proof
#[derive(Debug, Clone, Default)]
pub struct ProofOptions {
    /// Server-provided nonce (`DPoP-Nonce` response header)
    pub nonce: Option<String>,
    /// Access token the request carries; bound through the `ath` claim
    pub access_token: Option<String>,
}

/// Creates DPoP proofs with the key held by a [`KeyVault`]
#[derive(Clone)]
pub struct ProofIssuer {
    vault: Arc<KeyVault>,
}

impl ProofIssuer {
    pub fn new(vault: Arc<KeyVault>) -> Self {
        Self { vault }
    }

    pub fn vault(&self) -> &Arc<KeyVault> {
        &self.vault
    }

    /// Create a DPoP proof for an HTTP request
    ///
    /// Fails with [`DPoPError::NoKeyMaterial`] if no key pair has been
    /// established; this never generates one. Errors are not retried, since
    /// a new attempt needs a new `jti` and `iat` anyway.
    pub async fn create_proof(&self, method: &str, url: &str) -> Result<Proof, DPoPError> {
        self.create_proof_with(method, url, &ProofOptions::default())
            .await
    }

    /// Create a DPoP proof carrying a nonce and/or access token hash
    pub async fn create_proof_with(
        &self,
        method: &str,
        url: &str,
        options: &ProofOptions,
    ) -> Result<Proof, DPoPError> {
        let htm = validate_method(method)?;
        let htu = normalize_target(url)?;

        let key_pair = self
            .vault
            .get_key_pair()
            .await?
            .ok_or(DPoPError::NoKeyMaterial)?;

        let crypto = self.vault.crypto();
        let header = ProofHeader::new(crypto.export_public_jwk(&key_pair)?);

        let claims = ProofClaims {
            htm,
            htu,
            jti: Uuid::new_v4().to_string(),
            iat: unix_now()?,
            nonce: options.nonce.clone(),
            ath: options.access_token.as_deref().map(access_token_hash),
        };

        let proof = sign_proof(&header, &claims, &key_pair, crypto)?;

        debug!(
            htm = %claims.htm,
            htu = %claims.htu,
            jti = %claims.jti,
            "Created DPoP proof"
        );
        if let Ok(decoded) = proof.decode() {
            debug!("{}", decoded);
        }

        Ok(proof)
    }
}

/// Check that `method` is an HTTP method token
fn validate_method(method: &str) -> Result<String, DPoPError> {
    Method::from_bytes(method.as_bytes())
        .map(|m| m.as_str().to_string())
        .map_err(|_| DPoPError::InvalidMethod(method.to_string()))
}

/// The `htu` value: the absolute target URI without query and fragment
pub fn normalize_target(url: &str) -> Result<String, DPoPError> {
    let mut target =
        Url::parse(url).map_err(|e| DPoPError::InvalidTarget(format!("{}: {}", url, e)))?;

    if target.cannot_be_a_base() {
        return Err(DPoPError::InvalidTarget(format!(
            "{}: not a hierarchical URI",
            url
        )));
    }

    // Userinfo never goes on the wire, so it is not part of the request URI
    if target.set_username("").is_err() || target.set_password(None).is_err() {
        return Err(DPoPError::InvalidTarget(format!(
            "{}: cannot strip userinfo",
            url
        )));
    }
    target.set_query(None);
    target.set_fragment(None);
    Ok(target.into())
}

fn unix_now() -> Result<i64, DPoPError> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| DPoPError::ClockError)?
        .as_secs() as i64)
}
