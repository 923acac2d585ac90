//! Login and protected-resource flow with DPoP-bound tokens
//!
//! Every request the session sends carries a fresh proof: the token request
//! binds the issued token to the vault's key, and each protected request
//! proves possession again with an `ath` claim for the token it presents.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::HttpConfig;
use crate::crypto::DPOP_HEADER;
use crate::error::DPoPError;
use crate::issuer::{ProofIssuer, ProofOptions};
use crate::vault::KeyVault;

/// Response header carrying a server-provided nonce
pub const DPOP_NONCE_HEADER: &str = "DPoP-Nonce";

/// Token endpoint response
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl TokenResponse {
    /// `Authorization` scheme for this token
    pub fn scheme(&self) -> &'static str {
        if self.token_type.eq_ignore_ascii_case("DPoP") {
            "DPoP"
        } else {
            "Bearer"
        }
    }
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    DPoP(#[from] DPoPError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("Request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Not logged in")]
    NotLoggedIn,
}

#[derive(Default)]
struct SessionState {
    token: Option<TokenResponse>,
    /// Latest nonce each server handed out, by origin
    nonces: HashMap<String, String>,
}

/// HTTP client that attaches DPoP proofs from a [`KeyVault`]
pub struct DPoPSession {
    http: Client,
    issuer: ProofIssuer,
    state: RwLock<SessionState>,
}

impl DPoPSession {
    pub fn new(vault: Arc<KeyVault>, config: &HttpConfig) -> Result<Self, SessionError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("dpop-client/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            issuer: ProofIssuer::new(vault),
            state: RwLock::new(SessionState::default()),
        })
    }

    pub fn issuer(&self) -> &ProofIssuer {
        &self.issuer
    }

    /// Current access token, if logged in
    pub async fn access_token(&self) -> Option<TokenResponse> {
        self.state.read().await.token.clone()
    }

    /// Request a DPoP-bound token with username and password
    ///
    /// Establishes the key pair first if this client has none yet.
    pub async fn login(
        &self,
        token_endpoint: &str,
        username: &str,
        password: &str,
    ) -> Result<TokenResponse, SessionError> {
        self.issuer.vault().ensure_key_pair().await?;

        let body = serde_json::to_value(TokenRequest { username, password })
            .map_err(DPoPError::from)?;
        let response = self
            .send(Method::POST, token_endpoint, None, Some(&body))
            .await?;
        let token: TokenResponse = check_status(response).await?.json().await?;

        info!(
            token_type = %token.token_type,
            expires_in = ?token.expires_in,
            "Obtained access token"
        );
        self.state.write().await.token = Some(token.clone());
        Ok(token)
    }

    /// GET a protected resource with the current token
    pub async fn fetch_protected(&self, url: &str) -> Result<serde_json::Value, SessionError> {
        let token = self
            .state
            .read()
            .await
            .token
            .clone()
            .ok_or(SessionError::NotLoggedIn)?;

        let response = self.send(Method::GET, url, Some(&token), None).await?;
        Ok(check_status(response).await?.json().await?)
    }

    /// Forget the token and nonce; the key pair stays
    pub async fn logout(&self) {
        let mut state = self.state.write().await;
        state.token = None;
        state.nonces.clear();
        debug!("Session cleared");
    }

    /// Send one request with a fresh proof, answering a nonce challenge once
    async fn send(
        &self,
        method: Method,
        url: &str,
        token: Option<&TokenResponse>,
        body: Option<&serde_json::Value>,
    ) -> Result<Response, SessionError> {
        // Unparseable URLs get no key here; the issuer rejects them
        let origin = Url::parse(url)
            .ok()
            .map(|target| target.origin().ascii_serialization());
        let mut nonce = match &origin {
            Some(origin) => self.state.read().await.nonces.get(origin).cloned(),
            None => None,
        };
        let mut challenged = false;

        loop {
            let options = ProofOptions {
                nonce: nonce.clone(),
                access_token: token.map(|t| t.access_token.clone()),
            };
            let proof = self
                .issuer
                .create_proof_with(method.as_str(), url, &options)
                .await?;

            let mut request = self
                .http
                .request(method.clone(), url)
                .header(DPOP_HEADER, proof.as_str());
            if let Some(token) = token {
                request = request.header(
                    AUTHORIZATION,
                    format!("{} {}", token.scheme(), token.access_token),
                );
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await?;

            let server_nonce = response
                .headers()
                .get(DPOP_NONCE_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            let Some(server_nonce) = server_nonce else {
                return Ok(response);
            };
            if let Some(origin) = &origin {
                self.state
                    .write()
                    .await
                    .nonces
                    .insert(origin.clone(), server_nonce.clone());
            }

            let status = response.status();
            let is_challenge =
                status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED;
            if !is_challenge || challenged {
                return Ok(response);
            }

            warn!(
                %status,
                origin = origin.as_deref().unwrap_or_default(),
                "Server requires a DPoP nonce, retrying"
            );
            nonce = Some(server_nonce);
            challenged = true;
        }
    }
}

async fn check_status(response: Response) -> Result<Response, SessionError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(SessionError::Rejected {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{access_token_hash, decode_proof, DecodedProof};
    use crate::storage::MemoryStorage;
    use serde_json::json;
    use std::net::TcpListener;
    use wiremock::matchers::{body_json, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    fn session() -> DPoPSession {
        let vault = Arc::new(KeyVault::with_storage(Arc::new(MemoryStorage::new())));
        DPoPSession::new(vault, &HttpConfig::default()).unwrap()
    }

    fn proof_of(request: &Request) -> DecodedProof {
        let value = request.headers.get(DPOP_HEADER).unwrap().to_str().unwrap();
        decode_proof(value).unwrap()
    }

    async fn mount_token_endpoint(server: &MockServer, token_type: &str) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(header_exists(DPOP_HEADER))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "token-abc",
                "token_type": token_type,
                "expires_in": 3600
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_login_sends_proof_and_credentials() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .and(header_exists(DPOP_HEADER))
            .and(body_json(json!({"username": "demo", "password": "password"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "token-abc",
                "token_type": "DPoP",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = session();
        assert!(session.issuer().vault().get_key_pair().await.unwrap().is_none());

        let endpoint = format!("{}/token", server.uri());
        let token = session.login(&endpoint, "demo", "password").await.unwrap();
        assert_eq!(token.access_token, "token-abc");
        assert_eq!(token.expires_in, Some(3600));
        assert!(session.access_token().await.is_some());

        let requests = server.received_requests().await.unwrap();
        let proof = proof_of(&requests[0]);
        assert_eq!(proof.claims.htm, "POST");
        assert_eq!(proof.claims.htu, endpoint);
        assert_eq!(proof.claims.ath, None);

        // The proof is signed by the key login established
        let key_pair = session.issuer().vault().get_key_pair().await.unwrap().unwrap();
        assert_eq!(
            proof.header.jwk.to_verifying_key().as_ref(),
            Some(key_pair.verifying_key())
        );
    }

    #[tokio::test]
    async fn test_login_rejected() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"error": "Invalid credentials"})),
            )
            .mount(&server)
            .await;

        let session = session();
        let result = session
            .login(&format!("{}/token", server.uri()), "demo", "wrong")
            .await;

        match result {
            Err(SessionError::Rejected { status, body }) => {
                assert_eq!(status, 401);
                assert!(body.contains("Invalid credentials"));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        assert!(session.access_token().await.is_none());
    }

    #[tokio::test]
    async fn test_fetch_before_login() {
        let session = session();

        let result = session.fetch_protected("http://127.0.0.1:9/protected").await;
        assert!(matches!(result, Err(SessionError::NotLoggedIn)));
    }

    #[tokio::test]
    async fn test_fetch_protected_binds_token() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        mount_token_endpoint(&server, "DPoP").await;

        Mock::given(method("GET"))
            .and(path("/protected"))
            .and(header("Authorization", "DPoP token-abc"))
            .and(header_exists(DPOP_HEADER))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": "Accessing protected data",
                "data": "protecteddata123",
                "userId": "demo"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = session();
        session
            .login(&format!("{}/token", server.uri()), "demo", "password")
            .await
            .unwrap();

        let resource = format!("{}/protected", server.uri());
        let data = session.fetch_protected(&format!("{}?page=2", resource)).await.unwrap();
        assert_eq!(data["data"], "protecteddata123");

        let requests = server.received_requests().await.unwrap();
        let login_proof = proof_of(&requests[0]);
        let fetch_proof = proof_of(&requests[1]);

        assert_eq!(fetch_proof.claims.htm, "GET");
        assert_eq!(fetch_proof.claims.htu, resource);
        assert_eq!(fetch_proof.claims.ath, Some(access_token_hash("token-abc")));
        assert_ne!(fetch_proof.claims.jti, login_proof.claims.jti);
        assert_eq!(fetch_proof.header.jwk, login_proof.header.jwk);
    }

    #[tokio::test]
    async fn test_bearer_scheme_for_plain_tokens() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        mount_token_endpoint(&server, "Bearer").await;

        Mock::given(method("GET"))
            .and(path("/protected"))
            .and(header("Authorization", "Bearer token-abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let session = session();
        session
            .login(&format!("{}/token", server.uri()), "demo", "password")
            .await
            .unwrap();

        let data = session
            .fetch_protected(&format!("{}/protected", server.uri()))
            .await
            .unwrap();
        assert_eq!(data["ok"], true);
    }

    #[tokio::test]
    async fn test_nonce_challenge_retried_once() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(400)
                    .insert_header(DPOP_NONCE_HEADER, "nonce-1")
                    .set_body_json(json!({"error": "use_dpop_nonce"})),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        mount_token_endpoint(&server, "DPoP").await;

        let session = session();
        session
            .login(&format!("{}/token", server.uri()), "demo", "password")
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);

        let first = proof_of(&requests[0]);
        let second = proof_of(&requests[1]);
        assert_eq!(first.claims.nonce, None);
        assert_eq!(second.claims.nonce.as_deref(), Some("nonce-1"));
        assert_ne!(first.claims.jti, second.claims.jti);
    }

    #[tokio::test]
    async fn test_persistent_challenge_not_retried_twice() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(401)
                    .insert_header(DPOP_NONCE_HEADER, "nonce-again")
                    .set_body_json(json!({"error": "use_dpop_nonce"})),
            )
            .expect(2)
            .mount(&server)
            .await;

        let session = session();
        let result = session
            .login(&format!("{}/token", server.uri()), "demo", "password")
            .await;

        assert!(matches!(
            result,
            Err(SessionError::Rejected { status: 401, .. })
        ));
    }

    #[tokio::test]
    async fn test_remembered_nonce_used_for_next_request() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(DPOP_NONCE_HEADER, "nonce-next")
                    .set_body_json(json!({
                        "access_token": "token-abc",
                        "token_type": "DPoP",
                        "expires_in": 3600
                    })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/protected"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let session = session();
        session
            .login(&format!("{}/token", server.uri()), "demo", "password")
            .await
            .unwrap();
        session
            .fetch_protected(&format!("{}/protected", server.uri()))
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(proof_of(&requests[1]).claims.nonce.as_deref(), Some("nonce-next"));
    }

    #[tokio::test]
    async fn test_nonce_not_shared_across_origins() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let auth_server = MockServer::start().await;
        let resource_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(DPOP_NONCE_HEADER, "auth-nonce")
                    .set_body_json(json!({
                        "access_token": "token-abc",
                        "token_type": "DPoP",
                        "expires_in": 3600
                    })),
            )
            .mount(&auth_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/protected"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&resource_server)
            .await;

        let session = session();
        session
            .login(&format!("{}/token", auth_server.uri()), "demo", "password")
            .await
            .unwrap();
        session
            .fetch_protected(&format!("{}/protected", resource_server.uri()))
            .await
            .unwrap();

        let requests = resource_server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(proof_of(&requests[0]).claims.nonce, None);
    }

    #[tokio::test]
    async fn test_logout_forgets_token_keeps_key() {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return;
        }
        let server = MockServer::start().await;
        mount_token_endpoint(&server, "DPoP").await;

        let session = session();
        session
            .login(&format!("{}/token", server.uri()), "demo", "password")
            .await
            .unwrap();
        let thumbprint = session.issuer().vault().thumbprint().await.unwrap();

        session.logout().await;

        assert!(session.access_token().await.is_none());
        let result = session
            .fetch_protected(&format!("{}/protected", server.uri()))
            .await;
        assert!(matches!(result, Err(SessionError::NotLoggedIn)));
        assert_eq!(session.issuer().vault().thumbprint().await.unwrap(), thumbprint);
    }

    #[test]
    fn test_token_debug_redacts_access_token() {
        let token = TokenResponse {
            access_token: "secret-token".to_string(),
            token_type: "DPoP".to_string(),
            expires_in: Some(3600),
        };

        let debug = format!("{:?}", token);
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("<redacted>"));
    }
}
