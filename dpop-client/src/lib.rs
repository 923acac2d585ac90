//! dpop-client library
//!
//! Client-side DPoP (RFC 9449): a durable ES256 key vault, a proof issuer that
//! signs one proof per HTTP request, and a session client that binds access
//! tokens to the key.

pub mod config;
pub mod crypto;
pub mod error;
pub mod issuer;
pub mod session;
pub mod storage;
pub mod vault;

pub use config::ClientConfig;
pub use crypto::{decode_proof, DecodedProof, Proof};
pub use error::{DPoPError, ProofDecodeError};
pub use issuer::{ProofIssuer, ProofOptions};
pub use session::{DPoPSession, SessionError, TokenResponse};
pub use storage::{KeyStorage, StorageError};
pub use vault::KeyVault;
