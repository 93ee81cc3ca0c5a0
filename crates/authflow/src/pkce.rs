//! PKCE (Proof Key for Code Exchange) implementation for OAuth 2.0
//!
//! Implements RFC 7636 for secure authorization without client secrets.
//! Randomness comes from the operating system's CSPRNG only; if that source
//! is unavailable, generation fails loudly rather than falling back to a
//! non-cryptographic generator.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Number of random bytes backing the code verifier (86 chars base64url,
/// within the RFC 7636 43-128 limit).
const VERIFIER_BYTES: usize = 64;

/// Number of random bytes backing the anti-replay `state` nonce.
pub const STATE_NONCE_BYTES: usize = 16;

/// Error type for PKCE generation
#[derive(Debug)]
pub enum PkceError {
    /// The host's secure-random source failed or is unavailable
    EntropyUnavailable(String),
}

impl std::fmt::Display for PkceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EntropyUnavailable(e) => write!(f, "Secure randomness unavailable: {e}"),
        }
    }
}

impl std::error::Error for PkceError {}

/// base64url-encode without padding (`+` -> `-`, `/` -> `_`)
#[must_use]
pub fn base64url_encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

fn secure_random_bytes(len: usize) -> Result<Vec<u8>, PkceError> {
    let mut buf = vec![0u8; len];
    OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|e| PkceError::EntropyUnavailable(e.to_string()))?;
    Ok(buf)
}

/// Generate a base64url-encoded nonce from `len_bytes` secure-random bytes
///
/// Used for the anti-replay `state` parameter (16 bytes in this design).
///
/// # Errors
/// Returns [`PkceError::EntropyUnavailable`] if the OS randomness source
/// fails.
pub fn random_nonce(len_bytes: usize) -> Result<String, PkceError> {
    Ok(base64url_encode(&secure_random_bytes(len_bytes)?))
}

/// Compute the code challenge for a verifier
///
/// Per RFC 7636 the challenge is BASE64URL(SHA-256(ASCII(code_verifier))):
/// the digest is taken over the UTF-8 bytes of the already-encoded verifier
/// string, not over the raw random bytes behind it.
#[must_use]
pub fn challenge_for(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    base64url_encode(&hasher.finalize())
}

/// PKCE verifier/challenge pair for one authorization attempt
///
/// The verifier stays secret until the token exchange; the challenge is sent
/// in the authorization request.
#[derive(Debug, Clone)]
pub struct PkcePair {
    /// Random string (86 chars base64url), kept until token exchange
    pub code_verifier: String,

    /// base64url(SHA-256(code_verifier)), sent in the authorization request
    pub code_challenge: String,

    /// Creation time, epoch millis
    pub created_at: i64,
}

impl PkcePair {
    /// Generate a new pair from 64 cryptographically secure random bytes
    ///
    /// # Errors
    /// Returns [`PkceError::EntropyUnavailable`] if the OS randomness source
    /// fails; the login attempt must abort in that case.
    pub fn generate() -> Result<Self, PkceError> {
        let code_verifier = base64url_encode(&secure_random_bytes(VERIFIER_BYTES)?);
        let code_challenge = challenge_for(&code_verifier);

        Ok(Self { code_verifier, code_challenge, created_at: Utc::now().timestamp_millis() })
    }

    /// Get the challenge method (always "S256" for SHA-256)
    #[must_use]
    pub fn challenge_method(&self) -> &str {
        "S256"
    }
}
