//! HMAC-SHA256 signing/verification for VOC spider callback tokens (§4.5, §4.8).
//!
//! `JWT_SECRET_KEY` doubles as the HMAC key (§6). Only the hash of a callback
//! token is ever persisted; verification is constant-time so timing cannot leak
//! which prefix of a guessed token matched (§8 invariant 7).

use ring::hmac;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("secret key must not be empty")]
    EmptySecret,
}

/// Write-only wrapper for the HMAC secret. Never logged or serialized.
pub struct CallbackTokenSigner {
    key: Arc<hmac::Key>,
}

impl CallbackTokenSigner {
    pub fn from_bytes(secret: &[u8]) -> Result<Self, SignerError> {
        if secret.is_empty() {
            return Err(SignerError::EmptySecret);
        }
        Ok(Self {
            key: Arc::new(hmac::Key::new(hmac::HMAC_SHA256, secret)),
        })
    }

    /// `sha256_hex(hmac_sha256(key, token))` — the value stored as
    /// `callback_token_hash` (§3).
    pub fn hash_token(&self, token: &str) -> String {
        let tag = hmac::sign(&self.key, token.as_bytes());
        hex::encode(tag.as_ref())
    }

    /// Constant-time comparison of a presented token against the stored hash.
    pub fn verify(&self, token: &str, stored_hash_hex: &str) -> bool {
        let computed = self.hash_token(token);
        let (Ok(a), Ok(b)) = (hex::decode(&computed), hex::decode(stored_hash_hex)) else {
            return false;
        };
        if a.len() != b.len() {
            return false;
        }
        a.ct_eq(&b).into()
    }
}

impl std::fmt::Debug for CallbackTokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackTokenSigner").field("key", &"<redacted>").finish()
    }
}

impl Clone for CallbackTokenSigner {
    fn clone(&self) -> Self {
        Self { key: Arc::clone(&self.key) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_accepts_the_matching_token() {
        let signer = CallbackTokenSigner::from_bytes(b"test-secret").unwrap();
        let hash = signer.hash_token("opaque-token");
        assert!(signer.verify("opaque-token", &hash));
    }

    #[test]
    fn verify_rejects_wrong_token() {
        let signer = CallbackTokenSigner::from_bytes(b"test-secret").unwrap();
        let hash = signer.hash_token("opaque-token");
        assert!(!signer.verify("wrong-token", &hash));
    }

    #[test]
    fn debug_redacts_key() {
        let signer = CallbackTokenSigner::from_bytes(b"super-secret").unwrap();
        let out = format!("{signer:?}");
        assert!(out.contains("<redacted>"));
        assert!(!out.contains("super-secret"));
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(matches!(CallbackTokenSigner::from_bytes(b""), Err(SignerError::EmptySecret)));
    }
}
