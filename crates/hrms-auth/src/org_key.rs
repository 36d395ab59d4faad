//! Organization key encryption.
//!
//! The org key is stored encrypted under the `org_token` key and decrypted
//! on every request to fill the `X-Organization-Key` header.
//!
//! Format: `base64(nonce[12] || ciphertext)` with ChaCha20-Poly1305 and a
//! key of `sha256(secret)`.

use base64::Engine;
use chacha20poly1305::{aead::Aead, ChaCha20Poly1305, Key, KeyInit, Nonce};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::{Error, ErrorKind, Result};

/// Nonce length for ChaCha20-Poly1305 (12 bytes)
pub const NONCE_LEN: usize = 12;

/// Encrypts and decrypts the stored organization key.
#[derive(Clone)]
pub struct OrgKeyCipher {
    cipher: ChaCha20Poly1305,
}

impl std::fmt::Debug for OrgKeyCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrgKeyCipher").finish_non_exhaustive()
    }
}

impl OrgKeyCipher {
    /// Derive the cipher from a shared secret.
    pub fn new(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let key = Key::from_slice(digest.as_slice());
        Self {
            cipher: ChaCha20Poly1305::new(key),
        }
    }

    /// Encrypt an org key into its stored form.
    pub fn encrypt(&self, org_key: &str) -> Result<String> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), org_key.as_bytes())
            .map_err(|e| Error::new(ErrorKind::Crypto(format!("Encryption failed: {e}"))))?;

        let mut token = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        token.extend_from_slice(&nonce);
        token.extend_from_slice(&ciphertext);
        Ok(base64::engine::general_purpose::STANDARD.encode(token))
    }

    /// Decrypt a stored org token.
    pub fn decrypt(&self, token: &str) -> Result<String> {
        let raw = base64::engine::general_purpose::STANDARD.decode(token.trim())?;
        if raw.len() <= NONCE_LEN {
            return Err(Error::new(ErrorKind::Crypto(
                "Org token too short".to_string(),
            )));
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::new(ErrorKind::Crypto("Org token does not decrypt".to_string())))?;

        String::from_utf8(plaintext)
            .map_err(|e| Error::with_source(ErrorKind::Crypto("Org key is not UTF-8".to_string()), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_then_decrypt() {
        let cipher = OrgKeyCipher::new("shared-secret");
        let token = cipher.encrypt("org-4821").unwrap();
        assert_ne!(token, "org-4821");
        assert_eq!(cipher.decrypt(&token).unwrap(), "org-4821");
    }

    #[test]
    fn test_nonce_makes_tokens_differ() {
        let cipher = OrgKeyCipher::new("shared-secret");
        assert_ne!(cipher.encrypt("k").unwrap(), cipher.encrypt("k").unwrap());
    }

    #[test]
    fn test_wrong_secret_fails() {
        let token = OrgKeyCipher::new("a").encrypt("org-1").unwrap();
        let err = OrgKeyCipher::new("b").decrypt(&token).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Crypto(_)));
    }

    #[test]
    fn test_garbage_fails() {
        let cipher = OrgKeyCipher::new("s");
        assert!(cipher.decrypt("not base64 !!").is_err());
        assert!(cipher.decrypt("c2hvcnQ=").is_err());
    }
}
