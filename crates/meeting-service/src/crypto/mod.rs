//! Opaque meeting tokens.
//!
//! A token is `nonce (12 bytes) || ciphertext || tag (16 bytes)` produced by
//! AES-256-GCM, rendered as URL-safe base64 without padding. The key is a
//! single SHA3-256 pass over the operator secret.
//!
//! Tokens are stateless: nothing is stored server-side, validity is re-derived
//! from the cipher on every redemption.
//!
//! # Security
//!
//! - A fresh 96-bit nonce is drawn from the system CSPRNG for every token
//! - Any modification of the token bytes fails GCM authentication
//! - [`TokenError::Malformed`] and [`TokenError::Invalid`] exist for
//!   diagnostics only; the service layer collapses them before responding

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use common::secret::{ExposeSecret, SecretBox, SecretString};
use ring::{
    aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN},
    rand::{SecureRandom, SystemRandom},
};
use sha3::{Digest, Sha3_256};
use std::fmt;
use thiserror::Error;
use tracing::instrument;

/// Symmetric key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// Authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Token nonce length in bytes.
pub const TOKEN_NONCE_LEN: usize = NONCE_LEN;

/// Token cipher failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Structurally invalid input: bad base64 or too short to hold a nonce.
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// Well-formed but failed authentication (wrong key, corrupted or altered bytes).
    #[error("Token failed authentication")]
    Invalid,

    /// Key setup or entropy failure.
    #[error("Cryptographic error: {0}")]
    Crypto(String),
}

/// Stretch an arbitrary-length secret into an AES-256 key.
pub fn derive_key(secret: &[u8]) -> SecretBox<[u8; KEY_LEN]> {
    let key: [u8; KEY_LEN] = Sha3_256::digest(secret).into();
    SecretBox::new(Box::new(key))
}

/// Render raw token bytes as URL-safe base64.
pub fn encode_token(raw: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(raw)
}

/// Parse the textual token layer back into raw bytes.
///
/// Trailing `=` padding is tolerated so padded tokens issued by other
/// encoders still redeem.
pub fn decode_token(text: &str) -> Result<Vec<u8>, TokenError> {
    URL_SAFE_NO_PAD
        .decode(text.trim_end_matches('='))
        .map_err(|e| TokenError::Malformed(format!("invalid base64: {e}")))
}

/// Authenticated encryption of meeting identifiers into opaque tokens.
///
/// The key is immutable after construction; a single instance is shared
/// across all request tasks without locking.
pub struct TokenCipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCipher")
            .field("algorithm", &"AES-256-GCM")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl TokenCipher {
    /// Build a cipher from the operator secret.
    pub fn new(secret: &SecretString) -> Result<Self, TokenError> {
        Self::from_secret_bytes(secret.expose_secret().as_bytes())
    }

    /// Build a cipher from raw secret bytes of any length.
    pub fn from_secret_bytes(secret: &[u8]) -> Result<Self, TokenError> {
        let key = derive_key(secret);
        let unbound = UnboundKey::new(&AES_256_GCM, key.expose_secret())
            .map_err(|e| TokenError::Crypto(format!("Cipher key creation failed: {e}")))?;

        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Encrypt `plaintext` into raw token bytes (nonce prepended).
    #[instrument(skip_all, name = "meeting.crypto.encrypt")]
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, TokenError> {
        let mut nonce_bytes = [0u8; TOKEN_NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|e| TokenError::Crypto(format!("Nonce generation failed: {e}")))?;

        let mut sealed = plaintext.to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut sealed,
            )
            .map_err(|e| TokenError::Crypto(format!("Encryption operation failed: {e}")))?;

        let mut token = Vec::with_capacity(TOKEN_NONCE_LEN + sealed.len());
        token.extend_from_slice(&nonce_bytes);
        token.extend_from_slice(&sealed);
        Ok(token)
    }

    /// Decrypt raw token bytes produced by [`TokenCipher::encrypt`].
    #[instrument(skip_all, name = "meeting.crypto.decrypt")]
    pub fn decrypt(&self, token: &[u8]) -> Result<Vec<u8>, TokenError> {
        let (Some(nonce_bytes), Some(sealed)) =
            (token.get(..TOKEN_NONCE_LEN), token.get(TOKEN_NONCE_LEN..))
        else {
            return Err(TokenError::Malformed(format!(
                "expected at least {} bytes for nonce, got {}",
                TOKEN_NONCE_LEN,
                token.len()
            )));
        };

        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| TokenError::Malformed("invalid nonce".to_string()))?;

        let mut in_out = sealed.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| {
                tracing::debug!(target: "meeting.crypto", "Token authentication failed");
                TokenError::Invalid
            })?;

        Ok(plaintext.to_vec())
    }

    /// Issue the opaque textual token for a meeting identifier.
    pub fn issue(&self, meeting_id: &str) -> Result<String, TokenError> {
        self.encrypt(meeting_id.as_bytes())
            .map(|raw| encode_token(&raw))
    }

    /// Recover the meeting identifier behind a textual token.
    pub fn redeem(&self, token: &str) -> Result<String, TokenError> {
        let raw = decode_token(token)?;
        let plaintext = self.decrypt(&raw)?;
        String::from_utf8(plaintext)
            .map_err(|_| TokenError::Malformed("token payload is not an identifier".to_string()))
    }
}
