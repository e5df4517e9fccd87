//! Signing key material.
//!
//! The secret is configured as standard base64 (RFC 4648, padded). It is
//! decoded once at startup into a buffer that is wiped once the HMAC keys
//! are built. The keys themselves hold their own copy for the life of the
//! process.

use base64ct::{Base64, Encoding};
use jsonwebtoken::{DecodingKey, EncodingKey};
use zeroize::Zeroizing;

use crate::error::ConfigurationError;

/// HS512 keys shorter than the SHA-512 output are refused.
pub const MIN_KEY_LENGTH: usize = 64;

/// Symmetric key shared by issuance and validation.
#[derive(Clone)]
pub struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
    length: usize,
}

impl SigningKey {
    /// Decode a base64 secret into a [`SigningKey`].
    pub fn load(secret: &str) -> Result<Self, ConfigurationError> {
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(ConfigurationError::EmptySecret);
        }

        let bytes = Zeroizing::new(
            Base64::decode_vec(secret)
                .map_err(|_| ConfigurationError::InvalidEncoding)?,
        );

        Self::from_bytes(&bytes)
    }

    /// Build a key from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigurationError> {
        if bytes.is_empty() {
            return Err(ConfigurationError::EmptySecret);
        }
        if bytes.len() < MIN_KEY_LENGTH {
            return Err(ConfigurationError::WeakKey {
                value: bytes.len(),
                expected: MIN_KEY_LENGTH,
            });
        }

        Ok(Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
            length: bytes.len(),
        })
    }

    /// Key length in bytes.
    pub fn len(&self) -> usize {
        self.length
    }

    pub(crate) fn encoding(&self) -> &EncodingKey {
        &self.encoding
    }

    pub(crate) fn decoding(&self) -> &DecodingKey {
        &self.decoding
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}
