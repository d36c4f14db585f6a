//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD encryption failed
    #[error("encryption failed")]
    EncryptionFailed,

    /// AEAD decryption failed (authentication failure)
    #[error("decryption failed: authentication failure")]
    DecryptionFailed,

    /// Invalid key length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Random number generation failed
    #[error("random number generation failed")]
    RandomFailed,
}

impl CryptoError {
    /// Returns true if the error came from malformed key material
    #[must_use]
    pub fn is_key_format(&self) -> bool {
        matches!(self, CryptoError::InvalidKeyLength { .. })
    }

    /// Returns true if the error is an AEAD authentication failure
    #[must_use]
    pub fn is_authentication(&self) -> bool {
        matches!(self, CryptoError::DecryptionFailed)
    }
}
