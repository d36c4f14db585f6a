//! `AES-256-GCM` AEAD encryption.
//!
//! Provides authenticated encryption for whole-file payloads:
//! - 256-bit keys
//! - 96-bit nonces, drawn fresh for every encryption
//! - 128-bit authentication tags appended to the ciphertext
//!
//! The protocol engine only talks to the [`CryptoProvider`] trait, so tests
//! and alternative backends can be swapped in without touching the engine.
//!
//! ## Usage
//!
//! ```
//! use wisp_crypto::{AesGcmProvider, CryptoProvider};
//!
//! let provider = AesGcmProvider::new();
//! let key = provider.generate_key().unwrap();
//! let nonce = provider.generate_nonce().unwrap();
//!
//! let ciphertext = provider.encrypt(&key, &nonce, b"secret").unwrap();
//! let plaintext = provider.decrypt(&key, &nonce, &ciphertext).unwrap();
//! assert_eq!(plaintext, b"secret");
//! ```

use crate::{CryptoError, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
use aes_gcm::{
    Aes256Gcm, Key,
    aead::{Aead, KeyInit},
};
use rand_core::{OsRng, RngCore};
use std::fmt;
use zeroize::ZeroizeOnDrop;

/// AES-GCM nonce (12 bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    /// Create a nonce from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

/// Symmetric AES-256-GCM key.
///
/// Key material is zeroized on drop and never printed.
#[derive(Clone, PartialEq, Eq, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_SIZE]);

impl SymmetricKey {
    /// Create a key from raw bytes.
    #[must_use]
    pub fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from slice.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyLength` if slice length is not 32 bytes.
    pub fn from_slice(slice: &[u8]) -> Result<Self, CryptoError> {
        if slice.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: slice.len(),
            });
        }
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Get raw key bytes.
    ///
    /// # Security
    ///
    /// Handle with extreme care - this exposes the raw key material.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0))
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

/// Symmetric AEAD primitive consumed by the protocol engine.
///
/// Implementations must be safe to share across connection handlers.
pub trait CryptoProvider: Send + Sync {
    /// Generate a fresh symmetric key.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::RandomFailed` if no randomness is available.
    fn generate_key(&self) -> Result<SymmetricKey, CryptoError>;

    /// Serialize key material for transmission.
    fn export_key(&self, key: &SymmetricKey) -> Vec<u8>;

    /// Deserialize key material received from a peer.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyLength` if `bytes` is not a raw key.
    fn import_key(&self, bytes: &[u8]) -> Result<SymmetricKey, CryptoError>;

    /// Draw a fresh nonce for a single encryption.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::RandomFailed` if no randomness is available.
    fn generate_nonce(&self) -> Result<Nonce, CryptoError>;

    /// Encrypt `plaintext`, returning ciphertext with the tag appended.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::EncryptionFailed` if AEAD encryption fails.
    fn encrypt(
        &self,
        key: &SymmetricKey,
        nonce: &Nonce,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    /// Decrypt and authenticate `ciphertext`.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::DecryptionFailed` on authentication failure.
    fn decrypt(
        &self,
        key: &SymmetricKey,
        nonce: &Nonce,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;
}

/// `AES-256-GCM` provider backed by the OS CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct AesGcmProvider;

impl AesGcmProvider {
    /// Create a new provider.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl CryptoProvider for AesGcmProvider {
    fn generate_key(&self) -> Result<SymmetricKey, CryptoError> {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|_| CryptoError::RandomFailed)?;
        Ok(SymmetricKey::new(bytes))
    }

    fn export_key(&self, key: &SymmetricKey) -> Vec<u8> {
        key.as_bytes().to_vec()
    }

    fn import_key(&self, bytes: &[u8]) -> Result<SymmetricKey, CryptoError> {
        SymmetricKey::from_slice(bytes)
    }

    fn generate_nonce(&self) -> Result<Nonce, CryptoError> {
        crate::random::random_12().map(Nonce::from_bytes)
    }

    fn encrypt(
        &self,
        key: &SymmetricKey,
        nonce: &Nonce,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        key.cipher()
            .encrypt(aes_gcm::Nonce::from_slice(nonce.as_bytes()), plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)
    }

    fn decrypt(
        &self,
        key: &SymmetricKey,
        nonce: &Nonce,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < TAG_SIZE {
            return Err(CryptoError::DecryptionFailed);
        }

        key.cipher()
            .decrypt(aes_gcm::Nonce::from_slice(nonce.as_bytes()), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}
