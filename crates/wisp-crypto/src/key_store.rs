//! Per-peer symmetric key registry.
//!
//! Holds at most one current key per peer identifier. Storing a key for a
//! peer replaces whatever was bound before; there is no versioning and
//! nothing is persisted.
//!
//! Entries live in a `DashMap`, so handlers for different peers never
//! contend and concurrent updates for the same peer are serialized.

use crate::{CryptoError, CryptoProvider, SymmetricKey};
use dashmap::DashMap;
use std::sync::Arc;

/// Registry of the current symmetric key for each peer.
pub struct KeyStore {
    provider: Arc<dyn CryptoProvider>,
    keys: DashMap<String, SymmetricKey>,
}

impl KeyStore {
    /// Create an empty key store backed by `provider`.
    pub fn new(provider: Arc<dyn CryptoProvider>) -> Self {
        Self {
            provider,
            keys: DashMap::new(),
        }
    }

    /// Crypto provider used for key generation and (de)serialization.
    pub fn provider(&self) -> &Arc<dyn CryptoProvider> {
        &self.provider
    }

    /// Generate a fresh key. Does not touch the registry.
    ///
    /// # Errors
    ///
    /// Propagates provider failures.
    pub fn generate_key(&self) -> Result<SymmetricKey, CryptoError> {
        self.provider.generate_key()
    }

    /// Serialize key material for transmission.
    pub fn export_key(&self, key: &SymmetricKey) -> Vec<u8> {
        self.provider.export_key(key)
    }

    /// Deserialize key material received from a peer.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyLength` if the length does not match a raw key.
    pub fn import_key(&self, bytes: &[u8]) -> Result<SymmetricKey, CryptoError> {
        self.provider.import_key(bytes)
    }

    /// Bind `key` to `peer_id`, replacing any previous binding.
    pub fn store_key_for_peer(&self, peer_id: &str, key: SymmetricKey) {
        if self.keys.insert(peer_id.to_string(), key).is_some() {
            tracing::debug!("Replaced key for peer {}", peer_id);
        } else {
            tracing::debug!("Stored key for peer {}", peer_id);
        }
    }

    /// Current key for `peer_id`, if any.
    pub fn get_key_for_peer(&self, peer_id: &str) -> Option<SymmetricKey> {
        self.keys.get(peer_id).map(|entry| entry.value().clone())
    }

    /// Drop the key bound to `peer_id`.
    pub fn remove_key_for_peer(&self, peer_id: &str) -> Option<SymmetricKey> {
        self.keys.remove(peer_id).map(|(_, key)| key)
    }

    /// Number of peers with a bound key.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if no keys are stored.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
