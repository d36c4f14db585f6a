//! # WISP Crypto
//!
//! Cryptographic primitives for the WISP transfer protocol.
//!
//! This crate provides:
//! - The [`CryptoProvider`] seam the protocol engine encrypts through
//! - An `AES-256-GCM` implementation of it ([`AesGcmProvider`])
//! - The per-peer symmetric [`KeyStore`]
//! - Secure random number generation
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm | Size |
//! |----------|-----------|------|
//! | AEAD | AES-256-GCM | 256-bit key |
//! | Nonce | random | 96-bit |
//! | Tag | GHASH | 128-bit |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod aead;
pub mod error;
pub mod key_store;
pub mod random;

pub use aead::{AesGcmProvider, CryptoProvider, Nonce, SymmetricKey};
pub use error::CryptoError;
pub use key_store::KeyStore;

/// AES-256-GCM key size
pub const KEY_SIZE: usize = 32;

/// AES-GCM nonce size
pub const NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag size
pub const TAG_SIZE: usize = 16;
