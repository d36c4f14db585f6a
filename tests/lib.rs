//! Shared fixtures for WISP integration tests

pub mod fixtures;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// Deterministic pseudo-random payload of `len` bytes
pub fn payload(len: usize, seed: u64) -> Vec<u8> {
    let mut data = vec![0u8; len];
    StdRng::seed_from_u64(seed).fill_bytes(&mut data);
    data
}
