//! # WISP Files
//!
//! File transfer engine for the WISP protocol.
//!
//! This crate provides:
//! - Fixed-size chunk splitting of an (already encrypted) payload
//! - A reassembly store that buffers out-of-order chunks per transfer
//! - The receive-side transfer state machine

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod chunker;
pub mod error;
pub mod reassembly;
pub mod transfer;

pub use chunker::FileChunker;
pub use error::FilesError;
pub use reassembly::{AssembledFile, ReassemblyStore};
pub use transfer::TransferState;

/// Default chunk size (16 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;

/// Transfer identifier (short random hex string)
pub type TransferId = String;
