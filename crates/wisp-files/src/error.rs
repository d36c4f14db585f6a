//! Reassembly error types.

use thiserror::Error;

/// Errors raised by the reassembly store
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilesError {
    /// No transfer registered under this id
    #[error("unknown transfer: {0}")]
    UnknownTransfer(String),

    /// An index in `[0, total_chunks)` was never delivered
    #[error("missing chunk {index} for transfer {transfer_id}")]
    MissingChunk {
        /// Transfer id
        transfer_id: String,
        /// First missing chunk index
        index: u64,
    },

    /// A transfer must declare at least one chunk
    #[error("invalid chunk count {0} (must be at least 1)")]
    InvalidChunkCount(u64),
}
