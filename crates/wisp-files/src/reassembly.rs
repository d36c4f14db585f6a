//! Per-transfer chunk buffering and completion detection.
//!
//! Chunks may arrive in any order. Each transfer keeps a map from chunk index
//! to bytes; a transfer is complete once the number of distinct indices equals
//! the declared total. Assembly concatenates indices `0..total` and frees the
//! transfer.
//!
//! # Example
//!
//! ```
//! use wisp_files::ReassemblyStore;
//!
//! let store = ReassemblyStore::new();
//! store.init_transfer("t1", "notes.txt", "text/plain", 2).unwrap();
//!
//! assert!(!store.add_chunk("t1", 1, b"world".to_vec()));
//! assert!(store.add_chunk("t1", 0, b"hello ".to_vec()));
//!
//! let file = store.assemble("t1").unwrap();
//! assert_eq!(file.data, b"hello world");
//! assert!(!store.is_complete("t1"));
//! ```

use crate::error::FilesError;
use crate::transfer::TransferState;
use crate::TransferId;
use dashmap::DashMap;
use std::collections::HashMap;

/// Buffered state of one inbound transfer
#[derive(Debug)]
struct ChunkedTransfer {
    file_name: String,
    mime_type: String,
    total_chunks: u64,
    received: HashMap<u64, Vec<u8>>,
}

impl ChunkedTransfer {
    fn received_count(&self) -> u64 {
        self.received.len() as u64
    }

    fn is_complete(&self) -> bool {
        self.received_count() == self.total_chunks
    }
}

/// A fully reassembled payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledFile {
    /// File name announced in the metadata
    pub file_name: String,
    /// MIME type announced in the metadata
    pub mime_type: String,
    /// Concatenated chunk bytes in index order
    pub data: Vec<u8>,
}

/// Store of in-flight inbound transfers keyed by transfer id
#[derive(Debug, Default)]
pub struct ReassemblyStore {
    transfers: DashMap<TransferId, ChunkedTransfer>,
}

impl ReassemblyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new transfer
    ///
    /// An existing transfer with the same id is silently replaced; callers
    /// are expected to use fresh ids.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::InvalidChunkCount`] if `total_chunks` is zero.
    pub fn init_transfer(
        &self,
        transfer_id: &str,
        file_name: &str,
        mime_type: &str,
        total_chunks: u64,
    ) -> Result<(), FilesError> {
        if total_chunks == 0 {
            return Err(FilesError::InvalidChunkCount(total_chunks));
        }

        let previous = self.transfers.insert(
            transfer_id.to_string(),
            ChunkedTransfer {
                file_name: file_name.to_string(),
                mime_type: mime_type.to_string(),
                total_chunks,
                received: HashMap::new(),
            },
        );

        if previous.is_some() {
            tracing::warn!("Transfer {} re-initialized, buffered chunks dropped", transfer_id);
        }

        tracing::debug!(
            "Initialized transfer {} for {} ({} chunks)",
            transfer_id,
            file_name,
            total_chunks
        );

        Ok(())
    }

    /// Buffer one chunk
    ///
    /// Returns `true` iff the transfer is complete after this insertion.
    /// Chunks for unknown transfers or with an out-of-range index are
    /// rejected by returning `false`. Re-adding an index replaces its bytes
    /// without changing the received count.
    pub fn add_chunk(&self, transfer_id: &str, index: u64, data: Vec<u8>) -> bool {
        let Some(mut transfer) = self.transfers.get_mut(transfer_id) else {
            tracing::debug!("Dropping chunk {} for unknown transfer {}", index, transfer_id);
            return false;
        };

        if index >= transfer.total_chunks {
            tracing::warn!(
                "Dropping chunk {} for transfer {}: index out of range (total {})",
                index,
                transfer_id,
                transfer.total_chunks
            );
            return false;
        }

        if transfer.received.insert(index, data).is_some() {
            tracing::trace!("Replaced duplicate chunk {} for transfer {}", index, transfer_id);
        }

        transfer.is_complete()
    }

    /// Returns true if every declared chunk of a known transfer has arrived
    pub fn is_complete(&self, transfer_id: &str) -> bool {
        self.transfers
            .get(transfer_id)
            .is_some_and(|transfer| transfer.is_complete())
    }

    /// Current state of a transfer
    ///
    /// Ids that were never announced, or that have already been assembled or
    /// cleaned up, report [`TransferState::AwaitingMetadata`]: only a fresh
    /// metadata message can move them forward again.
    pub fn state(&self, transfer_id: &str) -> TransferState {
        self.transfers
            .get(transfer_id)
            .map_or(TransferState::AwaitingMetadata, |transfer| {
                TransferState::from_counts(transfer.received_count(), transfer.total_chunks)
            })
    }

    /// `(received, total)` chunk counts of a known transfer
    pub fn progress(&self, transfer_id: &str) -> Option<(u64, u64)> {
        self.transfers
            .get(transfer_id)
            .map(|transfer| (transfer.received_count(), transfer.total_chunks))
    }

    /// Concatenate all chunks in index order and free the transfer
    ///
    /// # Errors
    ///
    /// - [`FilesError::UnknownTransfer`] if the id is not registered
    /// - [`FilesError::MissingChunk`] if any index in `[0, total)` is absent;
    ///   the transfer stays registered so the caller can decide to clean up
    pub fn assemble(&self, transfer_id: &str) -> Result<AssembledFile, FilesError> {
        {
            let transfer = self
                .transfers
                .get(transfer_id)
                .ok_or_else(|| FilesError::UnknownTransfer(transfer_id.to_string()))?;

            if let Some(index) = (0..transfer.total_chunks).find(|i| !transfer.received.contains_key(i)) {
                tracing::error!("Missing chunk {} for transfer {}", index, transfer_id);
                return Err(FilesError::MissingChunk {
                    transfer_id: transfer_id.to_string(),
                    index,
                });
            }
        }

        let (_, mut transfer) = self
            .transfers
            .remove(transfer_id)
            .ok_or_else(|| FilesError::UnknownTransfer(transfer_id.to_string()))?;

        let size: usize = transfer.received.values().map(Vec::len).sum();
        let mut data = Vec::with_capacity(size);
        for index in 0..transfer.total_chunks {
            let chunk = transfer
                .received
                .remove(&index)
                .ok_or_else(|| FilesError::MissingChunk {
                    transfer_id: transfer_id.to_string(),
                    index,
                })?;
            data.extend_from_slice(&chunk);
        }

        tracing::debug!(
            "Assembled transfer {} ({} chunks, {} bytes)",
            transfer_id,
            transfer.total_chunks,
            data.len()
        );

        Ok(AssembledFile {
            file_name: transfer.file_name,
            mime_type: transfer.mime_type,
            data,
        })
    }

    /// Evict a transfer, e.g. when its connection closed mid-transfer
    ///
    /// Returns `true` if something was removed.
    pub fn cleanup(&self, transfer_id: &str) -> bool {
        let removed = self.transfers.remove(transfer_id).is_some();
        if removed {
            tracing::debug!("Cleaned up transfer {}", transfer_id);
        }
        removed
    }

    /// Number of in-flight transfers
    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    /// Returns true if no transfers are buffered
    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(total: u64) -> ReassemblyStore {
        let store = ReassemblyStore::new();
        store
            .init_transfer("t1", "file.bin", "application/octet-stream", total)
            .unwrap();
        store
    }

    #[test]
    fn test_init_rejects_zero_chunks() {
        let store = ReassemblyStore::new();
        assert_eq!(
            store.init_transfer("t1", "f", "m", 0),
            Err(FilesError::InvalidChunkCount(0))
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_add_chunk_unknown_transfer() {
        let store = ReassemblyStore::new();
        assert!(!store.add_chunk("nope", 0, vec![1]));
        assert!(store.is_empty());
    }

    #[test]
    fn test_add_chunk_out_of_range() {
        let store = store_with(2);
        assert!(!store.add_chunk("t1", 2, vec![1]));
        assert_eq!(store.progress("t1"), Some((0, 2)));
    }

    #[test]
    fn test_completion_flag() {
        let store = store_with(3);
        assert!(!store.add_chunk("t1", 0, vec![0]));
        assert!(!store.add_chunk("t1", 1, vec![1]));
        assert!(store.add_chunk("t1", 2, vec![2]));
        assert!(store.is_complete("t1"));
    }

    #[test]
    fn test_duplicate_chunk_is_idempotent() {
        let store = store_with(2);
        assert!(!store.add_chunk("t1", 0, vec![0xAA]));
        assert!(!store.add_chunk("t1", 0, vec![0xAA]));
        assert_eq!(store.progress("t1"), Some((1, 2)));

        assert!(store.add_chunk("t1", 1, vec![0xBB]));
        assert_eq!(store.assemble("t1").unwrap().data, vec![0xAA, 0xBB]);
    }

    #[test]
    fn test_out_of_order_assembly() {
        let store = store_with(4);
        for index in [3u64, 1, 2, 0] {
            store.add_chunk("t1", index, vec![index as u8; 2]);
        }

        let file = store.assemble("t1").unwrap();
        assert_eq!(file.data, vec![0, 0, 1, 1, 2, 2, 3, 3]);
        assert_eq!(file.file_name, "file.bin");
        assert_eq!(file.mime_type, "application/octet-stream");
    }

    #[test]
    fn test_assemble_missing_chunk() {
        let store = store_with(3);
        store.add_chunk("t1", 0, vec![0]);
        store.add_chunk("t1", 2, vec![2]);

        assert_eq!(
            store.assemble("t1"),
            Err(FilesError::MissingChunk {
                transfer_id: "t1".to_string(),
                index: 1
            })
        );
        // Still registered after a failed assembly
        assert_eq!(store.progress("t1"), Some((2, 3)));
    }

    #[test]
    fn test_assemble_is_single_consumption() {
        let store = store_with(1);
        store.add_chunk("t1", 0, vec![9]);

        assert!(store.assemble("t1").is_ok());
        assert_eq!(
            store.assemble("t1"),
            Err(FilesError::UnknownTransfer("t1".to_string()))
        );
        assert!(!store.is_complete("t1"));
    }

    #[test]
    fn test_cleanup() {
        let store = store_with(4);
        store.add_chunk("t1", 0, vec![0]);
        store.add_chunk("t1", 1, vec![1]);

        assert!(store.cleanup("t1"));
        assert!(!store.cleanup("t1"));
        assert!(!store.is_complete("t1"));
        assert_eq!(store.state("t1"), TransferState::AwaitingMetadata);
    }

    #[test]
    fn test_state_transitions() {
        let store = ReassemblyStore::new();
        assert_eq!(store.state("t1"), TransferState::AwaitingMetadata);

        store.init_transfer("t1", "f", "m", 2).unwrap();
        assert_eq!(store.state("t1"), TransferState::Receiving);

        store.add_chunk("t1", 0, vec![0]);
        assert_eq!(store.state("t1"), TransferState::Receiving);

        store.add_chunk("t1", 1, vec![1]);
        assert_eq!(store.state("t1"), TransferState::Complete);
    }

    #[test]
    fn test_reinit_replaces_transfer() {
        let store = store_with(2);
        store.add_chunk("t1", 0, vec![0]);

        store.init_transfer("t1", "other.bin", "text/plain", 5).unwrap();
        assert_eq!(store.progress("t1"), Some((0, 5)));
        assert_eq!(store.len(), 1);
    }
}
