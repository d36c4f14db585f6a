//! Wire messages.
//!
//! Every frame on a connection carries exactly one [`Message`], encoded with
//! `bincode`. A file transfer is the sequence
//!
//! ```text
//! KeyExchange ─┬─ File                                     (payload fits one chunk)
//!              └─ FileChunk::Metadata, FileChunk::Chunk*, FileComplete
//! ```

use crate::error::Result;
use bincode::Options;
use serde::{Deserialize, Serialize};
use std::fmt;
use wisp_crypto::NONCE_SIZE;
use wisp_files::TransferId;
use wisp_transport::MAX_FRAME_SIZE;

/// Message kind discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    /// Per-transfer key handed to the receiver
    KeyExchange,
    /// Whole file in one message
    File,
    /// Chunked transfer metadata or payload piece
    FileChunk,
    /// End of a chunked transfer
    FileComplete,
    /// Plain text
    Other,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyExchange => write!(f, "KEY_EXCHANGE"),
            Self::File => write!(f, "FILE"),
            Self::FileChunk => write!(f, "FILE_CHUNK"),
            Self::FileComplete => write!(f, "FILE_COMPLETE"),
            Self::Other => write!(f, "OTHER"),
        }
    }
}

/// Chunked transfer messages
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileChunk {
    /// Announces a chunked transfer; always precedes its chunks
    Metadata {
        /// Fresh random transfer id
        transfer_id: TransferId,
        /// Original file name
        file_name: String,
        /// MIME type
        file_type: String,
        /// Number of chunks that follow
        total_chunks: u64,
        /// Nonce the whole payload was encrypted under
        nonce: [u8; NONCE_SIZE],
    },
    /// One slice of the encrypted payload
    Chunk {
        /// Transfer this chunk belongs to
        transfer_id: TransferId,
        /// Zero-based index
        chunk_index: u64,
        /// Number of chunks in the transfer
        total_chunks: u64,
        /// Chunk bytes
        data: Vec<u8>,
    },
}

impl fmt::Debug for FileChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Metadata {
                transfer_id,
                file_name,
                total_chunks,
                ..
            } => f
                .debug_struct("Metadata")
                .field("transfer_id", transfer_id)
                .field("file_name", file_name)
                .field("total_chunks", total_chunks)
                .finish_non_exhaustive(),
            Self::Chunk {
                transfer_id,
                chunk_index,
                total_chunks,
                data,
            } => f
                .debug_struct("Chunk")
                .field("transfer_id", transfer_id)
                .field("chunk_index", chunk_index)
                .field("total_chunks", total_chunks)
                .field("len", &data.len())
                .finish(),
        }
    }
}

/// A protocol message
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Raw symmetric key for the transfer that follows
    KeyExchange {
        /// File the key is meant for
        file_name: String,
        /// Exported key bytes
        key: Vec<u8>,
    },
    /// A whole file in a single message
    File {
        /// File name
        file_name: String,
        /// MIME type
        file_type: String,
        /// Payload, ciphertext when `encrypted`
        data: Vec<u8>,
        /// Nonce, present when `encrypted`
        nonce: Option<[u8; NONCE_SIZE]>,
        /// Whether `data` is ciphertext
        encrypted: bool,
    },
    /// Chunked transfer traffic
    FileChunk(FileChunk),
    /// All chunks of the transfer have been sent
    FileComplete {
        /// Completed transfer
        transfer_id: TransferId,
    },
    /// Free-form text
    Other(String),
}

impl Message {
    /// Kind of this message
    pub fn data_type(&self) -> DataType {
        match self {
            Self::KeyExchange { .. } => DataType::KeyExchange,
            Self::File { .. } => DataType::File,
            Self::FileChunk(_) => DataType::FileChunk,
            Self::FileComplete { .. } => DataType::FileComplete,
            Self::Other(_) => DataType::Other,
        }
    }

    /// Encode for the wire
    ///
    /// # Errors
    ///
    /// Returns `NodeError::Serialization` if the message exceeds the frame
    /// limit.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(wire_options().serialize(self)?)
    }

    /// Decode a received frame
    ///
    /// # Errors
    ///
    /// Returns `NodeError::Serialization` for malformed or oversized input.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(wire_options().deserialize(bytes)?)
    }
}

fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_limit(MAX_FRAME_SIZE as u64)
        .reject_trailing_bytes()
}

// Key bytes and payloads stay out of logs
impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyExchange { file_name, .. } => f
                .debug_struct("KeyExchange")
                .field("file_name", file_name)
                .finish_non_exhaustive(),
            Self::File {
                file_name,
                file_type,
                data,
                encrypted,
                ..
            } => f
                .debug_struct("File")
                .field("file_name", file_name)
                .field("file_type", file_type)
                .field("len", &data.len())
                .field("encrypted", encrypted)
                .finish_non_exhaustive(),
            Self::FileChunk(chunk) => f.debug_tuple("FileChunk").field(chunk).finish(),
            Self::FileComplete { transfer_id } => f
                .debug_struct("FileComplete")
                .field("transfer_id", transfer_id)
                .finish(),
            Self::Other(text) => f.debug_tuple("Other").field(text).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NodeError;

    #[test]
    fn test_data_type() {
        let msg = Message::FileComplete {
            transfer_id: "t1".into(),
        };
        assert_eq!(msg.data_type(), DataType::FileComplete);
        assert_eq!(msg.data_type().to_string(), "FILE_COMPLETE");
        assert_eq!(Message::Other("hi".into()).data_type(), DataType::Other);
    }

    #[test]
    fn test_chunk_message_codec() {
        let msg = Message::FileChunk(FileChunk::Chunk {
            transfer_id: "0011223344556677".into(),
            chunk_index: 3,
            total_chunks: 4,
            data: vec![0xAB; 864],
        });

        let encoded = msg.encode().unwrap();
        assert_eq!(Message::decode(&encoded).unwrap(), msg);
    }

    #[test]
    fn test_metadata_carries_nonce() {
        let msg = Message::FileChunk(FileChunk::Metadata {
            transfer_id: "t1".into(),
            file_name: "a.bin".into(),
            file_type: "application/octet-stream".into(),
            total_chunks: 4,
            nonce: [7u8; NONCE_SIZE],
        });

        match Message::decode(&msg.encode().unwrap()).unwrap() {
            Message::FileChunk(FileChunk::Metadata { nonce, .. }) => assert_eq!(nonce, [7u8; 12]),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_decode_garbage() {
        let result = Message::decode(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert!(matches!(result, Err(NodeError::Serialization(_))));
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut encoded = Message::Other("hi".into()).encode().unwrap();
        encoded.push(0);
        assert!(Message::decode(&encoded).is_err());
    }

    #[test]
    fn test_debug_hides_key() {
        let msg = Message::KeyExchange {
            file_name: "a.txt".into(),
            key: vec![0x42; 32],
        };
        let debug = format!("{msg:?}");
        assert!(debug.contains("a.txt"));
        assert!(!debug.contains("66"));
    }
}
