//! Transfer protocol engine.
//!
//! Drives one file transfer over an open [`PeerConnection`] and interprets
//! inbound messages. Every transfer uses a fresh key, sent ahead of the data
//! in a `KeyExchange` message. The payload is encrypted once as a whole. It
//! goes out either as a single `File` message or, when the ciphertext is
//! larger than the chunk size, as
//! `Metadata → Chunk × n → FileComplete`.
//!
//! Decryption happens only after all chunks arrived, so a tampered chunk
//! fails authentication for the whole file.

use crate::config::TransferConfig;
use crate::error::{NodeError, Result};
use crate::message::{FileChunk, Message};
use crate::progress::{ProgressTracker, TransferProgress, TransferStatus};
use crate::session::PeerConnection;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use wisp_crypto::{random, KeyStore, Nonce, SymmetricKey};
use wisp_files::{FileChunker, ReassemblyStore, TransferId};
use wisp_transport::PeerId;

/// A file queued for sending
#[derive(Clone, PartialEq, Eq)]
pub struct OutgoingFile {
    /// File name shown to the receiver
    pub name: String,
    /// MIME type
    pub mime_type: String,
    /// Plaintext contents
    pub data: Vec<u8>,
}

impl OutgoingFile {
    /// Create a new outgoing file
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }
}

impl fmt::Debug for OutgoingFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutgoingFile")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

/// A file delivered by a peer, already decrypted
#[derive(Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    /// File name announced by the sender
    pub name: String,
    /// MIME type announced by the sender
    pub mime_type: String,
    /// Plaintext contents
    pub data: Vec<u8>,
}

impl fmt::Debug for ReceivedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceivedFile")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Outcome of handling one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveEvent {
    /// A chunked transfer was announced
    TransferStarted {
        /// Transfer id
        transfer_id: TransferId,
        /// Announced file name
        file_name: String,
        /// Announced chunk count
        total_chunks: u64,
    },
    /// A chunk was buffered
    ChunkReceived {
        /// Transfer id
        transfer_id: TransferId,
        /// Distinct chunks received so far
        received: u64,
        /// Announced chunk count
        total: u64,
    },
    /// A complete file is available
    FileReceived(ReceivedFile),
    /// Plain text message
    Message(String),
}

/// Receive-side bookkeeping for a chunked transfer
struct InboundTransfer {
    peer: PeerId,
    nonce: Nonce,
    // Key in force when the metadata arrived
    key: Option<SymmetricKey>,
}

/// Protocol engine shared by all connections of a session
pub struct TransferEngine {
    key_store: Arc<KeyStore>,
    reassembly: Arc<ReassemblyStore>,
    config: TransferConfig,
    inbound: DashMap<TransferId, InboundTransfer>,
}

impl TransferEngine {
    /// Create an engine over the injected stores
    ///
    /// # Errors
    ///
    /// Returns `NodeError::InvalidConfig` if `config` does not validate.
    pub fn new(
        key_store: Arc<KeyStore>,
        reassembly: Arc<ReassemblyStore>,
        config: TransferConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            key_store,
            reassembly,
            config,
            inbound: DashMap::new(),
        })
    }

    /// Key store used for per-peer keys
    pub fn key_store(&self) -> &Arc<KeyStore> {
        &self.key_store
    }

    /// Reassembly store used for inbound chunked transfers
    pub fn reassembly(&self) -> &Arc<ReassemblyStore> {
        &self.reassembly
    }

    /// Transfer settings
    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Number of inbound chunked transfers in flight
    pub fn inbound_transfers(&self) -> usize {
        self.inbound.len()
    }

    /// Send `file` over `conn`
    ///
    /// `progress` is called after every chunk and once more with 100 % after
    /// the final message went out. Only one send runs per connection at a
    /// time; a second call waits for the first to finish.
    ///
    /// # Errors
    ///
    /// - [`NodeError::ConnectionLost`] if the connection closes; the rest of
    ///   the sequence is abandoned and nothing is retried
    /// - crypto errors if key or nonce generation fails
    pub async fn send_file<F>(&self, conn: &PeerConnection, file: OutgoingFile, progress: F) -> Result<()>
    where
        F: Fn(&TransferProgress) + Send + Sync,
    {
        let _send_guard = conn.lock_send().await;
        let peer = conn.peer_id();
        let OutgoingFile {
            name,
            mime_type,
            data,
        } = file;

        let key = self.key_store.generate_key()?;
        self.key_store.store_key_for_peer(peer, key.clone());
        conn.send(&Message::KeyExchange {
            file_name: name.clone(),
            key: self.key_store.export_key(&key),
        })
        .await?;

        let provider = Arc::clone(self.key_store.provider());
        let nonce = provider.generate_nonce()?;
        let plaintext_len = data.len();
        let encrypted =
            tokio::task::spawn_blocking(move || provider.encrypt(&key, &nonce, &data)).await??;

        let total_bytes = encrypted.len() as u64;
        let chunker = FileChunker::with_chunk_size(self.config.chunk_size);

        if !chunker.needs_chunking(encrypted.len()) {
            let tracker = ProgressTracker::new(None, &name, total_bytes, 1);
            conn.send(&Message::File {
                file_name: name.clone(),
                file_type: mime_type,
                data: encrypted,
                nonce: Some(*nonce.as_bytes()),
                encrypted: true,
            })
            .await?;
            progress(&tracker.complete());

            tracing::info!(
                "Sent {} ({} bytes) to {} in a single message",
                name,
                plaintext_len,
                peer
            );
            return Ok(());
        }

        let transfer_id = new_transfer_id()?;
        let total_chunks = chunker.chunk_count(total_bytes);
        let tracker = ProgressTracker::new(Some(transfer_id.clone()), &name, total_bytes, total_chunks);

        tracing::debug!(
            "Starting chunked transfer {} of {} to {} ({} chunks)",
            transfer_id,
            name,
            peer,
            total_chunks
        );

        conn.send(&Message::FileChunk(FileChunk::Metadata {
            transfer_id: transfer_id.clone(),
            file_name: name.clone(),
            file_type: mime_type,
            total_chunks,
            nonce: *nonce.as_bytes(),
        }))
        .await?;

        let mut bytes_sent = 0u64;
        for (index, chunk) in chunker.split(&encrypted).enumerate() {
            let chunk_index = index as u64;
            conn.send(&Message::FileChunk(FileChunk::Chunk {
                transfer_id: transfer_id.clone(),
                chunk_index,
                total_chunks,
                data: chunk.to_vec(),
            }))
            .await?;

            bytes_sent += chunk.len() as u64;
            progress(&tracker.snapshot(TransferStatus::Sending, chunk_index + 1, bytes_sent));
            tracing::trace!("Sent chunk {}/{} of {}", chunk_index + 1, total_chunks, transfer_id);

            if !self.config.chunk_delay.is_zero() {
                tokio::time::sleep(self.config.chunk_delay).await;
            }
        }

        conn.send(&Message::FileComplete {
            transfer_id: transfer_id.clone(),
        })
        .await?;
        progress(&tracker.complete());

        tracing::info!(
            "Sent {} ({} bytes, {} chunks) to {}",
            name,
            plaintext_len,
            total_chunks,
            peer
        );
        Ok(())
    }

    /// Interpret one inbound message from `peer`
    ///
    /// Messages of one connection must be passed in arrival order.
    ///
    /// # Errors
    ///
    /// Errors are scoped to the message (or the transfer it completes); the
    /// connection stays usable:
    /// - [`NodeError::KeyFormat`] for malformed key material
    /// - [`NodeError::MissingKey`] if no key was exchanged
    /// - [`NodeError::Authentication`] if decryption fails
    /// - [`NodeError::MissingChunk`] / [`NodeError::UnknownTransfer`] on
    ///   completion of an incomplete or unknown transfer
    pub async fn handle_message(&self, peer: &str, message: Message) -> Result<Option<ReceiveEvent>> {
        tracing::trace!("Handling {} from {}", message.data_type(), peer);

        match message {
            Message::KeyExchange { file_name, key } => {
                let key = self
                    .key_store
                    .import_key(&key)
                    .map_err(|e| NodeError::from_crypto(e, peer))?;
                self.key_store.store_key_for_peer(peer, key);
                tracing::debug!("Stored key from {} for {}", peer, file_name);
                Ok(None)
            }

            Message::File {
                file_name,
                file_type,
                data,
                nonce,
                encrypted,
            } => {
                let data = if encrypted {
                    let key = self
                        .key_store
                        .get_key_for_peer(peer)
                        .ok_or_else(|| NodeError::MissingKey(peer.to_string()))?;
                    let nonce = nonce
                        .map(Nonce::from_bytes)
                        .ok_or_else(|| NodeError::Crypto("encrypted file without nonce".into()))?;
                    self.decrypt(peer, key, nonce, data).await?
                } else {
                    data
                };

                tracing::info!("Received {} ({} bytes) from {}", file_name, data.len(), peer);
                Ok(Some(ReceiveEvent::FileReceived(ReceivedFile {
                    name: file_name,
                    mime_type: file_type,
                    data,
                })))
            }

            Message::FileChunk(FileChunk::Metadata {
                transfer_id,
                file_name,
                file_type,
                total_chunks,
                nonce,
            }) => {
                if self
                    .inbound
                    .get(&transfer_id)
                    .is_some_and(|existing| existing.peer != peer)
                {
                    tracing::warn!("{} announced transfer {} owned by another peer", peer, transfer_id);
                    return Err(NodeError::invalid_state("transfer id in use by another peer"));
                }

                self.reassembly
                    .init_transfer(&transfer_id, &file_name, &file_type, total_chunks)?;
                self.inbound.insert(
                    transfer_id.clone(),
                    InboundTransfer {
                        peer: peer.to_string(),
                        nonce: Nonce::from_bytes(nonce),
                        key: self.key_store.get_key_for_peer(peer),
                    },
                );

                tracing::debug!(
                    "Receiving {} from {} as transfer {} ({} chunks)",
                    file_name,
                    peer,
                    transfer_id,
                    total_chunks
                );
                Ok(Some(ReceiveEvent::TransferStarted {
                    transfer_id,
                    file_name,
                    total_chunks,
                }))
            }

            Message::FileChunk(FileChunk::Chunk {
                transfer_id,
                chunk_index,
                data,
                ..
            }) => {
                let owned = self
                    .inbound
                    .get(&transfer_id)
                    .is_some_and(|transfer| transfer.peer == peer);
                if !owned {
                    tracing::warn!(
                        "Dropping chunk {} from {}: no transfer {} for this peer",
                        chunk_index,
                        peer,
                        transfer_id
                    );
                    return Ok(None);
                }

                if self.reassembly.add_chunk(&transfer_id, chunk_index, data) {
                    tracing::debug!("All chunks of transfer {} received", transfer_id);
                }

                Ok(self
                    .reassembly
                    .progress(&transfer_id)
                    .map(|(received, total)| ReceiveEvent::ChunkReceived {
                        transfer_id,
                        received,
                        total,
                    }))
            }

            Message::FileComplete { transfer_id } => {
                let file = self.complete_transfer(peer, &transfer_id).await?;
                Ok(Some(ReceiveEvent::FileReceived(file)))
            }

            Message::Other(text) => Ok(Some(ReceiveEvent::Message(text))),
        }
    }

    /// Abandon every in-flight transfer from `peer` and forget its key
    ///
    /// Returns the number of transfers cleaned up.
    pub fn handle_disconnect(&self, peer: &str) -> usize {
        let abandoned: Vec<TransferId> = self
            .inbound
            .iter()
            .filter(|entry| entry.value().peer == peer)
            .map(|entry| entry.key().clone())
            .collect();

        for transfer_id in &abandoned {
            self.inbound.remove(transfer_id);
            self.reassembly.cleanup(transfer_id);
            tracing::info!("Abandoned transfer {} from {}", transfer_id, peer);
        }

        if self.key_store.remove_key_for_peer(peer).is_some() {
            tracing::debug!("Dropped key for {}", peer);
        }

        abandoned.len()
    }

    async fn complete_transfer(&self, peer: &str, transfer_id: &str) -> Result<ReceivedFile> {
        let Some((_, inbound)) = self
            .inbound
            .remove_if(transfer_id, |_, transfer| transfer.peer == peer)
        else {
            tracing::warn!("{} completed unknown transfer {}", peer, transfer_id);
            return Err(NodeError::UnknownTransfer(transfer_id.to_string()));
        };

        let Some(key) = inbound.key.or_else(|| self.key_store.get_key_for_peer(peer)) else {
            self.reassembly.cleanup(transfer_id);
            return Err(NodeError::MissingKey(peer.to_string()));
        };

        let assembled = match self.reassembly.assemble(transfer_id) {
            Ok(assembled) => assembled,
            Err(e) => {
                self.reassembly.cleanup(transfer_id);
                return Err(e.into());
            }
        };

        let data = self.decrypt(peer, key, inbound.nonce, assembled.data).await?;

        tracing::info!(
            "Received {} ({} bytes) from {} via transfer {}",
            assembled.file_name,
            data.len(),
            peer,
            transfer_id
        );
        Ok(ReceivedFile {
            name: assembled.file_name,
            mime_type: assembled.mime_type,
            data,
        })
    }

    async fn decrypt(
        &self,
        peer: &str,
        key: SymmetricKey,
        nonce: Nonce,
        ciphertext: Vec<u8>,
    ) -> Result<Vec<u8>> {
        let provider = Arc::clone(self.key_store.provider());
        tokio::task::spawn_blocking(move || provider.decrypt(&key, &nonce, &ciphertext))
            .await?
            .map_err(|e| {
                tracing::warn!("Decryption of payload from {} failed: {}", peer, e);
                NodeError::from_crypto(e, peer)
            })
    }
}

impl fmt::Debug for TransferEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferEngine")
            .field("config", &self.config)
            .field("inbound_transfers", &self.inbound.len())
            .finish_non_exhaustive()
    }
}

/// Fresh transfer id: 8 random bytes, hex-encoded
fn new_transfer_id() -> Result<TransferId> {
    Ok(hex::encode(random::random_8()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use wisp_crypto::{AesGcmProvider, TAG_SIZE};
    use wisp_transport::{Connection, MemoryNetwork, Transport};

    fn engine(chunk_size: usize) -> TransferEngine {
        let key_store = Arc::new(KeyStore::new(Arc::new(AesGcmProvider::new())));
        let config = TransferConfig {
            chunk_size,
            chunk_delay: Duration::ZERO,
        };
        TransferEngine::new(key_store, Arc::new(ReassemblyStore::new()), config).unwrap()
    }

    async fn link() -> (PeerConnection, Connection) {
        let network = MemoryNetwork::new();
        let alice = network.transport_with_id("alice");
        let bob = network.transport_with_id("bob");
        alice.listen().await.unwrap();
        let mut bob_listener = bob.listen().await.unwrap();

        let outbound = alice.dial(&"alice".to_string(), &"bob".to_string()).await.unwrap();
        let inbound = bob_listener.incoming.recv().await.unwrap();
        (PeerConnection::new(outbound.remote, outbound.sink), inbound)
    }

    async fn drain(inbound: &mut Connection, count: usize) -> Vec<Message> {
        let mut messages = Vec::with_capacity(count);
        for _ in 0..count {
            let frame = inbound.frames.recv().await.unwrap();
            messages.push(Message::decode(&frame).unwrap());
        }
        messages
    }

    #[tokio::test]
    async fn test_small_file_single_message() {
        let sender = engine(16384);
        let receiver = engine(16384);
        let (conn, mut inbound) = link().await;

        let reports = Mutex::new(Vec::new());
        sender
            .send_file(&conn, OutgoingFile::new("a.txt", "text/plain", b"hello".to_vec()), |p| {
                reports.lock().unwrap().push(p.percent())
            })
            .await
            .unwrap();
        assert_eq!(*reports.lock().unwrap(), vec![100]);

        let messages = drain(&mut inbound, 2).await;
        assert!(matches!(messages[0], Message::KeyExchange { .. }));
        assert!(matches!(messages[1], Message::File { encrypted: true, .. }));

        let mut events = Vec::new();
        for message in messages {
            events.push(receiver.handle_message("alice", message).await.unwrap());
        }
        assert_eq!(events[0], None);
        assert_eq!(
            events[1],
            Some(ReceiveEvent::FileReceived(ReceivedFile {
                name: "a.txt".into(),
                mime_type: "text/plain".into(),
                data: b"hello".to_vec(),
            }))
        );
    }

    #[tokio::test]
    async fn test_chunked_sequence_and_progress() {
        let sender = engine(16384);
        let receiver = engine(16384);
        let (conn, mut inbound) = link().await;
        let data: Vec<u8> = (0..50000u32).map(|i| (i % 251) as u8).collect();

        let reports = Mutex::new(Vec::new());
        sender
            .send_file(&conn, OutgoingFile::new("big.bin", "application/octet-stream", data.clone()), |p| {
                reports.lock().unwrap().push(p.percent())
            })
            .await
            .unwrap();
        assert_eq!(*reports.lock().unwrap(), vec![25, 50, 75, 99, 100]);

        // key, metadata, 4 chunks, complete
        let messages = drain(&mut inbound, 7).await;
        match &messages[1] {
            Message::FileChunk(FileChunk::Metadata { total_chunks, .. }) => assert_eq!(*total_chunks, 4),
            other => panic!("expected metadata, got {other:?}"),
        }
        match &messages[5] {
            Message::FileChunk(FileChunk::Chunk { chunk_index, data, .. }) => {
                assert_eq!(*chunk_index, 3);
                assert_eq!(data.len(), 50000 + TAG_SIZE - 3 * 16384);
            }
            other => panic!("expected chunk, got {other:?}"),
        }
        assert!(matches!(messages[6], Message::FileComplete { .. }));

        let mut received = None;
        for message in messages {
            if let Some(ReceiveEvent::FileReceived(file)) = receiver.handle_message("alice", message).await.unwrap() {
                received = Some(file);
            }
        }
        let file = received.unwrap();
        assert_eq!(file.name, "big.bin");
        assert_eq!(file.data, data);
        assert_eq!(receiver.inbound_transfers(), 0);
        assert!(receiver.reassembly().is_empty());
    }

    #[tokio::test]
    async fn test_out_of_order_chunks() {
        let sender = engine(1024);
        let receiver = engine(1024);
        let (conn, mut inbound) = link().await;
        let data = vec![0x5Au8; 3500];

        sender
            .send_file(&conn, OutgoingFile::new("x", "y", data.clone()), |_| {})
            .await
            .unwrap();

        let mut messages = drain(&mut inbound, 7).await;
        // key, metadata, chunks 0..3 -> 3,1,2,0, complete
        messages[2..6].swap(0, 3);

        let mut received = None;
        for message in messages {
            if let Some(ReceiveEvent::FileReceived(file)) = receiver.handle_message("alice", message).await.unwrap() {
                received = Some(file);
            }
        }
        assert_eq!(received.unwrap().data, data);
    }

    #[tokio::test]
    async fn test_missing_chunk_frees_transfer() {
        let sender = engine(1024);
        let receiver = engine(1024);
        let (conn, mut inbound) = link().await;

        sender
            .send_file(&conn, OutgoingFile::new("x", "y", vec![1u8; 3500]), |_| {})
            .await
            .unwrap();

        let messages = drain(&mut inbound, 7).await;
        let mut result = Ok(None);
        for (i, message) in messages.into_iter().enumerate() {
            if i == 3 {
                continue;
            }
            result = receiver.handle_message("alice", message).await;
        }

        assert!(matches!(result, Err(NodeError::MissingChunk { index: 1, .. })));
        assert!(receiver.reassembly().is_empty());
        assert_eq!(receiver.inbound_transfers(), 0);
    }

    #[tokio::test]
    async fn test_file_without_key_is_missing_key() {
        let receiver = engine(16384);
        let result = receiver
            .handle_message(
                "alice",
                Message::File {
                    file_name: "a".into(),
                    file_type: "b".into(),
                    data: vec![0; 32],
                    nonce: Some([0; 12]),
                    encrypted: true,
                },
            )
            .await;
        assert!(matches!(result, Err(NodeError::MissingKey(ref peer)) if peer == "alice"));
    }

    #[tokio::test]
    async fn test_malformed_key_is_key_format() {
        let receiver = engine(16384);
        let result = receiver
            .handle_message(
                "alice",
                Message::KeyExchange {
                    file_name: "a".into(),
                    key: vec![1, 2, 3],
                },
            )
            .await;
        assert!(matches!(result, Err(NodeError::KeyFormat(_))));
        assert!(receiver.key_store().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_key_is_authentication_error() {
        let sender = engine(16384);
        let receiver = engine(16384);
        let (conn, mut inbound) = link().await;

        sender
            .send_file(&conn, OutgoingFile::new("a", "b", b"secret".to_vec()), |_| {})
            .await
            .unwrap();
        let messages = drain(&mut inbound, 2).await;

        // Skip the real key exchange and install an unrelated key
        let wrong = receiver.key_store().generate_key().unwrap();
        receiver.key_store().store_key_for_peer("alice", wrong);

        let result = receiver
            .handle_message("alice", messages[1].clone())
            .await;
        assert!(matches!(result, Err(NodeError::Authentication(_))));
    }

    #[tokio::test]
    async fn test_unencrypted_file_passes_through() {
        let receiver = engine(16384);
        let event = receiver
            .handle_message(
                "alice",
                Message::File {
                    file_name: "plain.txt".into(),
                    file_type: "text/plain".into(),
                    data: b"as is".to_vec(),
                    nonce: None,
                    encrypted: false,
                },
            )
            .await
            .unwrap();
        assert!(matches!(event, Some(ReceiveEvent::FileReceived(f)) if f.data == b"as is"));
    }

    #[tokio::test]
    async fn test_other_message_passes_through() {
        let receiver = engine(16384);
        let event = receiver
            .handle_message("alice", Message::Other("hi".into()))
            .await
            .unwrap();
        assert_eq!(event, Some(ReceiveEvent::Message("hi".into())));
    }

    #[tokio::test]
    async fn test_chunk_from_other_peer_rejected() {
        let receiver = engine(1024);
        receiver
            .handle_message(
                "alice",
                Message::FileChunk(FileChunk::Metadata {
                    transfer_id: "t1".into(),
                    file_name: "f".into(),
                    file_type: "m".into(),
                    total_chunks: 2,
                    nonce: [0; 12],
                }),
            )
            .await
            .unwrap();

        let event = receiver
            .handle_message(
                "mallory",
                Message::FileChunk(FileChunk::Chunk {
                    transfer_id: "t1".into(),
                    chunk_index: 0,
                    total_chunks: 2,
                    data: vec![0],
                }),
            )
            .await
            .unwrap();
        assert_eq!(event, None);
        assert_eq!(receiver.reassembly().progress("t1"), Some((0, 2)));

        let result = receiver
            .handle_message("mallory", Message::FileComplete { transfer_id: "t1".into() })
            .await;
        assert!(matches!(result, Err(NodeError::UnknownTransfer(_))));
        assert_eq!(receiver.inbound_transfers(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_cleans_partial_transfer() {
        let sender = engine(1024);
        let receiver = engine(1024);
        let (conn, mut inbound) = link().await;

        sender
            .send_file(&conn, OutgoingFile::new("x", "y", vec![3u8; 3500]), |_| {})
            .await
            .unwrap();

        // key, metadata and two of four chunks
        let messages = drain(&mut inbound, 4).await;
        let mut transfer_id = String::new();
        for message in messages {
            if let Some(ReceiveEvent::TransferStarted { transfer_id: id, .. }) =
                receiver.handle_message("alice", message).await.unwrap()
            {
                transfer_id = id;
            }
        }
        assert_eq!(receiver.reassembly().progress(&transfer_id), Some((2, 4)));

        assert_eq!(receiver.handle_disconnect("alice"), 1);
        assert!(!receiver.reassembly().is_complete(&transfer_id));
        assert!(receiver.reassembly().is_empty());
        assert!(receiver.key_store().get_key_for_peer("alice").is_none());
    }

    #[tokio::test]
    async fn test_send_on_closed_connection() {
        let sender = engine(16384);
        let (conn, _inbound) = link().await;
        conn.close().await;

        let result = sender
            .send_file(&conn, OutgoingFile::new("a", "b", vec![1]), |_| {})
            .await;
        assert!(matches!(result, Err(NodeError::ConnectionLost(_))));
    }

    #[tokio::test]
    async fn test_empty_file_round_trip() {
        let sender = engine(16384);
        let receiver = engine(16384);
        let (conn, mut inbound) = link().await;

        sender
            .send_file(&conn, OutgoingFile::new("empty", "text/plain", Vec::new()), |_| {})
            .await
            .unwrap();

        let messages = drain(&mut inbound, 2).await;
        let mut last = None;
        for message in messages {
            last = receiver.handle_message("alice", message).await.unwrap();
        }
        assert!(matches!(last, Some(ReceiveEvent::FileReceived(f)) if f.data.is_empty()));
    }

    #[test]
    fn test_transfer_id_format() {
        let id = new_transfer_id().unwrap();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
