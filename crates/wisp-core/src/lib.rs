//! # WISP Core
//!
//! Core protocol implementation for WISP, encrypted chunked file transfer
//! between two directly connected peers.
//!
//! This crate provides:
//! - The wire [`Message`] union and its `bincode` codec
//! - The [`TransferEngine`]: key exchange, encryption, chunked send,
//!   reassembly and decryption on receive
//! - The [`SessionManager`]: local endpoint, peer connection registry and the
//!   [`SessionEvent`] stream
//! - Configuration, progress reporting and error types
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      SessionManager                              │
//! │   (local endpoint, one reader task per peer connection)         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                      TransferEngine                              │
//! │   (KeyExchange → File | Metadata, Chunk*, FileComplete)         │
//! ├──────────────────────┬──────────────────────────────────────────┤
//! │  KeyStore (crypto)   │  ReassemblyStore (files)                  │
//! ├──────────────────────┴──────────────────────────────────────────┤
//! │                      Transport (frames)                          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use wisp_core::{NodeConfig, OutgoingFile, ReceiveEvent, SessionEvent, SessionManager};
//! use wisp_transport::MemoryNetwork;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let network = MemoryNetwork::new();
//! let (alice, _) = SessionManager::with_config(Arc::new(network.transport()), NodeConfig::default())?;
//! let (bob, mut bob_events) = SessionManager::with_config(Arc::new(network.transport()), NodeConfig::default())?;
//!
//! alice.start().await?;
//! let bob_id = bob.start().await?;
//! alice.connect(&bob_id).await?;
//!
//! let file = OutgoingFile::new("hello.txt", "text/plain", b"hi bob".to_vec());
//! alice.send_file(&bob_id, file, |p| println!("{}%", p.percent())).await?;
//!
//! while let Some(event) = bob_events.recv().await {
//!     if let SessionEvent::Received { event: ReceiveEvent::FileReceived(file), .. } = event {
//!         assert_eq!(file.data, b"hi bob");
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod error;
pub mod message;
pub mod progress;
pub mod session;
pub mod session_manager;

pub use config::{NodeConfig, SessionConfig, TransferConfig};
pub use engine::{OutgoingFile, ReceiveEvent, ReceivedFile, TransferEngine};
pub use error::{NodeError, Result};
pub use message::{DataType, FileChunk, Message};
pub use progress::{TransferProgress, TransferStatus};
pub use session::{ConnectionState, PeerConnection};
pub use session_manager::{SessionEvent, SessionManager};
