//! Transport trait abstraction for multiple channel backends.
//!
//! A transport opens one named local endpoint and produces [`Connection`]s:
//! bidirectional, reliable, ordered streams of discrete frames between two
//! peers. The protocol layers above never see sockets, only frames.

use crate::PeerId;
use async_trait::async_trait;
use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Transport layer errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// I/O error from underlying transport
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Connection or endpoint is closed
    #[error("Transport is closed")]
    Closed,

    /// Opening the local endpoint failed
    #[error("Failed to bind: {0}")]
    BindFailed(String),

    /// The remote identifier does not name a reachable endpoint
    #[error("Peer unavailable: {0}")]
    PeerUnavailable(String),

    /// Connection failed for any other reason
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Frame exceeds [`crate::MAX_FRAME_SIZE`]
    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Offending frame size
        size: usize,
        /// Configured maximum
        max: usize,
    },

    /// Remote violated the framing protocol
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Outbound half of a connection.
///
/// Sending is ordered: frames arrive at the remote in the order
/// `send_frame` calls completed.
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Deliver one frame to the remote peer.
    ///
    /// # Errors
    /// Returns [`TransportError::Closed`] once either side closed the
    /// connection.
    async fn send_frame(&self, frame: Vec<u8>) -> TransportResult<()>;

    /// Close the connection. Idempotent.
    async fn close(&self);

    /// Check if the connection is closed on this side.
    fn is_closed(&self) -> bool;
}

/// An established connection to a remote peer
pub struct Connection {
    /// Remote peer identifier
    pub remote: PeerId,
    /// Outbound frame sink, shared with whoever needs to send
    pub sink: Arc<dyn FrameSink>,
    /// Inbound frames; yields `None` once the connection is gone
    pub frames: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("remote", &self.remote)
            .field("closed", &self.sink.is_closed())
            .finish_non_exhaustive()
    }
}

/// A bound local endpoint
#[derive(Debug)]
pub struct Listener {
    /// Identifier other peers dial to reach this endpoint
    pub local: PeerId,
    /// Inbound connections, in accept order
    pub incoming: mpsc::UnboundedReceiver<Connection>,
}

/// Async transport trait.
///
/// One transport value represents one local endpoint. `listen` must be
/// called before `dial`, which passes the local identifier to the remote so
/// it can attribute the inbound connection.
///
/// # Examples
///
/// ```
/// use wisp_transport::{MemoryNetwork, Transport};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let network = MemoryNetwork::new();
/// let alice = network.transport();
/// let bob = network.transport();
///
/// let alice_listener = alice.listen().await?;
/// let mut bob_listener = bob.listen().await?;
///
/// let conn = alice.dial(&alice_listener.local, &bob_listener.local).await?;
/// conn.sink.send_frame(b"hello".to_vec()).await?;
///
/// let mut inbound = bob_listener.incoming.recv().await.unwrap();
/// assert_eq!(inbound.remote, alice_listener.local);
/// assert_eq!(inbound.frames.recv().await.unwrap(), b"hello");
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the local endpoint.
    ///
    /// # Errors
    /// Returns [`TransportError::BindFailed`] if the endpoint cannot be
    /// opened or is already open.
    async fn listen(&self) -> TransportResult<Listener>;

    /// Open a connection from `local` to `remote`.
    ///
    /// # Errors
    /// Returns [`TransportError::PeerUnavailable`] if nothing answers under
    /// `remote`, or [`TransportError::ConnectionFailed`] for other failures.
    async fn dial(&self, local: &PeerId, remote: &PeerId) -> TransportResult<Connection>;

    /// Close the local endpoint; the listener's incoming stream ends.
    /// Established connections are not affected.
    async fn shutdown(&self);
}
