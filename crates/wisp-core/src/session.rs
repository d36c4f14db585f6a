//! Per-peer connection handle.

use crate::error::{NodeError, Result};
use crate::message::Message;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use wisp_transport::{FrameSink, PeerId};

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Outbound connection is being opened
    Connecting = 0,
    /// Connection is usable
    Open = 1,
    /// Connection is gone; terminal
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            _ => Self::Closed,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Open => write!(f, "Open"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// An open connection to one remote peer
///
/// Cloning the surrounding `Arc` is how the session manager shares a
/// connection between its reader task and senders.
pub struct PeerConnection {
    peer_id: PeerId,
    sink: Arc<dyn FrameSink>,
    state: AtomicU8,
    send_lock: Mutex<()>,
}

impl PeerConnection {
    /// Wrap an established channel
    pub fn new(peer_id: PeerId, sink: Arc<dyn FrameSink>) -> Self {
        Self {
            peer_id,
            sink,
            state: AtomicU8::new(ConnectionState::Open as u8),
            send_lock: Mutex::new(()),
        }
    }

    /// Remote peer id
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        let state = ConnectionState::from_u8(self.state.load(Ordering::Acquire));
        if state == ConnectionState::Open && self.sink.is_closed() {
            ConnectionState::Closed
        } else {
            state
        }
    }

    /// Returns true while messages can be sent
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Serialize whole send sequences on this connection
    ///
    /// Hold the guard for the duration of a multi-message transfer so chunks
    /// of two files never interleave.
    pub async fn lock_send(&self) -> MutexGuard<'_, ()> {
        self.send_lock.lock().await
    }

    /// Encode and send one message
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::ConnectionLost`] if the connection is closed or
    /// closes during the send.
    pub async fn send(&self, message: &Message) -> Result<()> {
        if !self.is_open() {
            return Err(NodeError::ConnectionLost(self.peer_id.clone()));
        }

        let frame = message.encode()?;
        tracing::trace!(
            "Sending {} ({} bytes) to {}",
            message.data_type(),
            frame.len(),
            self.peer_id
        );

        self.sink.send_frame(frame).await.map_err(|e| {
            tracing::debug!("Send to {} failed: {}", self.peer_id, e);
            self.mark_closed();
            NodeError::ConnectionLost(self.peer_id.clone())
        })
    }

    /// Close the channel; idempotent
    pub async fn close(&self) {
        self.mark_closed();
        self.sink.close().await;
    }

    pub(crate) fn mark_closed(&self) {
        self.state.store(ConnectionState::Closed as u8, Ordering::Release);
    }
}

impl std::fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnection")
            .field("peer_id", &self.peer_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wisp_transport::{MemoryNetwork, Transport};

    async fn connected_pair() -> (PeerConnection, wisp_transport::Connection) {
        let network = MemoryNetwork::new();
        let alice = network.transport_with_id("alice");
        let bob = network.transport_with_id("bob");
        alice.listen().await.unwrap();
        let mut bob_listener = bob.listen().await.unwrap();

        let outbound = alice.dial(&"alice".to_string(), &"bob".to_string()).await.unwrap();
        let inbound = bob_listener.incoming.recv().await.unwrap();
        (PeerConnection::new(outbound.remote, outbound.sink), inbound)
    }

    #[tokio::test]
    async fn test_send_delivers_encoded_message() {
        let (conn, mut inbound) = connected_pair().await;
        assert_eq!(conn.peer_id(), "bob");
        assert_eq!(conn.state(), ConnectionState::Open);

        conn.send(&Message::Other("hello".into())).await.unwrap();

        let frame = inbound.frames.recv().await.unwrap();
        assert_eq!(Message::decode(&frame).unwrap(), Message::Other("hello".into()));
    }

    #[tokio::test]
    async fn test_send_after_close_is_connection_lost() {
        let (conn, _inbound) = connected_pair().await;
        conn.close().await;

        assert_eq!(conn.state(), ConnectionState::Closed);
        let result = conn.send(&Message::Other("late".into())).await;
        assert!(matches!(result, Err(NodeError::ConnectionLost(ref peer)) if peer == "bob"));
    }

    #[tokio::test]
    async fn test_remote_drop_is_connection_lost() {
        let (conn, inbound) = connected_pair().await;
        drop(inbound);

        let result = conn.send(&Message::Other("anyone?".into())).await;
        assert!(matches!(result, Err(NodeError::ConnectionLost(_))));
        assert!(!conn.is_open());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Connecting.to_string(), "Connecting");
        assert_eq!(ConnectionState::from_u8(2), ConnectionState::Closed);
    }
}
