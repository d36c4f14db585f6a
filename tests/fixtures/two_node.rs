//! Two-node fixture over the in-memory network
//!
//! # Example
//!
//! ```no_run
//! use wisp_integration_tests::fixtures::TwoNodeFixture;
//!
//! # async fn demo() -> wisp_core::Result<()> {
//! let mut fixture = TwoNodeFixture::connected(wisp_files::DEFAULT_CHUNK_SIZE).await?;
//! fixture.send(b"hello".to_vec()).await?;
//! let file = fixture.receive_file().await?;
//! assert_eq!(file.data, b"hello");
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use wisp_core::{
    NodeConfig, NodeError, OutgoingFile, ReceiveEvent, ReceivedFile, SessionEvent, SessionManager,
};
use wisp_transport::MemoryNetwork;

/// Upper bound on waiting for any single event
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default settings without the inter-chunk pause
pub fn fast_config(chunk_size: usize) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.transfer.chunk_size = chunk_size;
    config.transfer.chunk_delay = Duration::ZERO;
    config
}

/// A sender and a receiver on one in-memory network
pub struct TwoNodeFixture {
    pub network: MemoryNetwork,
    pub sender: SessionManager,
    pub receiver: SessionManager,
    pub sender_events: mpsc::UnboundedReceiver<SessionEvent>,
    pub receiver_events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl TwoNodeFixture {
    /// Peer id of the sending node
    pub const SENDER: &'static str = "sender";
    /// Peer id of the receiving node
    pub const RECEIVER: &'static str = "receiver";

    /// Start both nodes without connecting them
    pub async fn started(chunk_size: usize) -> Result<Self, NodeError> {
        let network = MemoryNetwork::new();
        let (sender, sender_events) = SessionManager::with_config(
            Arc::new(network.transport_with_id(Self::SENDER)),
            fast_config(chunk_size),
        )?;
        let (receiver, receiver_events) = SessionManager::with_config(
            Arc::new(network.transport_with_id(Self::RECEIVER)),
            fast_config(chunk_size),
        )?;

        sender.start().await?;
        receiver.start().await?;

        Ok(Self {
            network,
            sender,
            receiver,
            sender_events,
            receiver_events,
        })
    }

    /// Start both nodes and connect sender to receiver
    ///
    /// Connection events are consumed before returning.
    pub async fn connected(chunk_size: usize) -> Result<Self, NodeError> {
        let mut fixture = Self::started(chunk_size).await?;
        fixture.sender.connect(Self::RECEIVER).await?;

        match next_event(&mut fixture.sender_events).await {
            SessionEvent::Connected { .. } => {}
            other => panic!("expected Connected, got {other:?}"),
        }
        match next_event(&mut fixture.receiver_events).await {
            SessionEvent::IncomingConnection { .. } => {}
            other => panic!("expected IncomingConnection, got {other:?}"),
        }

        Ok(fixture)
    }

    /// Send `data` and return every progress percentage reported
    pub async fn send(&self, data: Vec<u8>) -> Result<Vec<u8>, NodeError> {
        let percents = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&percents);

        self.sender
            .send_file(
                Self::RECEIVER,
                OutgoingFile::new("payload.bin", "application/octet-stream", data),
                move |progress| recorder.lock().unwrap().push(progress.percent()),
            )
            .await?;

        let reported = percents.lock().unwrap().clone();
        Ok(reported)
    }

    /// Wait for the next completed file on the receiver
    ///
    /// Transfer bookkeeping events are skipped; an error event is returned
    /// as `Err`.
    pub async fn receive_file(&mut self) -> Result<ReceivedFile, NodeError> {
        loop {
            match next_event(&mut self.receiver_events).await {
                SessionEvent::Received {
                    event: ReceiveEvent::FileReceived(file),
                    ..
                } => return Ok(file),
                SessionEvent::Error { error, .. } => return Err(error),
                SessionEvent::Disconnected { peer, .. } => {
                    return Err(NodeError::ConnectionLost(peer));
                }
                _ => {}
            }
        }
    }
}

/// Next event from `rx`, panicking after [`EVENT_TIMEOUT`]
pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for session event")
        .expect("session event stream closed")
}
