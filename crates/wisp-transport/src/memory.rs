//! In-process network.
//!
//! Every [`MemoryTransport`] created from the same [`MemoryNetwork`] can dial
//! every other one by peer id. Connections are pairs of unbounded channels, so
//! frames are delivered reliably and in order without touching the OS.

use crate::transport::{Connection, FrameSink, Listener, Transport, TransportError, TransportResult};
use crate::PeerId;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

type Registry = DashMap<PeerId, mpsc::UnboundedSender<Connection>>;

/// Shared in-process network
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    listeners: Arc<Registry>,
}

impl MemoryNetwork {
    /// Create an empty network
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an endpoint that receives a random peer id when it listens
    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport {
            network: self.clone(),
            requested_id: None,
            local: Mutex::new(None),
        }
    }

    /// Create an endpoint that listens under a fixed peer id
    pub fn transport_with_id(&self, id: impl Into<PeerId>) -> MemoryTransport {
        MemoryTransport {
            network: self.clone(),
            requested_id: Some(id.into()),
            local: Mutex::new(None),
        }
    }

    /// Returns true if an endpoint is listening under `id`
    pub fn is_listening(&self, id: &str) -> bool {
        self.listeners.contains_key(id)
    }

    /// Number of listening endpoints
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Returns true if nothing is listening
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

fn random_peer_id() -> TransportResult<PeerId> {
    let mut bytes = [0u8; 8];
    getrandom::getrandom(&mut bytes)
        .map_err(|e| TransportError::BindFailed(format!("peer id generation failed: {e}")))?;
    Ok(hex::encode(bytes))
}

/// One endpoint on a [`MemoryNetwork`]
#[derive(Debug)]
pub struct MemoryTransport {
    network: MemoryNetwork,
    requested_id: Option<PeerId>,
    local: Mutex<Option<PeerId>>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn listen(&self) -> TransportResult<Listener> {
        let mut local = self.local.lock().await;
        if let Some(id) = local.as_ref() {
            return Err(TransportError::BindFailed(format!("already listening as {id}")));
        }

        let id = match &self.requested_id {
            Some(id) => id.clone(),
            None => random_peer_id()?,
        };

        let (tx, incoming) = mpsc::unbounded_channel();
        match self.network.listeners.entry(id.clone()) {
            Entry::Occupied(_) => {
                return Err(TransportError::BindFailed(format!("peer id {id} is taken")));
            }
            Entry::Vacant(slot) => {
                slot.insert(tx);
            }
        }

        tracing::debug!("Memory endpoint listening as {}", id);
        *local = Some(id.clone());

        Ok(Listener { local: id, incoming })
    }

    async fn dial(&self, local: &PeerId, remote: &PeerId) -> TransportResult<Connection> {
        let acceptor = self
            .network
            .listeners
            .get(remote)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TransportError::PeerUnavailable(remote.clone()))?;

        let (to_remote, remote_frames) = mpsc::unbounded_channel();
        let (to_local, local_frames) = mpsc::unbounded_channel();

        let inbound = Connection {
            remote: local.clone(),
            sink: Arc::new(MemorySink::new(to_local)),
            frames: remote_frames,
        };

        acceptor
            .send(inbound)
            .map_err(|_| TransportError::PeerUnavailable(remote.clone()))?;

        tracing::debug!("Memory connection {} -> {}", local, remote);

        Ok(Connection {
            remote: remote.clone(),
            sink: Arc::new(MemorySink::new(to_remote)),
            frames: local_frames,
        })
    }

    async fn shutdown(&self) {
        if let Some(id) = self.local.lock().await.take() {
            self.network.listeners.remove(&id);
            tracing::debug!("Memory endpoint {} shut down", id);
        }
    }
}

/// Outbound half of an in-memory connection
#[derive(Debug)]
struct MemorySink {
    tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    closed: AtomicBool,
}

impl MemorySink {
    fn new(tx: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_frame(&self, frame: Vec<u8>) -> TransportResult<()> {
        let guard = self.tx.lock().await;
        let tx = guard.as_ref().ok_or(TransportError::Closed)?;
        tx.send(frame).map_err(|_| {
            self.closed.store(true, Ordering::Release);
            TransportError::Closed
        })
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        // Dropping the sender ends the remote's frame stream
        self.tx.lock().await.take();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
