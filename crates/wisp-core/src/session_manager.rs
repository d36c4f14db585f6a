//! Session manager.
//!
//! Owns the local endpoint and the registry of open peer connections. Each
//! connection gets one reader task that decodes frames and feeds them to the
//! [`TransferEngine`] in arrival order. Lifecycle changes and engine output
//! are delivered through a single [`SessionEvent`] stream handed out by the
//! constructor.

use crate::config::NodeConfig;
use crate::engine::{OutgoingFile, ReceiveEvent, TransferEngine};
use crate::error::{NodeError, Result};
use crate::message::Message;
use crate::progress::TransferProgress;
use crate::session::{ConnectionState, PeerConnection};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::AbortHandle;
use wisp_crypto::{AesGcmProvider, KeyStore};
use wisp_files::ReassemblyStore;
use wisp_transport::{Connection, PeerId, Transport};

/// Notifications emitted by the session manager
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A remote peer opened a connection to us
    IncomingConnection {
        /// Remote peer
        peer: PeerId,
    },
    /// An outbound connection is open
    Connected {
        /// Remote peer
        peer: PeerId,
    },
    /// A connection closed, from either side
    Disconnected {
        /// Remote peer
        peer: PeerId,
        /// In-flight inbound transfers dropped with it
        abandoned_transfers: usize,
    },
    /// The engine produced output for a message from `peer`
    Received {
        /// Sending peer
        peer: PeerId,
        /// What the message amounted to
        event: ReceiveEvent,
    },
    /// A message or transfer from `peer` failed; the connection stays open
    Error {
        /// Peer the failure is attributed to
        peer: PeerId,
        /// What went wrong
        error: NodeError,
    },
}

struct ConnectionEntry {
    conn: Arc<PeerConnection>,
    reader: AbortHandle,
}

/// Marks a dial to `peer` as in progress until dropped, so a cancelled
/// `connect` future does not leave the peer stuck in `Connecting`
struct PendingDial<'a> {
    pending: &'a DashSet<PeerId>,
    peer: PeerId,
}

impl<'a> PendingDial<'a> {
    /// `None` if a dial to `peer` is already in progress
    fn claim(pending: &'a DashSet<PeerId>, peer: &str) -> Option<Self> {
        pending.insert(peer.to_string()).then(|| Self {
            pending,
            peer: peer.to_string(),
        })
    }
}

impl Drop for PendingDial<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.peer);
    }
}

struct LocalSession {
    peer_id: PeerId,
    accept_task: AbortHandle,
}

struct Inner {
    transport: Arc<dyn Transport>,
    engine: TransferEngine,
    config: NodeConfig,
    local: Mutex<Option<LocalSession>>,
    connections: DashMap<PeerId, ConnectionEntry>,
    pending: DashSet<PeerId>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

/// Manages the local session and all peer connections
///
/// Dropping the manager aborts its background tasks; call
/// [`SessionManager::stop`] first for an orderly shutdown.
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Create a manager over `transport` with injected stores
    ///
    /// Returns the manager and the receiving end of its event stream.
    ///
    /// # Errors
    ///
    /// Returns `NodeError::InvalidConfig` if `config` does not validate.
    pub fn new(
        transport: Arc<dyn Transport>,
        key_store: Arc<KeyStore>,
        reassembly: Arc<ReassemblyStore>,
        config: NodeConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>)> {
        config.validate()?;
        let engine = TransferEngine::new(key_store, reassembly, config.transfer.clone())?;
        let (events, rx) = mpsc::unbounded_channel();

        let inner = Arc::new(Inner {
            transport,
            engine,
            config,
            local: Mutex::new(None),
            connections: DashMap::new(),
            pending: DashSet::new(),
            events,
        });

        Ok((Self { inner }, rx))
    }

    /// Create a manager with fresh AES-GCM stores
    ///
    /// # Errors
    ///
    /// Returns `NodeError::InvalidConfig` if `config` does not validate.
    pub fn with_config(
        transport: Arc<dyn Transport>,
        config: NodeConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<SessionEvent>)> {
        let key_store = Arc::new(KeyStore::new(Arc::new(AesGcmProvider::new())));
        Self::new(transport, key_store, Arc::new(ReassemblyStore::new()), config)
    }

    /// Open the local endpoint and start accepting connections
    ///
    /// # Errors
    ///
    /// - [`NodeError::InvalidState`] if already started
    /// - [`NodeError::SessionStart`] if the transport cannot listen
    pub async fn start(&self) -> Result<PeerId> {
        let mut local = self.inner.local.lock().await;
        if local.is_some() {
            return Err(NodeError::invalid_state("session already started"));
        }

        let listener = self
            .inner
            .transport
            .listen()
            .await
            .map_err(|e| NodeError::SessionStart(e.to_string().into()))?;

        let accept = tokio::spawn(accept_loop(Arc::clone(&self.inner), listener.incoming));
        *local = Some(LocalSession {
            peer_id: listener.local.clone(),
            accept_task: accept.abort_handle(),
        });

        tracing::info!("Session started as {}", listener.local);
        Ok(listener.local)
    }

    /// Close every connection and the local endpoint. Idempotent.
    pub async fn stop(&self) {
        let Some(local) = self.inner.local.lock().await.take() else {
            return;
        };

        local.accept_task.abort();
        self.inner.transport.shutdown().await;

        let peers: Vec<PeerId> = self
            .inner
            .connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for peer in peers {
            if let Some((_, entry)) = self.inner.connections.remove(&peer) {
                self.inner.close_entry(&peer, entry).await;
            }
        }

        tracing::info!("Session {} stopped", local.peer_id);
    }

    /// Local peer id, once started
    pub async fn local_peer_id(&self) -> Option<PeerId> {
        self.inner
            .local
            .lock()
            .await
            .as_ref()
            .map(|local| local.peer_id.clone())
    }

    /// Open a connection to `peer`
    ///
    /// # Errors
    ///
    /// - [`NodeError::NotStarted`] before [`SessionManager::start`]
    /// - [`NodeError::AlreadyConnected`] if a live or in-progress connection
    ///   to `peer` exists; the existing one is unaffected
    /// - [`NodeError::PeerUnavailable`] if `peer` cannot be reached
    /// - [`NodeError::ConnectionFailed`] otherwise, including timeout
    pub async fn connect(&self, peer: &str) -> Result<()> {
        let local = self.local_peer_id().await.ok_or(NodeError::NotStarted)?;
        if local == peer {
            return Err(NodeError::invalid_state("cannot connect to self"));
        }
        if self.inner.connections.contains_key(peer) {
            return Err(NodeError::AlreadyConnected(peer.to_string()));
        }
        let Some(_dialing) = PendingDial::claim(&self.inner.pending, peer) else {
            return Err(NodeError::AlreadyConnected(peer.to_string()));
        };

        tracing::debug!("Connecting to {}", peer);
        let dialed = tokio::time::timeout(
            self.inner.config.session.connect_timeout,
            self.inner.transport.dial(&local, &peer.to_string()),
        )
        .await;

        let connection = match dialed {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => {
                tracing::warn!("Connection to {} failed: {}", peer, e);
                return Err(e.into());
            }
            Err(_) => {
                tracing::warn!("Connection to {} timed out", peer);
                return Err(NodeError::connection_failed("connect timed out"));
            }
        };

        self.inner.register(connection).await?;
        tracing::info!("Connected to {}", peer);
        self.inner.emit(SessionEvent::Connected {
            peer: peer.to_string(),
        });
        Ok(())
    }

    /// Close the connection to `peer`
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::NotConnected`] if there is no such connection.
    pub async fn disconnect(&self, peer: &str) -> Result<()> {
        let (peer, entry) = self
            .inner
            .connections
            .remove(peer)
            .ok_or_else(|| NodeError::NotConnected(peer.to_string()))?;
        self.inner.close_entry(&peer, entry).await;
        Ok(())
    }

    /// Encrypt and send a file to a connected peer
    ///
    /// See [`TransferEngine::send_file`] for the progress contract.
    ///
    /// # Errors
    ///
    /// - [`NodeError::NotConnected`] if there is no connection to `peer`
    /// - [`NodeError::ConnectionLost`] if it closes mid-transfer
    pub async fn send_file<F>(&self, peer: &str, file: OutgoingFile, progress: F) -> Result<()>
    where
        F: Fn(&TransferProgress) + Send + Sync,
    {
        let conn = self.connection(peer)?;
        self.inner.engine.send_file(&conn, file, progress).await
    }

    /// Send a plain text message
    ///
    /// # Errors
    ///
    /// - [`NodeError::NotConnected`] if there is no connection to `peer`
    /// - [`NodeError::ConnectionLost`] if the send fails
    pub async fn send_message(&self, peer: &str, text: impl Into<String>) -> Result<()> {
        let conn = self.connection(peer)?;
        conn.send(&Message::Other(text.into())).await
    }

    /// Ids of all connected peers
    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.inner
            .connections
            .iter()
            .filter(|entry| entry.conn.is_open())
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Returns true if an open connection to `peer` exists
    pub fn is_connected(&self, peer: &str) -> bool {
        self.inner
            .connections
            .get(peer)
            .is_some_and(|entry| entry.conn.is_open())
    }

    /// Lifecycle state of the connection to `peer`
    pub fn connection_state(&self, peer: &str) -> ConnectionState {
        if let Some(entry) = self.inner.connections.get(peer) {
            entry.conn.state()
        } else if self.inner.pending.contains(peer) {
            ConnectionState::Connecting
        } else {
            ConnectionState::Closed
        }
    }

    /// Protocol engine shared by all connections
    pub fn engine(&self) -> &TransferEngine {
        &self.inner.engine
    }

    fn connection(&self, peer: &str) -> Result<Arc<PeerConnection>> {
        self.inner
            .connections
            .get(peer)
            .map(|entry| Arc::clone(&entry.conn))
            .ok_or_else(|| NodeError::NotConnected(peer.to_string()))
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Ok(mut local) = self.inner.local.try_lock() {
            if let Some(local) = local.take() {
                local.accept_task.abort();
            }
        }
        for entry in self.inner.connections.iter() {
            entry.reader.abort();
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("connections", &self.inner.connections.len())
            .field("engine", &self.inner.engine)
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("Session event dropped, receiver gone");
        }
    }

    /// Add a connection to the registry and start its reader
    ///
    /// A second connection for an already registered peer is closed and
    /// refused.
    async fn register(self: &Arc<Self>, connection: Connection) -> Result<Arc<PeerConnection>> {
        let Connection {
            remote,
            sink,
            frames,
        } = connection;
        let conn = Arc::new(PeerConnection::new(remote.clone(), sink));
        let (start_tx, start_rx) = oneshot::channel();

        let registered = match self.connections.entry(remote.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let reader = tokio::spawn(read_loop(
                    Arc::clone(self),
                    Arc::clone(&conn),
                    frames,
                    start_rx,
                ));
                slot.insert(ConnectionEntry {
                    conn: Arc::clone(&conn),
                    reader: reader.abort_handle(),
                });
                true
            }
        };

        if !registered {
            conn.close().await;
            return Err(NodeError::AlreadyConnected(remote));
        }

        // The reader may only tear down once its entry exists
        let _ = start_tx.send(());
        Ok(conn)
    }

    /// Close a connection already removed from the registry
    async fn close_entry(&self, peer: &str, entry: ConnectionEntry) {
        entry.reader.abort();
        entry.conn.close().await;
        self.finish_disconnect(peer);
    }

    fn finish_disconnect(&self, peer: &str) {
        let abandoned_transfers = self.engine.handle_disconnect(peer);
        tracing::info!("Disconnected from {}", peer);
        self.emit(SessionEvent::Disconnected {
            peer: peer.to_string(),
            abandoned_transfers,
        });
    }
}

async fn accept_loop(inner: Arc<Inner>, mut incoming: mpsc::UnboundedReceiver<Connection>) {
    while let Some(connection) = incoming.recv().await {
        let peer = connection.remote.clone();
        match inner.register(connection).await {
            Ok(_) => {
                tracing::info!("Accepted connection from {}", peer);
                inner.emit(SessionEvent::IncomingConnection { peer });
            }
            Err(e) => tracing::warn!("Refused connection from {}: {}", peer, e),
        }
    }
    tracing::debug!("Accept loop ended");
}

async fn read_loop(
    inner: Arc<Inner>,
    conn: Arc<PeerConnection>,
    mut frames: mpsc::UnboundedReceiver<Vec<u8>>,
    start: oneshot::Receiver<()>,
) {
    if start.await.is_err() {
        return;
    }
    let peer = conn.peer_id().to_string();

    while let Some(frame) = frames.recv().await {
        let message = match Message::decode(&frame) {
            Ok(message) => message,
            Err(error) => {
                tracing::warn!("Undecodable frame from {}: {}", peer, error);
                inner.emit(SessionEvent::Error {
                    peer: peer.clone(),
                    error,
                });
                continue;
            }
        };

        match inner.engine.handle_message(&peer, message).await {
            Ok(Some(event)) => inner.emit(SessionEvent::Received {
                peer: peer.clone(),
                event,
            }),
            Ok(None) => {}
            Err(error) => {
                tracing::warn!("Message from {} failed: {}", peer, error);
                inner.emit(SessionEvent::Error {
                    peer: peer.clone(),
                    error,
                });
            }
        }
    }

    let removed = inner
        .connections
        .remove_if(&peer, |_, entry| Arc::ptr_eq(&entry.conn, &conn))
        .is_some();
    conn.close().await;
    if removed {
        inner.finish_disconnect(&peer);
    }
}
